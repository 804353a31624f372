use std::time::Duration;

use serde_derive::Deserialize;

// When changing anything here, make sure to add
// #[serde(alias = "ihavenounderscores")]
// where needed, so it can be read from the ENV vars.

#[derive(Debug, Deserialize)]
pub struct Mqtt {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    #[serde(alias = "ignoretlserrors")]
    pub ignore_tls_errors: bool,
    pub username: String,
    pub password: String,
    #[serde(alias = "clientid")]
    pub client_id: String,
    #[serde(alias = "roottopic")]
    pub root_topic: String,
}

#[derive(Debug, Deserialize)]
pub struct Cups {
    pub uri: String,
    #[serde(alias = "ignoretlserrors")]
    pub ignore_tls_errors: bool,
    pub username: String,
    pub password: String,
    #[serde(alias = "leaseduration", with = "humantime_serde")]
    pub lease_duration: Duration,
    #[serde(alias = "renewbefore", with = "humantime_serde")]
    pub renew_before: Duration,
    #[serde(alias = "retryinterval", with = "humantime_serde")]
    pub retry_interval: Duration,
    #[serde(alias = "pollinterval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
pub struct Desktop {
    #[serde(alias = "urldispatcher")]
    pub url_dispatcher: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub mqtt: Mqtt,
    pub cups: Cups,
    pub settings: Desktop,
    #[serde(alias = "sentrydsn")]
    pub sentry_dsn: Option<String>,
}
