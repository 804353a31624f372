use std::{collections::HashMap, time::Duration};

use config::{Config, Environment};
use log::info;
use snafu::{ensure, ResultExt, Snafu};

use super::models::Settings;

pub fn load_config() -> Result<Settings, ConfigError> {
    // As Rust has no native support for .env files,
    // we use the dotenv_flow crate to import to actual ENV vars.
    if let Ok(dotenv_path) = dotenv_flow::dotenv_flow() {
        info!("Loaded dotenv file: {:?}", dotenv_path);
    }

    build_config(None)
}

/// Builds the settings from the process environment, or from `vars` when given.
pub fn build_config(vars: Option<HashMap<String, String>>) -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(Environment::default()
            .prefix("CUPSIND")
            .separator("_")
            .prefix_separator("_")
            .try_parsing(true)
            .source(vars))
        .set_default("mqtt.host", "localhost").context(DefaultSnafu)?
        .set_default("mqtt.port", "1883").context(DefaultSnafu)?
        .set_default("mqtt.secure", "false").context(DefaultSnafu)?
        .set_default("mqtt.ignoretlserrors", "false").context(DefaultSnafu)?
        .set_default("mqtt.username", "").context(DefaultSnafu)?
        .set_default("mqtt.password", "").context(DefaultSnafu)?
        .set_default("mqtt.clientid", "cups-indicator").context(DefaultSnafu)?
        .set_default("mqtt.roottopic", "cups-indicator").context(DefaultSnafu)?
        .set_default("cups.uri", "https://localhost:631/").context(DefaultSnafu)?
        .set_default("cups.ignoretlserrors", "true").context(DefaultSnafu)?
        .set_default("cups.username", "").context(DefaultSnafu)?
        .set_default("cups.password", "").context(DefaultSnafu)?
        .set_default("cups.leaseduration", "24h").context(DefaultSnafu)?
        .set_default("cups.renewbefore", "60s").context(DefaultSnafu)?
        .set_default("cups.retryinterval", "5m").context(DefaultSnafu)?
        .set_default("cups.pollinterval", "2s").context(DefaultSnafu)?
        .set_default("settings.urldispatcher", "xdg-open").context(DefaultSnafu)?
        .set_default("sentrydsn", "").context(DefaultSnafu)?
        .build().context(BuildSnafu)?;

    let settings: Settings = config.try_deserialize().context(DeserializeSnafu)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let cups = &settings.cups;
    ensure!(
        cups.renew_before < cups.lease_duration,
        RenewalWindowSnafu { lease_duration: cups.lease_duration, renew_before: cups.renew_before }
    );
    ensure!(!cups.poll_interval.is_zero(), ZeroIntervalSnafu { name: "cups.pollinterval" });
    ensure!(!cups.retry_interval.is_zero(), ZeroIntervalSnafu { name: "cups.retryinterval" });
    Ok(())
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Could not register a default setting"))]
    Default { source: config::ConfigError },
    #[snafu(display("Could not read the configuration sources"))]
    Build { source: config::ConfigError },
    #[snafu(display("Invalid configuration"))]
    Deserialize { source: config::ConfigError },
    #[snafu(display(
        "cups.renewbefore ({}) must be shorter than cups.leaseduration ({})",
        humantime::format_duration(*renew_before),
        humantime::format_duration(*lease_duration)
    ))]
    RenewalWindow { lease_duration: Duration, renew_before: Duration },
    #[snafu(display("{name} must not be zero"))]
    ZeroInterval { name: &'static str },
}
