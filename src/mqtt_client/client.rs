use rumqttc::{tokio_rustls::rustls::ClientConfig, AsyncClient, EventLoop, LastWill, MqttOptions, QoS};
use std::{sync::Arc, time::Duration};
use anyhow::Result;

use crate::config::models::Mqtt;

use super::fun_with_tls::{get_system_certs, NoopServerCertVerifier};

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

pub struct MqttClient {
    client: AsyncClient,
}

impl MqttClient {
    /// Creates the client and the event loop that drives it. Nothing is sent
    /// until the event loop gets polled.
    pub fn new(mqtt_settings: &Mqtt, availability_topic: &str) -> (Self, EventLoop) {
        let mut mqtt_options = MqttOptions::new(mqtt_settings.client_id.to_owned(), mqtt_settings.host.to_owned(), mqtt_settings.port);
        if !mqtt_settings.username.is_empty() {
            mqtt_options.set_credentials(mqtt_settings.username.to_owned(), mqtt_settings.password.to_owned());
        }
        mqtt_options
            .set_transport(match mqtt_settings.secure {
                true => {
                    let config: ClientConfig = match mqtt_settings.ignore_tls_errors {
                        // TLS without certificate verification.
                        true => ClientConfig::builder().dangerous().with_custom_certificate_verifier(Arc::new(NoopServerCertVerifier {})).with_no_client_auth(),
                        // TLS with certificate verification.
                        false => ClientConfig::builder().with_root_certificates(get_system_certs().clone()).with_no_client_auth(),
                    };
                    rumqttc::Transport::tls_with_config(rumqttc::TlsConfiguration::Rustls(Arc::new(config)))
                }
                // No TLS.
                false => rumqttc::Transport::tcp(),
            })
            .set_last_will(LastWill::new(availability_topic, OFFLINE, QoS::AtLeastOnce, true))
            .set_keep_alive(Duration::from_secs(10));

        let (client, eventloop) = AsyncClient::new(mqtt_options, 64);
        (Self { client }, eventloop)
    }

    /// Queues a retained publication; the event loop sends it on its next poll.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        Ok(self.client.try_publish(topic, QoS::AtLeastOnce, true, payload)?)
    }

    pub fn subscribe(&self, topic: &str) -> Result<()> {
        Ok(self.client.try_subscribe(topic, QoS::AtLeastOnce)?)
    }
}
