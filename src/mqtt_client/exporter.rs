use std::collections::HashMap;

use anyhow::Result;
use log::{debug, info, warn};
use rumqttc::{ConnectionError, Event, EventLoop, Packet};
use serde::Serialize;

use crate::{actions::group::ActionGroup, config::models::Mqtt, menu::models::{MenuModel, Profile}};

use super::{
    client::{MqttClient, ONLINE},
    models::MqttIndicatorStatus,
};

#[derive(Debug, PartialEq, Eq)]
pub enum BusEvent {
    /// The broker accepted our connection; exports can start.
    Acquired,
    /// Someone asked for the named action to be activated.
    Activate(String),
}

pub fn availability_topic(root_topic: &str) -> String {
    format!("{root_topic}/availability")
}

pub fn actions_topic(root_topic: &str) -> String {
    format!("{root_topic}/actions")
}

pub fn menu_topic(root_topic: &str, profile: Profile) -> String {
    format!("{root_topic}/menus/{}", profile.name())
}

pub fn status_topic(root_topic: &str) -> String {
    format!("{root_topic}/status")
}

/// The action name in `<root>/actions/<name>/activate`.
pub fn activation_name<'a>(root_topic: &str, topic: &'a str) -> Option<&'a str> {
    topic
        .strip_prefix(root_topic)?
        .strip_prefix("/actions/")?
        .strip_suffix("/activate")
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

/// Publishes the action group and the menus on the broker and turns broker
/// traffic into [`BusEvent`]s. Losing the broker connection ends the export.
pub struct Exporter {
    client: MqttClient,
    eventloop: EventLoop,
    root_topic: String,
    published: HashMap<String, String>,
}

impl Exporter {
    pub fn new(mqtt_settings: &Mqtt) -> Self {
        let root_topic = mqtt_settings.root_topic.clone();
        let (client, eventloop) = MqttClient::new(mqtt_settings, &availability_topic(&root_topic));
        Self { client, eventloop, root_topic, published: HashMap::new() }
    }

    /// Drives the connection until something the caller cares about happens.
    pub async fn poll(&mut self) -> Result<BusEvent, ConnectionError> {
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(_)) => {
                    info!("Connected to MQTT broker, exporting under '{}'", self.root_topic);
                    self.on_bus_acquired();
                    return Ok(BusEvent::Acquired);
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    match activation_name(&self.root_topic, &publish.topic) {
                        Some(name) => return Ok(BusEvent::Activate(name.to_string())),
                        None => debug!("Ignoring message on '{}'", publish.topic),
                    }
                }
                _ => {}
            }
        }
    }

    fn on_bus_acquired(&mut self) {
        // Every topic goes out once per session, whatever was retained before.
        self.published.clear();
        let activate = format!("{}/actions/+/activate", self.root_topic);
        if let Err(e) = self.client.subscribe(&activate) {
            warn!("Cannot subscribe to '{activate}': {e}");
        }
        if let Err(e) = self.client.publish(&availability_topic(&self.root_topic), ONLINE.as_bytes()) {
            warn!("Cannot publish availability: {e}");
        }
    }

    /// Republishes whatever changed since the last call.
    pub fn publish(&mut self, actions: &ActionGroup, menu: &MenuModel, status: &MqttIndicatorStatus) {
        let root_topic = self.root_topic.clone();
        self.publish_if_changed(actions_topic(&root_topic), actions);
        for profile in Profile::ALL {
            self.publish_if_changed(menu_topic(&root_topic, profile), menu);
        }
        self.publish_if_changed(status_topic(&root_topic), status);
    }

    fn publish_if_changed<T: Serialize>(&mut self, topic: String, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Cannot serialize payload for '{topic}': {e}");
                return;
            }
        };

        if self.published.get(&topic) == Some(&payload) {
            return;
        }

        match self.client.publish(&topic, payload.as_bytes()) {
            Ok(()) => {
                debug!("Published: {topic}");
                self.published.insert(topic, payload);
            }
            Err(e) => warn!("Cannot export '{topic}': {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rumqttc::Request;

    use super::*;
    use crate::{
        actions::{
            desktop::{Desktop, SettingsLauncher},
            group::PRINTERS,
        },
        cups_client::subscription::Lease,
        menu::models::HeaderState,
    };

    fn mqtt_settings() -> Mqtt {
        Mqtt {
            host: "localhost".to_string(),
            port: 1883,
            secure: false,
            ignore_tls_errors: false,
            username: String::new(),
            password: String::new(),
            client_id: "cups-indicator-test".to_string(),
            root_topic: "office".to_string(),
        }
    }

    /// Topics of the publications queued since the last call.
    fn queued_topics(exporter: &mut Exporter) -> Vec<String> {
        exporter.eventloop.clean();
        exporter
            .eventloop
            .pending
            .drain(..)
            .filter_map(|request| match request {
                Request::Publish(publish) => Some(publish.topic),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn only_changed_payloads_are_queued_until_a_new_session() {
        let mut exporter = Exporter::new(&mqtt_settings());
        let mut actions = ActionGroup::new(SettingsLauncher::new(Desktop::Other, "xdg-open".to_string()));
        let menu = MenuModel::new();
        let status = MqttIndicatorStatus::new(&Lease::new(Duration::from_secs(60), Duration::from_secs(10)), 0);

        exporter.publish(&actions, &menu, &status);
        assert_eq!(queued_topics(&mut exporter).len(), 6);

        exporter.publish(&actions, &menu, &status);
        assert!(queued_topics(&mut exporter).is_empty());

        actions.change_action_state(PRINTERS, HeaderState::printers(false));
        exporter.publish(&actions, &menu, &status);
        assert_eq!(queued_topics(&mut exporter), vec!["office/actions"]);

        exporter.on_bus_acquired();
        exporter.publish(&actions, &menu, &status);
        let topics = queued_topics(&mut exporter);
        assert_eq!(topics.len(), 7);
        assert!(topics.contains(&"office/availability".to_string()));
        assert!(topics.contains(&"office/menus/phone_greeter".to_string()));
    }

    #[test]
    fn topics_hang_off_the_root() {
        assert_eq!(availability_topic("office"), "office/availability");
        assert_eq!(actions_topic("office"), "office/actions");
        assert_eq!(status_topic("office"), "office/status");
        assert_eq!(menu_topic("office", Profile::PhoneGreeter), "office/menus/phone_greeter");
    }

    #[test]
    fn activation_topics_name_the_action() {
        assert_eq!(activation_name("office", "office/actions/settings/activate"), Some("settings"));
        assert_eq!(activation_name("office", "office/actions/printers/activate"), Some("printers"));
    }

    #[test]
    fn other_topics_are_not_activations() {
        assert_eq!(activation_name("office", "office/actions"), None);
        assert_eq!(activation_name("office", "office/actions//activate"), None);
        assert_eq!(activation_name("office", "office/actions/a/b/activate"), None);
        assert_eq!(activation_name("office", "elsewhere/actions/settings/activate"), None);
        assert_eq!(activation_name("office", "office/menus/desktop"), None);
    }
}
