use std::collections::BTreeMap;

use log::{debug, warn};
use serde_derive::Serialize;

use crate::menu::models::HeaderState;

use super::desktop::SettingsLauncher;

pub const PRINTERS: &str = "printers";
pub const SETTINGS: &str = "settings";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<HeaderState>,
}

/// The actions exported next to the menus: the stateful `printers` header
/// action and the `settings` launcher.
#[derive(Debug, Serialize)]
pub struct ActionGroup {
    actions: BTreeMap<String, Action>,
    #[serde(skip)]
    launcher: SettingsLauncher,
}

impl ActionGroup {
    pub fn new(launcher: SettingsLauncher) -> Self {
        let mut actions = BTreeMap::new();
        actions.insert(PRINTERS.to_string(), Action { enabled: true, state: Some(HeaderState::printers(true)) });
        actions.insert(SETTINGS.to_string(), Action { enabled: true, state: None });
        Self { actions, launcher }
    }

    pub fn list_actions(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn action_state(&self, name: &str) -> Option<&HeaderState> {
        self.actions.get(name).and_then(|action| action.state.as_ref())
    }

    /// Replaces the state of a stateful action. Returns whether anything changed.
    pub fn change_action_state(&mut self, name: &str, state: HeaderState) -> bool {
        match self.actions.get_mut(name) {
            Some(Action { state: Some(current), .. }) => {
                let changed = *current != state;
                *current = state;
                changed
            }
            Some(_) => {
                warn!("Action '{name}' has no state to change");
                false
            }
            None => {
                warn!("No such action '{name}'");
                false
            }
        }
    }

    /// Runs an activated action. Returns false for unknown or disabled actions.
    pub fn activate(&self, name: &str) -> bool {
        match self.actions.get(name) {
            Some(action) if action.enabled => {
                debug!("Activating action '{name}'");
                if name == SETTINGS {
                    self.launcher.open_settings_app();
                }
                true
            }
            _ => {
                warn!("Ignoring activation of unknown or disabled action '{name}'");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::desktop::Desktop;

    fn group() -> ActionGroup {
        ActionGroup::new(SettingsLauncher::new(Desktop::Other, "xdg-open".to_string()))
    }

    #[test]
    fn exposes_printers_and_settings() {
        let group = group();
        assert_eq!(group.list_actions().collect::<Vec<_>>(), vec![PRINTERS, SETTINGS]);
        assert!(group.action_state(PRINTERS).is_some());
        assert!(group.action_state(SETTINGS).is_none());
    }

    #[test]
    fn change_action_state_reports_changes() {
        let mut group = group();
        assert!(group.change_action_state(PRINTERS, HeaderState::printers(false)));
        assert!(!group.change_action_state(PRINTERS, HeaderState::printers(false)));
        assert_eq!(group.action_state(PRINTERS).map(|s| s.visible), Some(false));
    }

    #[test]
    fn stateless_and_unknown_actions_keep_no_state() {
        let mut group = group();
        assert!(!group.change_action_state(SETTINGS, HeaderState::printers(true)));
        assert!(!group.change_action_state("nope", HeaderState::printers(true)));
        assert!(group.action_state(SETTINGS).is_none());
    }

    #[test]
    fn unknown_action_is_not_activated() {
        assert!(!group().activate("self-destruct"));
    }

    #[test]
    fn serializes_as_a_map_of_actions() {
        let json = serde_json::to_value(group()).expect("serializes");
        assert_eq!(json["actions"]["printers"]["enabled"], true);
        assert_eq!(json["actions"]["printers"]["state"]["title"], "Printers");
        assert!(json["actions"]["settings"].get("state").is_none());
    }
}
