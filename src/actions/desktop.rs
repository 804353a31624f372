use log::{debug, warn};
use tokio::process::Command;

pub const PRINTERS_SETTINGS_URL: &str = "settings:///system/printers";
pub const PRINTERS_SETTINGS_COMMAND: &str = "system-config-printer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desktop {
    Other,
    Unity7,
    Unity8,
}

impl Desktop {
    /// Classifies the session from `MIR_SOCKET` and `XDG_CURRENT_DESKTOP`.
    pub fn detect() -> Self {
        Self::from_env(
            std::env::var("MIR_SOCKET").ok().as_deref(),
            std::env::var("XDG_CURRENT_DESKTOP").ok().as_deref(),
        )
    }

    pub fn from_env(mir_socket: Option<&str>, xdg_current_desktop: Option<&str>) -> Self {
        if mir_socket.is_some() {
            return Desktop::Unity8;
        }

        match xdg_current_desktop {
            Some(desktops) if desktops.split(':').any(|name| name == "Unity") => Desktop::Unity7,
            _ => Desktop::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsTarget {
    Url(String),
    Command(String),
}

pub fn settings_target(desktop: Desktop) -> SettingsTarget {
    match desktop {
        Desktop::Unity8 => SettingsTarget::Url(PRINTERS_SETTINGS_URL.to_string()),
        Desktop::Unity7 | Desktop::Other => SettingsTarget::Command(PRINTERS_SETTINGS_COMMAND.to_string()),
    }
}

/// Opens the printer settings the way the current desktop expects.
#[derive(Debug, Clone)]
pub struct SettingsLauncher {
    desktop: Desktop,
    url_dispatcher: String,
}

impl SettingsLauncher {
    pub fn new(desktop: Desktop, url_dispatcher: String) -> Self {
        Self { desktop, url_dispatcher }
    }

    pub fn open_settings_app(&self) {
        match settings_target(self.desktop) {
            SettingsTarget::Url(url) => self.dispatch_url(&url),
            SettingsTarget::Command(command) => execute_command(&command),
        }
    }

    fn dispatch_url(&self, url: &str) {
        debug!("Dispatching url '{url}'");
        execute_command(&format!("{} {url}", self.url_dispatcher));
    }
}

fn execute_command(command_line: &str) {
    debug!("Issuing command '{command_line}'");

    let mut words = command_line.split_whitespace();
    let Some(program) = words.next() else {
        warn!("Refusing to run an empty command");
        return;
    };

    if let Err(e) = Command::new(program).args(words).spawn() {
        warn!("Unable to start \"{command_line}\": {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mir_socket_means_unity8() {
        assert_eq!(Desktop::from_env(Some("/run/mir_socket"), Some("Unity")), Desktop::Unity8);
        assert_eq!(Desktop::from_env(Some(""), None), Desktop::Unity8);
    }

    #[test]
    fn unity_in_desktop_list_means_unity7() {
        assert_eq!(Desktop::from_env(None, Some("Unity")), Desktop::Unity7);
        assert_eq!(Desktop::from_env(None, Some("ubuntu:Unity:GNOME")), Desktop::Unity7);
    }

    #[test]
    fn anything_else_is_other() {
        assert_eq!(Desktop::from_env(None, None), Desktop::Other);
        assert_eq!(Desktop::from_env(None, Some("GNOME")), Desktop::Other);
        assert_eq!(Desktop::from_env(None, Some("Unity7")), Desktop::Other);
    }

    #[test]
    fn settings_target_per_desktop() {
        assert_eq!(settings_target(Desktop::Unity8), SettingsTarget::Url("settings:///system/printers".to_string()));
        assert_eq!(settings_target(Desktop::Unity7), SettingsTarget::Command("system-config-printer".to_string()));
        assert_eq!(settings_target(Desktop::Other), SettingsTarget::Command("system-config-printer".to_string()));
    }
}
