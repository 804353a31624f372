use convert_case::{Case, Casing};
use serde_derive::Serialize;

pub const TYPE_SECTION: &str = "section";
pub const TYPE_ROOT: &str = "indicator.root";

/// The three containers a live job can be shown in, in menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Current,
    Queued,
    Paused,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Current, Section::Queued, Section::Paused];

    pub fn index(self) -> usize {
        match self {
            Section::Current => 0,
            Section::Queued => 1,
            Section::Paused => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Section::Current => "Current jobs",
            Section::Queued => "Queued jobs",
            Section::Paused => "Paused jobs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEntry {
    #[serde(rename = "x-job-id")]
    pub job_id: u32,
    pub label: String,
    pub printer_name: String,
    pub printer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionModel {
    pub section: Section,
    pub label: &'static str,
    pub action: &'static str,
    #[serde(rename = "x-type")]
    pub item_type: &'static str,
    pub items: Vec<JobEntry>,
}

impl SectionModel {
    fn new(section: Section) -> Self {
        Self {
            section,
            label: section.label(),
            action: "indicator.section",
            item_type: TYPE_SECTION,
            items: Vec::new(),
        }
    }

    /// Position of the entry tagged with `job_id`.
    pub fn find(&self, job_id: u32) -> Option<usize> {
        self.items.iter().position(|entry| entry.job_id == job_id)
    }
}

/// A header item holding one submenu made of the three sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuModel {
    pub action: &'static str,
    #[serde(rename = "x-type")]
    pub item_type: &'static str,
    pub sections: [SectionModel; 3],
}

impl MenuModel {
    pub fn new() -> Self {
        Self {
            action: "indicator.printers",
            item_type: TYPE_ROOT,
            sections: Section::ALL.map(SectionModel::new),
        }
    }

    pub fn section(&self, section: Section) -> &SectionModel {
        &self.sections[section.index()]
    }

    pub fn section_mut(&mut self, section: Section) -> &mut SectionModel {
        &mut self.sections[section.index()]
    }

    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|section| section.items.len()).sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Section, &JobEntry)> {
        self.sections.iter().flat_map(|model| model.items.iter().map(move |entry| (model.section, entry)))
    }
}

impl Default for MenuModel {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Icon {
    /// A theme icon name followed by its fallbacks.
    Themed { names: Vec<String> },
}

impl Icon {
    pub fn themed(name: &str) -> Self {
        let mut names = vec![name.to_string()];
        if let Some(stripped) = name.strip_suffix("-symbolic") {
            names.push(stripped.to_string());
        }
        Icon::Themed { names }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderState {
    pub title: String,
    #[serde(rename = "accessible-desc")]
    pub accessible_desc: String,
    pub icon: Icon,
    pub visible: bool,
}

impl HeaderState {
    pub fn printers(visible: bool) -> Self {
        Self {
            title: "Printers".to_string(),
            accessible_desc: "Printers".to_string(),
            icon: Icon::themed("printer-symbolic"),
            visible,
        }
    }
}

/// Where the same menu gets exported; every profile shows identical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Desktop,
    DesktopGreeter,
    Phone,
    PhoneGreeter,
}

impl Profile {
    pub const ALL: [Profile; 4] = [Profile::Desktop, Profile::DesktopGreeter, Profile::Phone, Profile::PhoneGreeter];

    pub fn name(self) -> String {
        format!("{self:?}").to_case(Case::Snake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names_are_snake_case() {
        let names: Vec<String> = Profile::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["desktop", "desktop_greeter", "phone", "phone_greeter"]);
    }

    #[test]
    fn new_menu_has_three_labelled_empty_sections() {
        let menu = MenuModel::new();
        let labels: Vec<&str> = menu.sections.iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["Current jobs", "Queued jobs", "Paused jobs"]);
        assert_eq!(menu.entry_count(), 0);
        assert_eq!(menu.section(Section::Paused).section, Section::Paused);
    }

    #[test]
    fn header_state_serializes_with_menu_keys() {
        let json = serde_json::to_value(HeaderState::printers(true)).expect("serializes");
        assert_eq!(json["title"], "Printers");
        assert_eq!(json["accessible-desc"], "Printers");
        assert_eq!(json["visible"], true);
        assert_eq!(json["icon"]["type"], "themed");
        assert_eq!(json["icon"]["names"][0], "printer-symbolic");
        assert_eq!(json["icon"]["names"][1], "printer");
    }
}
