use std::{cell::RefCell, collections::HashMap, rc::Rc};

use log::{debug, warn};

use crate::{
    actions::group::{ActionGroup, PRINTERS},
    cups_client::models::{Job, JobState, Printer},
};

use super::{
    models::{HeaderState, JobEntry, MenuModel, Section},
    store::JobStore,
};

/// Section a job in `state` belongs in. Terminal and unrecognised states have none.
pub fn section_for_state(state: JobState) -> Option<Section> {
    match state {
        JobState::Pending => Some(Section::Queued),
        JobState::Held => Some(Section::Paused),
        JobState::Processing => Some(Section::Current),
        JobState::Stopped | JobState::Canceled | JobState::Aborted | JobState::Completed => None,
        JobState::Unknown(_) => None,
    }
}

/// Keeps the menu model and the `printers` header state in line with the
/// job events coming from the print server.
pub struct Menu {
    actions: Rc<RefCell<ActionGroup>>,
    model: MenuModel,
    store: JobStore,
    // printer-name -> display text
    printers: HashMap<String, String>,
}

impl Menu {
    pub fn new(actions: Rc<RefCell<ActionGroup>>) -> Self {
        let mut menu = Self { actions, model: MenuModel::new(), store: JobStore::new(), printers: HashMap::new() };
        menu.update_header();
        menu
    }

    pub fn model(&self) -> &MenuModel {
        &self.model
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn on_job_state_changed(&mut self, job: &Job) {
        let printer = self.remember_printer(&job.printer);
        debug!("State changed for job {} '{}' on printer '{printer}': {:?}", job.id, job.name, job.state);

        // Remove any existing menu item for the job.
        self.take_entry(job.id);

        match section_for_state(job.state) {
            Some(section) => {
                self.model.section_mut(section).items.push(JobEntry {
                    job_id: job.id,
                    label: job.name.clone(),
                    printer_name: job.printer.name.clone(),
                    printer,
                });
                self.store.insert(job.id, section);
            }
            None if job.state.is_terminal() => {}
            None => warn!("Dropping job {} with unknown state code {}", job.id, job.state.code()),
        }

        self.update_header();
    }

    /// Printer events only refresh how entries name their printer.
    pub fn on_printer_state_changed(&mut self, printer: &Printer) {
        let display = self.remember_printer(printer);
        debug!("State changed for printer '{display}': {:?}", printer.state);

        for section in self.model.sections.iter_mut() {
            for entry in section.items.iter_mut().filter(|entry| entry.printer_name == printer.name) {
                entry.printer = display.clone();
            }
        }
    }

    /// Drops the entry for `job_id`. Untracked ids are ignored.
    pub fn remove(&mut self, job_id: u32) -> bool {
        let removed = self.take_entry(job_id);
        if removed {
            self.update_header();
        }
        removed
    }

    fn take_entry(&mut self, job_id: u32) -> bool {
        let Some(section) = self.store.erase(job_id) else {
            return false;
        };

        let model = self.model.section_mut(section);
        match model.find(job_id) {
            Some(pos) => {
                model.items.remove(pos);
            }
            None => warn!("Job {job_id} was tracked in {section:?} without a menu entry"),
        }
        true
    }

    pub fn header_state(&self) -> HeaderState {
        HeaderState::printers(!self.store.is_empty())
    }

    fn update_header(&mut self) {
        let state = self.header_state();
        self.actions.borrow_mut().change_action_state(PRINTERS, state);
    }

    /// Display text for `printer`, keeping the last description seen for it
    /// so that snapshots without one still get a readable name.
    fn remember_printer(&mut self, printer: &Printer) -> String {
        if !printer.text.is_empty() {
            self.printers.insert(printer.name.clone(), printer.text.clone());
        }
        self.printers
            .get(&printer.name)
            .cloned()
            .unwrap_or_else(|| printer.display_name().to_string())
    }
}
