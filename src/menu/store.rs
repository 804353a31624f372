use std::collections::BTreeMap;

use super::models::Section;

/// Which section each tracked job is shown in. A job id is present exactly
/// while the job has an entry in the menu.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobStore {
    current_jobs: BTreeMap<u32, Section>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section_for(&self, job_id: u32) -> Option<Section> {
        self.current_jobs.get(&job_id).copied()
    }

    pub fn insert(&mut self, job_id: u32, section: Section) -> Option<Section> {
        self.current_jobs.insert(job_id, section)
    }

    pub fn erase(&mut self, job_id: u32) -> Option<Section> {
        self.current_jobs.remove(&job_id)
    }

    pub fn is_empty(&self) -> bool {
        self.current_jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.current_jobs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Section)> + '_ {
        self.current_jobs.iter().map(|(id, section)| (*id, *section))
    }
}
