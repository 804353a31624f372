use ipp::{model, prelude::*};
use serde_derive::Serialize;

// The crate's `model::{PrinterState, JobState}` hold the IPP codes; these add
// a variant for codes a server may send that the crate doesn't know.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
    Unknown(i32),
}

impl From<model::PrinterState> for PrinterState {
    fn from(state: model::PrinterState) -> Self {
        match state {
            model::PrinterState::Idle => PrinterState::Idle,
            model::PrinterState::Processing => PrinterState::Processing,
            model::PrinterState::Stopped => PrinterState::Stopped,
        }
    }
}

impl From<i32> for PrinterState {
    fn from(code: i32) -> Self {
        model::PrinterState::from_i32(code).map_or(PrinterState::Unknown(code), PrinterState::from)
    }
}

/// Ordered the way the server numbers them; `Unknown` sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum JobState {
    Pending,
    Held,
    Processing,
    Stopped,
    Canceled,
    Aborted,
    Completed,
    Unknown(i32),
}

impl JobState {
    pub fn code(self) -> i32 {
        let known = match self {
            JobState::Pending => model::JobState::Pending,
            JobState::Held => model::JobState::PendingHeld,
            JobState::Processing => model::JobState::Processing,
            JobState::Stopped => model::JobState::ProcessingStopped,
            JobState::Canceled => model::JobState::Canceled,
            JobState::Aborted => model::JobState::Aborted,
            JobState::Completed => model::JobState::Completed,
            JobState::Unknown(code) => return code,
        };
        known as i32
    }

    /// No further transitions are expected once a job reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Stopped | JobState::Canceled | JobState::Aborted | JobState::Completed
        )
    }
}

impl From<model::JobState> for JobState {
    fn from(state: model::JobState) -> Self {
        match state {
            model::JobState::Pending => JobState::Pending,
            model::JobState::PendingHeld => JobState::Held,
            model::JobState::Processing => JobState::Processing,
            model::JobState::ProcessingStopped => JobState::Stopped,
            model::JobState::Canceled => JobState::Canceled,
            model::JobState::Aborted => JobState::Aborted,
            model::JobState::Completed => JobState::Completed,
        }
    }
}

impl From<i32> for JobState {
    fn from(code: i32) -> Self {
        model::JobState::from_i32(code).map_or(JobState::Unknown(code), JobState::from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Printer {
    pub name: String,
    pub uri: String,
    pub text: String,
    pub state: PrinterState,
    pub state_reasons: String,
    pub accepting_jobs: bool,
}

impl Printer {
    /// The text shown for this printer, falling back to its queue name.
    pub fn display_name(&self) -> &str {
        if self.text.is_empty() {
            &self.name
        } else {
            &self.text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: u32,
    pub name: String,
    pub state: JobState,
    pub state_reasons: String,
    pub impressions_completed: u32,
    pub printer: Printer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Printer { sequence: i32, printer: Printer },
    Job { sequence: i32, job: Job },
}
