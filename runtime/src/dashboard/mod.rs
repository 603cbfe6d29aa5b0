//! The workflow dashboard: a registry of launchable jobs and the process
//! manager that runs them. [`crate::rest`] serves it over HTTP.

pub mod process;
pub mod registry;

pub use process::{ProcessManager, WorkflowError, WorkflowState, WorkflowStatus};
pub use registry::{Workflow, WORKFLOWS};

use crate::events::EventBus;

pub const DEFAULT_PORT: u16 = 5050;

/// State shared by every dashboard handler.
pub struct DashboardState {
    pub manager: ProcessManager,
    pub events: EventBus,
}

impl DashboardState {
    pub fn new(manager: ProcessManager, events: EventBus) -> Self {
        Self { manager, events }
    }
}
