//! `harvest dashboard`: serve the workflow dashboard.

use crate::cli::output::{self, Styled};
use crate::dashboard::{DashboardState, ProcessManager};
use crate::events::EventBus;
use crate::rest;
use anyhow::{Context, Result};
use std::sync::Arc;

pub async fn run(port: u16) -> Result<()> {
    let events = EventBus::default();
    let manager = ProcessManager::new(events.clone()).context("cannot locate the harvest executable")?;
    let state = Arc::new(DashboardState::new(manager, events));

    if !output::is_quiet() {
        let s = Styled::new();
        eprintln!("  {} Dashboard running at http://localhost:{port}", s.ok_sym());
    }
    rest::start(port, state).await
}
