// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest event bus: typed progress events from runs and workflows.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`HarvestEvent`] values. The dashboard's SSE endpoint and the CLI
//! progress bar subscribe independently. When nobody is subscribed,
//! events are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event Harvest emits. Serialized to JSON for SSE.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    // ── Run Events ────────────────────────
    /// A scrape run has started.
    RunStarted {
        site: String,
        base_url: String,
        timestamp: String,
    },
    /// Processing of one sitemap began.
    SitemapStarted {
        site: String,
        sitemap: String,
        index: usize,
        total: usize,
    },
    /// A sitemap's URLs have all been processed.
    SitemapFinished {
        site: String,
        sitemap: String,
        urls: usize,
        saved: usize,
    },
    /// Rows for one product URL were written.
    ProductSaved {
        site: String,
        url: String,
        rows: usize,
    },
    /// A product URL failed and was logged.
    UrlFailed {
        site: String,
        url: String,
        reason: String,
    },
    /// The run finished.
    RunComplete {
        site: String,
        urls_processed: usize,
        products_saved: usize,
        errors: usize,
        skipped: usize,
        elapsed_ms: u64,
    },

    // ── Workflow Events ───────────────────
    /// The dashboard launched a workflow process.
    WorkflowStarted { key: String, pid: Option<u32> },
    /// One line of workflow output.
    WorkflowLog { key: String, line: String },
    /// A workflow process exited.
    WorkflowExited { key: String, code: Option<i32> },
}

impl HarvestEvent {
    /// The site or workflow key the event belongs to.
    pub fn subject(&self) -> &str {
        match self {
            HarvestEvent::RunStarted { site, .. }
            | HarvestEvent::SitemapStarted { site, .. }
            | HarvestEvent::SitemapFinished { site, .. }
            | HarvestEvent::ProductSaved { site, .. }
            | HarvestEvent::UrlFailed { site, .. }
            | HarvestEvent::RunComplete { site, .. } => site,
            HarvestEvent::WorkflowStarted { key, .. }
            | HarvestEvent::WorkflowLog { key, .. }
            | HarvestEvent::WorkflowExited { key, .. } => key,
        }
    }
}

/// The central event bus.
///
/// Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HarvestEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Whether `event` passes an optional subject filter.
pub fn event_matches(event: &HarvestEvent, subject: Option<&str>) -> bool {
    subject.map_or(true, |s| event.subject().eq_ignore_ascii_case(s))
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = HarvestEvent::RunStarted {
            site: "walmart".to_string(),
            base_url: "https://www.walmart.com".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"RunStarted""#));

        let parsed: HarvestEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            HarvestEvent::RunStarted { site, .. } => assert_eq!(site, "walmart"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(HarvestEvent::WorkflowExited {
            key: "cymax".to_string(),
            code: Some(0),
        });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(HarvestEvent::ProductSaved {
            site: "cymax".to_string(),
            url: "https://www.cymax.com/a--1.htm".to_string(),
            rows: 2,
        });
        match rx.try_recv().unwrap() {
            HarvestEvent::ProductSaved { rows, .. } => assert_eq!(rows, 2),
            _ => panic!("wrong event"),
        }
    }

    #[test]
    fn test_event_matches() {
        let event = HarvestEvent::WorkflowLog {
            key: "walmart".to_string(),
            line: "Processing sitemap 1/3".to_string(),
        };
        assert!(event_matches(&event, None));
        assert!(event_matches(&event, Some("Walmart")));
        assert!(!event_matches(&event, Some("cymax")));
    }
}
