pub mod chat;
pub mod config;
mod error;
mod http;
pub mod orchestrator;
pub mod slot;
pub mod speech;
pub mod studio;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::{BatchOutcome, SceneFailure, VisualizationOrchestrator, SCENES};
pub use studio::{StudioState, VisualizerStudio};
pub use tasks::{CancelToken, PollPolicy, TaskBackend, TaskStatus};

use prodviz_contracts::events::{payload, EventWriter};
use serde_json::Value;

/// Event logging never fails the operation being logged.
pub(crate) fn emit_event(events: &EventWriter, event_type: &str, fields: Value) {
    if let Err(err) = events.emit(event_type, payload(fields)) {
        tracing::warn!(event_type, "failed to record event: {err:#}");
    }
}
