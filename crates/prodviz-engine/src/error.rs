use std::time::Duration;

use prodviz_contracts::images::ImageDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("task submission failed: {0}")]
    Submission(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("generation failed for task {task_id}")]
    GenerationFailed { task_id: String },

    #[error("task {task_id} completed without a result")]
    MissingResult { task_id: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("could not read image: {0}")]
    FileDecode(#[from] ImageDecodeError),

    #[error("task {task_id} still pending after {attempts} polls ({elapsed:?})")]
    TimedOut {
        task_id: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("{action} already in progress")]
    Busy { action: &'static str },

    #[error("{0}")]
    Precondition(&'static str),
}

pub type Result<T> = std::result::Result<T, EngineError>;
