//! Remote image-generation tasks: the backend seam, response parsing, and the
//! bounded poll loop.

mod freepik;
mod poll;

use serde_json::{json, Value};

use crate::error::{EngineError, Result};
use crate::http::truncate_text;

pub use freepik::FreepikTaskBackend;
pub use poll::{poll_task, submit_task, CancelToken, PollPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub prompt: String,
    /// Base64 payloads or URLs of the images the job should build on.
    pub reference_images: Vec<String>,
}

impl TaskRequest {
    pub fn new(prompt: impl Into<String>, reference_image: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: vec![reference_image.into()],
        }
    }

    pub fn body(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "reference_images": self.reference_images,
        })
    }
}

/// A job endpoint that accepts task creation and answers status queries with
/// raw JSON. Interpretation of the payloads lives in [`parse_task_id`] and
/// [`parse_task_status`] so every backend shares one contract.
pub trait TaskBackend: Send + Sync {
    fn name(&self) -> &str;
    fn create_task(&self, request: &TaskRequest) -> Result<Value>;
    fn task_status(&self, task_id: &str) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Completed { result: Option<String> },
    Failed,
    Pending(String),
}

impl TaskStatus {
    pub fn label(&self) -> &str {
        match self {
            TaskStatus::Completed { .. } => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Pending(status) => status,
        }
    }
}

/// Reads `data.task_id` from a creation response.
pub fn parse_task_id(payload: &Value) -> Result<String> {
    payload
        .get("data")
        .and_then(|data| data.get("task_id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::Submission(format!(
                "response carried no task id: {}",
                truncate_text(&payload.to_string(), 200)
            ))
        })
}

/// Reads `data.status` and, for completed tasks, `data.generated[0]`.
/// An empty string or empty array counts as no result. Only the exact
/// `COMPLETED` and `FAILED` statuses are terminal.
pub fn parse_task_status(payload: &Value) -> Result<TaskStatus> {
    let data = payload
        .get("data")
        .filter(|data| data.is_object())
        .ok_or_else(|| EngineError::InvalidResponse("status payload missing data".to_string()))?;
    let status = data.get("status").and_then(Value::as_str).ok_or_else(|| {
        EngineError::InvalidResponse("status payload missing data.status".to_string())
    })?;

    if status == "COMPLETED" {
        let result = data
            .get("generated")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        return Ok(TaskStatus::Completed { result });
    }
    if status == "FAILED" {
        return Ok(TaskStatus::Failed);
    }
    Ok(TaskStatus::Pending(status.to_string()))
}
