use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use prodviz_contracts::events::EventWriter;
use serde_json::json;
use tracing::debug;

use super::{parse_task_id, parse_task_status, TaskBackend, TaskRequest, TaskStatus};
use crate::emit_event;
use crate::error::{EngineError, Result};

const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Wall-clock budget for one task; `None` polls until a terminal status.
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Some(Duration::from_secs(300)),
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.timeout.is_some_and(|limit| elapsed >= limit)
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleeps for `duration` in short slices. Returns `false` as soon as the
    /// token is cancelled.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(CANCEL_CHECK_SLICE));
        }
    }
}

pub fn submit_task<B>(backend: &B, request: &TaskRequest) -> Result<String>
where
    B: TaskBackend + ?Sized,
{
    let payload = backend.create_task(request)?;
    parse_task_id(&payload)
}

/// Polls `task_id` until it reaches a terminal status.
///
/// Ends with the first result reference on COMPLETED, `MissingResult` when
/// COMPLETED carries none, `GenerationFailed` on FAILED, `InvalidResponse` on
/// a malformed payload, `TimedOut` once `policy` is exhausted, and
/// `Cancelled` when `cancel` fires. Every other status polls again after
/// `policy.interval`.
pub fn poll_task<B>(
    backend: &B,
    task_id: &str,
    policy: &PollPolicy,
    cancel: &CancelToken,
    events: &EventWriter,
) -> Result<String>
where
    B: TaskBackend + ?Sized,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let payload = backend.task_status(task_id)?;
        attempts = attempts.saturating_add(1);
        let status = parse_task_status(&payload)?;
        debug!(task_id, attempt = attempts, status = status.label(), "polled task");
        emit_event(
            events,
            "task_polled",
            json!({ "task_id": task_id, "attempt": attempts, "status": status.label() }),
        );

        match status {
            TaskStatus::Completed {
                result: Some(result),
            } => return Ok(result),
            TaskStatus::Completed { result: None } => {
                return Err(EngineError::MissingResult {
                    task_id: task_id.to_string(),
                })
            }
            TaskStatus::Failed => {
                return Err(EngineError::GenerationFailed {
                    task_id: task_id.to_string(),
                })
            }
            TaskStatus::Pending(_) => {}
        }

        let elapsed = started.elapsed();
        if policy.exhausted(attempts, elapsed) {
            return Err(EngineError::TimedOut {
                task_id: task_id.to_string(),
                attempts,
                elapsed,
            });
        }
        if !cancel.wait(policy.interval) {
            return Err(EngineError::Cancelled);
        }
    }
}
