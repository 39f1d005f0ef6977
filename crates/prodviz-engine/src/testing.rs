//! In-memory backends for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use prodviz_contracts::chat::ApiMessage;
use prodviz_contracts::images::OriginalImage;
use serde_json::{json, Value};

use crate::chat::ChatBackend;
use crate::error::{EngineError, Result};
use crate::speech::{SpeechBackend, SpeechClip, SpeechRequest};
use crate::tasks::{PollPolicy, TaskBackend, TaskRequest};

pub(crate) fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        timeout: Some(Duration::from_secs(5)),
        max_attempts: None,
    }
}

pub(crate) fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(4, 3, Rgb([10, 120, 240]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub(crate) fn sample_upload() -> OriginalImage {
    OriginalImage::from_bytes(&png_bytes(), "product.png").expect("sample upload")
}

enum CreateRule {
    Route(String),
    Payload(Value),
    Offline,
}

/// Task endpoint driven by per-task status scripts. Once a script is down to
/// its last entry that entry repeats forever.
#[derive(Default)]
pub(crate) struct ScriptedTasks {
    scripts: Mutex<HashMap<String, VecDeque<Value>>>,
    rules: Mutex<Vec<(String, CreateRule)>>,
    calls: Mutex<HashMap<String, usize>>,
    created: Mutex<Vec<TaskRequest>>,
    next_id: AtomicUsize,
    status_delay: Mutex<Duration>,
}

impl ScriptedTasks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, task_id: &str, statuses: Vec<Value>) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(task_id.to_string(), statuses.into());
    }

    pub(crate) fn script_forever(&self, task_id: &str, status: Value) {
        self.script(task_id, vec![status]);
    }

    pub(crate) fn complete_after(&self, task_id: &str, pending_polls: usize, result: &str) {
        let mut statuses = vec![json!({ "data": { "status": "IN_PROGRESS" } }); pending_polls];
        statuses.push(json!({ "data": { "status": "COMPLETED", "generated": [result] } }));
        self.script(task_id, statuses);
    }

    /// Prompts containing `needle` get `task_id` instead of a counter id.
    pub(crate) fn route_prompts_containing(&self, needle: &str, task_id: &str) {
        self.push_rule(needle, CreateRule::Route(task_id.to_string()));
    }

    pub(crate) fn reject_prompts_containing(&self, needle: &str, payload: Value) {
        self.push_rule(needle, CreateRule::Payload(payload));
    }

    pub(crate) fn offline_for_prompts_containing(&self, needle: &str) {
        self.push_rule(needle, CreateRule::Offline);
    }

    pub(crate) fn delay_status(&self, delay: Duration) {
        *self.status_delay.lock().expect("delay lock") = delay;
    }

    pub(crate) fn status_calls(&self, task_id: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn created(&self) -> Vec<TaskRequest> {
        self.created.lock().expect("created lock").clone()
    }

    fn push_rule(&self, needle: &str, rule: CreateRule) {
        self.rules
            .lock()
            .expect("rules lock")
            .push((needle.to_string(), rule));
    }
}

impl TaskBackend for ScriptedTasks {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_task(&self, request: &TaskRequest) -> Result<Value> {
        self.created
            .lock()
            .expect("created lock")
            .push(request.clone());
        let rules = self.rules.lock().expect("rules lock");
        for (needle, rule) in rules.iter() {
            if !request.prompt.contains(needle.as_str()) {
                continue;
            }
            return match rule {
                CreateRule::Route(task_id) => Ok(json!({ "data": { "task_id": task_id } })),
                CreateRule::Payload(payload) => Ok(payload.clone()),
                CreateRule::Offline => Err(EngineError::Network("connection refused".to_string())),
            };
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "data": { "task_id": format!("task-{id}") } }))
    }

    fn task_status(&self, task_id: &str) -> Result<Value> {
        let delay = *self.status_delay.lock().expect("delay lock");
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(task_id.to_string())
            .or_default() += 1;
        let mut scripts = self.scripts.lock().expect("scripts lock");
        let queue = scripts
            .get_mut(task_id)
            .ok_or_else(|| EngineError::Network(format!("no such task {task_id}")))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.ok_or_else(|| EngineError::Network(format!("empty script for {task_id}")))
    }
}

/// Completion endpoint answering from a queue of canned replies.
#[derive(Default)]
pub(crate) struct ScriptedChat {
    replies: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<Vec<ApiMessage>>>,
    delay: Mutex<Duration>,
}

impl ScriptedChat {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(&self, body: Value) {
        self.replies.lock().expect("replies lock").push_back(Ok(body));
    }

    pub(crate) fn reply_text(&self, text: &str) {
        self.reply(json!({ "choices": [{ "message": { "role": "assistant", "content": text } }] }));
    }

    pub(crate) fn fail(&self, err: EngineError) {
        self.replies.lock().expect("replies lock").push_back(Err(err));
    }

    pub(crate) fn delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = delay;
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ApiMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ChatBackend for ScriptedChat {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, messages: &[ApiMessage]) -> Result<Value> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        let delay = *self.delay.lock().expect("delay lock");
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::Network("no scripted reply".to_string())))
    }
}

#[derive(Default)]
pub(crate) struct RecordingSpeech {
    requests: Mutex<Vec<SpeechRequest>>,
}

impl RecordingSpeech {
    pub(crate) fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl SpeechBackend for RecordingSpeech {
    fn name(&self) -> &str {
        "recording"
    }

    fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        Ok(SpeechClip::mp3(b"ID3fake-mp3".to_vec()))
    }
}
