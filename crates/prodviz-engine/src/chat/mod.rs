//! Chat completion seam and the session that owns the transcript.

mod openrouter;
mod session;

use prodviz_contracts::chat::{normalize_assistant_content, ApiMessage, ContentBlock};
use serde_json::Value;

use crate::error::{EngineError, Result};

pub use openrouter::OpenRouterChat;
pub use session::{ChatSession, Reconciliation, SendOutcome};

pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;
    /// Sends the role + content view of the transcript and returns the raw
    /// completion body.
    fn complete(&self, messages: &[ApiMessage]) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub content: Vec<ContentBlock>,
    pub reasoning_details: Option<Value>,
}

/// Pulls `choices[0].message` out of a completion body. A body without a
/// message, or whose content normalizes to no blocks, is an invalid response.
pub fn parse_completion(body: &Value) -> Result<AssistantReply> {
    let message = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .filter(|message| message.is_object())
        .ok_or_else(|| {
            EngineError::InvalidResponse("completion carried no choices[0].message".to_string())
        })?;
    let content = message
        .get("content")
        .filter(|content| !content.is_null())
        .ok_or_else(|| {
            EngineError::InvalidResponse("completion message carried no content".to_string())
        })?;
    let content = normalize_assistant_content(content);
    if content.is_empty() {
        return Err(EngineError::InvalidResponse(
            "completion content had no usable blocks".to_string(),
        ));
    }
    Ok(AssistantReply {
        content,
        reasoning_details: message
            .get("reasoning_details")
            .filter(|details| !details.is_null())
            .cloned(),
    })
}
