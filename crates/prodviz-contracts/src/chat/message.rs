use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const GREETING: &str = "Hello! I'm your AI assistant. I can help you visualize products, answer questions, or just chat. You can also upload images or use voice input!";

pub const FALLBACK_REPLY: &str = "Sorry — I couldn't reach the AI service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    InputImage { image_url: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        ContentBlock::InputImage {
            image_url: image_url.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::InputImage { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_details: Option<Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now().timestamp_millis(),
            reasoning_details: None,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    pub fn with_reasoning(mut self, details: Option<Value>) -> Self {
        self.reasoning_details = details.filter(|value| !value.is_null());
        self
    }

    /// Concatenated text blocks, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_api(&self) -> ApiMessage {
        ApiMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// What the completion endpoint sees of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// Normalizes whatever a completion returned as `content` into blocks.
///
/// Arrays keep every block that parses (bare strings and objects carrying a
/// `text` field become text blocks); a plain string becomes one text block;
/// any other JSON is rendered to a string.
pub fn normalize_assistant_content(content: &Value) -> Vec<ContentBlock> {
    match content {
        Value::Array(items) => items.iter().filter_map(block_from_value).collect(),
        Value::String(text) => vec![ContentBlock::text(text.clone())],
        other => vec![ContentBlock::text(other.to_string())],
    }
}

fn block_from_value(item: &Value) -> Option<ContentBlock> {
    if let Ok(block) = serde_json::from_value::<ContentBlock>(item.clone()) {
        return Some(block);
    }
    match item {
        Value::String(text) => Some(ContentBlock::text(text.clone())),
        Value::Object(obj) => obj
            .get("text")
            .and_then(Value::as_str)
            .map(ContentBlock::text),
        _ => None,
    }
}
