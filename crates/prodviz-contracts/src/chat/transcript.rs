use super::message::{ApiMessage, ChatMessage, GREETING};

/// Append-only, insertion-ordered chat history.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Transcript {
    /// A transcript opening with the assistant greeting.
    pub fn seeded() -> Self {
        Self {
            messages: vec![ChatMessage::assistant_text(GREETING)],
        }
    }

    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn api_messages(&self) -> Vec<ApiMessage> {
        self.messages.iter().map(ChatMessage::to_api).collect()
    }
}
