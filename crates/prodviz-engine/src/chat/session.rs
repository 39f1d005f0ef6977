use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use prodviz_contracts::chat::{ChatMessage, ContentBlock, Role, Transcript, FALLBACK_REPLY};
use prodviz_contracts::events::EventWriter;
use prodviz_contracts::images::OriginalImage;
use serde_json::json;
use tracing::warn;

use super::{parse_completion, ChatBackend};
use crate::emit_event;
use crate::error::{EngineError, Result};
use crate::slot::RequestSlot;

/// How an optimistically appended user message was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Replied,
    /// The request failed; the fallback reply was appended and the user
    /// message stays in the transcript.
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub user: ChatMessage,
    pub assistant: ChatMessage,
    pub reconciliation: Reconciliation,
}

pub struct ChatSession<B> {
    backend: B,
    transcript: Mutex<Transcript>,
    composing: RequestSlot,
    events: EventWriter,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_transcript(backend, Transcript::seeded())
    }

    pub fn with_transcript(backend: B, transcript: Transcript) -> Self {
        Self {
            backend,
            transcript: Mutex::new(transcript),
            composing: RequestSlot::new("chat send"),
            events: EventWriter::disabled("chat"),
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_composing(&self) -> bool {
        self.composing.is_busy()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript().messages().to_vec()
    }

    pub fn len(&self) -> usize {
        self.transcript().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript().is_empty()
    }

    pub fn last_assistant_text(&self) -> Option<String> {
        self.transcript()
            .messages()
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(ChatMessage::text)
    }

    /// Appends the user message, then reconciles it with exactly one
    /// assistant message: the reply, or [`FALLBACK_REPLY`] when the
    /// completion fails. Errors are reserved for sends that never start (a
    /// blank message, or another send still composing); those leave the
    /// transcript untouched.
    ///
    /// An image that cannot be read is logged and the text goes out alone;
    /// with blank text that leaves nothing to send.
    pub fn send_message(&self, text: &str, image: Option<&Path>) -> Result<SendOutcome> {
        let image_block = image.and_then(|path| match OriginalImage::from_path(path) {
            Ok(upload) => Some(ContentBlock::image(upload.data_url())),
            Err(err) => {
                warn!(path = %path.display(), "sending without image: {err}");
                None
            }
        });
        if text.trim().is_empty() && image_block.is_none() {
            return Err(EngineError::Precondition("message needs text or an image"));
        }
        let _composing = self.composing.try_acquire()?;

        let mut user = ChatMessage::user_text(text);
        user.content.extend(image_block);

        let api_messages = {
            let mut transcript = self.transcript();
            transcript.push(user.clone());
            transcript.api_messages()
        };
        self.record_appended(&user);

        let (assistant, reconciliation) = match self
            .backend
            .complete(&api_messages)
            .and_then(|body| parse_completion(&body))
        {
            Ok(reply) => (
                ChatMessage::new(Role::Assistant, reply.content)
                    .with_reasoning(reply.reasoning_details),
                Reconciliation::Replied,
            ),
            Err(err) => {
                warn!(backend = self.backend.name(), "chat completion failed: {err}");
                (
                    ChatMessage::assistant_text(FALLBACK_REPLY),
                    Reconciliation::Fallback {
                        reason: err.to_string(),
                    },
                )
            }
        };

        self.transcript().push(assistant.clone());
        self.record_appended(&assistant);

        Ok(SendOutcome {
            user,
            assistant,
            reconciliation,
        })
    }

    fn transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_appended(&self, message: &ChatMessage) {
        emit_event(
            &self.events,
            "chat_message_appended",
            json!({
                "message_id": message.id,
                "role": message.role,
                "blocks": message.content.len(),
            }),
        );
    }
}
