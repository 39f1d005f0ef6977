mod message;
mod transcript;

pub use message::{
    normalize_assistant_content, ApiMessage, ChatMessage, ContentBlock, Role, FALLBACK_REPLY,
    GREETING,
};
pub use transcript::Transcript;
