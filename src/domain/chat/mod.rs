//! Chat module - messages exchanged in conversation rooms.

mod message;

pub use message::{validate_body, ChatMessage, MessageKind, DEFAULT_MAX_MESSAGE_LEN};
