//! ChatMessage - a message posted to a conversation room.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{MessageId, RoomId, Timestamp, UserId, ValidationError};

/// Default maximum message length in characters.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4000;

/// Kind of chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Typed by a user.
    #[default]
    Text,
    /// Generated by the server, e.g. a call summary.
    System,
}

/// A chat message.
///
/// The `message_id` is allocated before the message is broadcast so every
/// recipient and the persistence service see the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    message_id: MessageId,
    room_id: RoomId,
    sender_id: UserId,
    body: String,
    sent_at: Timestamp,
    kind: MessageKind,
}

impl ChatMessage {
    /// Creates a user-authored text message.
    ///
    /// # Errors
    ///
    /// - `EmptyField` if the body is blank
    /// - `TooLong` if the body exceeds `max_len` characters
    pub fn text(
        room_id: RoomId,
        sender_id: UserId,
        body: impl Into<String>,
        sent_at: Timestamp,
        max_len: usize,
    ) -> Result<Self, ValidationError> {
        let body = body.into();
        validate_body(&body, max_len)?;
        Ok(Self {
            message_id: MessageId::new(),
            room_id,
            sender_id,
            body,
            sent_at,
            kind: MessageKind::Text,
        })
    }

    /// Creates a server-generated message attributed to `sender_id`.
    pub fn system(room_id: RoomId, sender_id: UserId, body: impl Into<String>, sent_at: Timestamp) -> Self {
        Self {
            message_id: MessageId::new(),
            room_id,
            sender_id,
            body: body.into(),
            sent_at,
            kind: MessageKind::System,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn sender_id(&self) -> &UserId {
        &self.sender_id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn sent_at(&self) -> Timestamp {
        self.sent_at
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }
}

/// Checks a message body against emptiness and length rules.
pub fn validate_body(body: &str, max_len: usize) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::empty_field("body"));
    }
    let len = body.chars().count();
    if len > max_len {
        return Err(ValidationError::too_long("body", max_len, len));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomId {
        RoomId::new("room-1").unwrap()
    }

    fn sender() -> UserId {
        UserId::new("u1").unwrap()
    }

    #[test]
    fn text_message_gets_fresh_id() {
        let now = Timestamp::now();
        let a = ChatMessage::text(room(), sender(), "Hi", now, 10).unwrap();
        let b = ChatMessage::text(room(), sender(), "Hi", now, 10).unwrap();
        assert_ne!(a.message_id(), b.message_id());
        assert_eq!(a.kind(), MessageKind::Text);
    }

    #[test]
    fn blank_body_rejected() {
        let err = ChatMessage::text(room(), sender(), "   ", Timestamp::now(), 10).unwrap_err();
        assert_eq!(err, ValidationError::empty_field("body"));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(validate_body("héllo", 5).is_ok());
        assert_eq!(
            validate_body("héllo!", 5).unwrap_err(),
            ValidationError::too_long("body", 5, 6)
        );
    }

    #[test]
    fn system_message_skips_validation() {
        let msg = ChatMessage::system(room(), sender(), "Call ended (42s)", Timestamp::now());
        assert_eq!(msg.kind(), MessageKind::System);
    }

    #[test]
    fn serializes_camel_case() {
        let msg = ChatMessage::text(room(), sender(), "Hi", Timestamp::now(), 10).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["roomId"], "room-1");
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["kind"], "text");
    }
}
