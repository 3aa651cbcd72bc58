//! RelationshipChecker port - Contract with the match/relationship service.
//!
//! This core never decides who may talk to whom. Room membership and call
//! initiation are both authorized by asking the external service.

use async_trait::async_trait;

use crate::domain::foundation::{RoomId, SignalError, UserId};

/// Errors raised by the relationship service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelationshipError {
    #[error("Relationship service unavailable: {0}")]
    Unavailable(String),
}

impl From<RelationshipError> for SignalError {
    fn from(err: RelationshipError) -> Self {
        SignalError::infrastructure(err.to_string())
    }
}

/// Port for match/conversation authorization.
///
/// # Fail-secure
///
/// Callers treat an error as a rejection; nothing is mutated on failure.
#[async_trait]
pub trait RelationshipChecker: Send + Sync {
    /// Returns true if the user is an authorized participant of the room.
    async fn is_room_participant(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<bool, RelationshipError>;

    /// Returns the conversation room of a matched pair, or `None` if the two
    /// users are not matched.
    async fn conversation_room(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<RoomId>, RelationshipError>;
}
