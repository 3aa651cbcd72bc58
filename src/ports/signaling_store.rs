//! SignalingStore port - hand-off to the persistence service.
//!
//! Ids are allocated before broadcast, so the write here can lag behind
//! delivery. A failed write is logged by the caller and never undoes an
//! event that was already delivered.

use async_trait::async_trait;

use crate::domain::call::CallInvitation;
use crate::domain::chat::ChatMessage;

/// Errors raised by the persistence service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

/// Port for persisting finalized chat messages and invitation transitions.
#[async_trait]
pub trait SignalingStore: Send + Sync {
    /// Stores a chat message. Called once per message after delivery.
    async fn save_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// Upserts an invitation snapshot. Called after every committed transition.
    async fn save_invitation(&self, invitation: &CallInvitation) -> Result<(), StoreError>;
}
