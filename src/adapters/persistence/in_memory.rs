//! In-memory SignalingStore.
//!
//! Keeps every saved message and the latest snapshot of each invitation.
//! Used by the default binary wiring and by tests that inspect what was
//! handed to persistence.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::domain::call::CallInvitation;
use crate::domain::chat::ChatMessage;
use crate::domain::foundation::{CallSessionId, RoomId};
use crate::ports::{SignalingStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemorySignalingStore {
    messages: RwLock<Vec<ChatMessage>>,
    invitations: DashMap<CallSessionId, CallInvitation>,
    failing: AtomicBool,
}

impl InMemorySignalingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects every write.
    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    /// All saved messages in save order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    /// Saved messages of one room in save order.
    pub async fn messages_in(&self, room_id: &RoomId) -> Vec<ChatMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|m| m.room_id() == room_id)
            .cloned()
            .collect()
    }

    /// Latest saved snapshot of an invitation.
    pub fn invitation(&self, session_id: &CallSessionId) -> Option<CallInvitation> {
        self.invitations
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SignalingStore for InMemorySignalingStore {
    async fn save_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.check()?;
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn save_invitation(&self, invitation: &CallInvitation) -> Result<(), StoreError> {
        self.check()?;
        self.invitations
            .insert(invitation.session_id(), invitation.clone());
        Ok(())
    }
}
