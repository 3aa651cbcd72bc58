//! MediaProvider port - third-party video room hand-off.
//!
//! Audio and video never pass through this service. When a call is accepted
//! the provider issues an opaque join reference that both clients use to
//! connect to the media room.

use async_trait::async_trait;

use crate::domain::foundation::{CallSessionId, SignalError};
use crate::domain::quota::PairKey;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Media provider unavailable: {0}")]
    Unavailable(String),
}

impl From<MediaError> for SignalError {
    fn from(err: MediaError) -> Self {
        SignalError::infrastructure(err.to_string())
    }
}

/// Port for obtaining media room join references.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Returns the join reference for an accepted call.
    async fn join_reference(
        &self,
        session_id: CallSessionId,
        pair: &PairKey,
    ) -> Result<String, MediaError>;
}
