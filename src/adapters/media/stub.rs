//! Stub MediaProvider that issues deterministic join references.

use async_trait::async_trait;

use crate::domain::foundation::CallSessionId;
use crate::domain::quota::PairKey;
use crate::ports::{MediaError, MediaProvider};

/// Issues `media://{session_id}` references without calling out.
#[derive(Debug, Clone, Default)]
pub struct StubMediaProvider {
    failing: bool,
}

impl StubMediaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that is always down.
    pub fn failing() -> Self {
        Self { failing: true }
    }
}

#[async_trait]
impl MediaProvider for StubMediaProvider {
    async fn join_reference(
        &self,
        session_id: CallSessionId,
        _pair: &PairKey,
    ) -> Result<String, MediaError> {
        if self.failing {
            return Err(MediaError::Unavailable("simulated outage".to_string()));
        }
        Ok(format!("media://{}", session_id))
    }
}
