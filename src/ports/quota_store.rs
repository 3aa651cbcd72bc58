//! QuotaStore port - backing storage for per-pair monthly call usage.
//!
//! Implementations must make [`QuotaStore::add_clamped`] atomic per
//! `(pair, month)`: two concurrent commits for the same pair never lose an
//! update and never push the stored value past the cap.

use async_trait::async_trait;

use crate::domain::foundation::SignalError;
use crate::domain::quota::{MonthKey, PairKey};

/// Errors that can occur in quota storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaStoreError {
    /// Backend communication error
    #[error("Quota store unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be interpreted
    #[error("Corrupt quota value for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<QuotaStoreError> for SignalError {
    fn from(err: QuotaStoreError) -> Self {
        SignalError::infrastructure(err.to_string())
    }
}

/// Port for quota counters keyed by pair and calendar month.
///
/// An unseen `(pair, month)` reads as zero.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Returns stored usage in seconds.
    async fn used_seconds(&self, pair: &PairKey, month: MonthKey) -> Result<u32, QuotaStoreError>;

    /// Atomically adds `seconds`, clamped at `cap_seconds`.
    ///
    /// Returns the stored usage after the update.
    async fn add_clamped(
        &self,
        pair: &PairKey,
        month: MonthKey,
        seconds: u32,
        cap_seconds: u32,
    ) -> Result<u32, QuotaStoreError>;
}
