//! In-memory quota store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::quota::{clamp_add, MonthKey, PairKey};
use crate::ports::{QuotaStore, QuotaStoreError};

/// Quota counters held in process memory.
///
/// `add_clamped` runs under the DashMap shard lock for its key, so it is
/// atomic per `(pair, month)`.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    usage: DashMap<(PairKey, MonthKey), u32>,
    failing: AtomicBool,
    commit_failures: AtomicU32,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose every call fails (for testing outage handling).
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next `n` calls to `add_clamped` fail while reads keep
    /// working.
    pub fn fail_next_commits(&self, n: u32) {
        self.commit_failures.store(n, Ordering::SeqCst);
    }

    /// Seeds usage directly, bypassing the cap.
    pub fn seed(&self, pair: &PairKey, month: MonthKey, used_seconds: u32) {
        self.usage.insert((pair.clone(), month), used_seconds);
    }

    fn check(&self) -> Result<(), QuotaStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(QuotaStoreError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn used_seconds(&self, pair: &PairKey, month: MonthKey) -> Result<u32, QuotaStoreError> {
        self.check()?;
        Ok(self
            .usage
            .get(&(pair.clone(), month))
            .map(|used| *used)
            .unwrap_or(0))
    }

    async fn add_clamped(
        &self,
        pair: &PairKey,
        month: MonthKey,
        seconds: u32,
        cap_seconds: u32,
    ) -> Result<u32, QuotaStoreError> {
        self.check()?;
        let injected = self
            .commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if injected.is_ok() {
            return Err(QuotaStoreError::Unavailable("commit rejected".to_string()));
        }
        let mut used = self.usage.entry((pair.clone(), month)).or_insert(0);
        *used = clamp_add(*used, seconds, cap_seconds);
        Ok(*used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};

    fn pair() -> PairKey {
        PairKey::new(&UserId::new("a").unwrap(), &UserId::new("b").unwrap()).unwrap()
    }

    fn month() -> MonthKey {
        MonthKey::of(&Timestamp::from_unix_secs(1_705_276_800))
    }

    #[tokio::test]
    async fn unseen_key_reads_zero() {
        let store = InMemoryQuotaStore::new();
        assert_eq!(store.used_seconds(&pair(), month()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_clamps_at_cap() {
        let store = InMemoryQuotaStore::new();
        assert_eq!(store.add_clamped(&pair(), month(), 200, 300).await.unwrap(), 200);
        assert_eq!(store.add_clamped(&pair(), month(), 200, 300).await.unwrap(), 300);
        assert_eq!(store.used_seconds(&pair(), month()).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let store = InMemoryQuotaStore::failing();
        assert!(matches!(
            store.used_seconds(&pair(), month()).await,
            Err(QuotaStoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn injected_commit_failures_run_out() {
        let store = InMemoryQuotaStore::new();
        store.fail_next_commits(1);
        assert!(store.add_clamped(&pair(), month(), 10, 300).await.is_err());
        assert_eq!(store.used_seconds(&pair(), month()).await.unwrap(), 0);
        assert_eq!(store.add_clamped(&pair(), month(), 10, 300).await.unwrap(), 10);
    }
}
