//! QuotaGate - monthly call budget per matched pair.
//!
//! All usage commits for a pair funnel through that pair's guard, so two
//! sessions ending at the same moment are applied one after the other. The
//! store itself clamps at the cap, which keeps the bound even across
//! instances sharing a Redis store.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::domain::foundation::SignalError;
use crate::domain::quota::{MonthKey, PairKey, QuotaRecord, QuotaStatus};
use crate::ports::{Clock, QuotaStore};

/// Enforces and accounts the per-pair monthly call budget.
pub struct QuotaGate {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    cap_seconds: u32,
    guards: DashMap<PairKey, Arc<Mutex<()>>>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>, cap_seconds: u32) -> Self {
        Self {
            store,
            clock,
            cap_seconds,
            guards: DashMap::new(),
        }
    }

    /// Allows a new call unless this month's budget is used up.
    ///
    /// # Errors
    ///
    /// - `QuotaExceeded` if `used >= cap`
    /// - `Infrastructure` if the store fails
    pub async fn authorize(&self, pair: &PairKey) -> Result<QuotaStatus, SignalError> {
        let status = self.status(pair).await?;
        if status.is_exhausted() {
            tracing::info!(pair = %pair, month = %status.month, "Call denied, monthly quota exhausted");
            return Err(SignalError::QuotaExceeded);
        }
        Ok(status)
    }

    /// Adds call time to the current month, clamped at the cap.
    pub async fn commit_usage(&self, pair: &PairKey, seconds: u32) -> Result<QuotaStatus, SignalError> {
        let month = self.current_month();
        let guard = self.guard(pair);
        let used = {
            let _serialized = guard.lock().await;
            self.store
                .add_clamped(pair, month, seconds, self.cap_seconds)
                .await?
        };
        drop(guard);
        self.release_guard(pair);

        let record = QuotaRecord::reconstitute(pair.clone(), month, used, self.cap_seconds);
        tracing::debug!(
            pair = %pair,
            month = %month,
            seconds,
            used_seconds = record.used_seconds(),
            "Quota usage committed"
        );
        Ok(record.status())
    }

    /// `cap - used` for the current month.
    pub async fn remaining_seconds(&self, pair: &PairKey) -> Result<u32, SignalError> {
        Ok(self.status(pair).await?.remaining_seconds)
    }

    /// Current month's usage snapshot.
    pub async fn status(&self, pair: &PairKey) -> Result<QuotaStatus, SignalError> {
        let month = self.current_month();
        let used = self.store.used_seconds(pair, month).await?;
        Ok(QuotaRecord::reconstitute(pair.clone(), month, used, self.cap_seconds).status())
    }

    fn current_month(&self) -> MonthKey {
        MonthKey::of(&self.clock.now())
    }

    fn guard(&self, pair: &PairKey) -> Arc<Mutex<()>> {
        self.guards
            .entry(pair.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_guard(&self, pair: &PairKey) {
        self.guards
            .remove_if(pair, |_, guard| Arc::strong_count(guard) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryQuotaStore, ManualClock};
    use crate::domain::foundation::{Timestamp, UserId};

    fn pair() -> PairKey {
        PairKey::new(&UserId::new("u1").unwrap(), &UserId::new("u2").unwrap()).unwrap()
    }

    fn gate(clock: Arc<ManualClock>) -> QuotaGate {
        QuotaGate::new(Arc::new(InMemoryQuotaStore::new()), clock, 300)
    }

    fn january() -> Arc<ManualClock> {
        // 2024-01-15T00:00:00Z
        Arc::new(ManualClock::new(Timestamp::from_unix_secs(1705276800)))
    }

    #[tokio::test]
    async fn unseen_pair_has_full_budget() {
        let gate = gate(january());
        assert_eq!(gate.remaining_seconds(&pair()).await.unwrap(), 300);
        assert!(gate.authorize(&pair()).await.is_ok());
    }

    #[tokio::test]
    async fn commit_clamps_at_cap() {
        let gate = gate(january());
        gate.commit_usage(&pair(), 280).await.unwrap();
        let status = gate.commit_usage(&pair(), 30).await.unwrap();

        assert_eq!(status.used_seconds, 300);
        assert_eq!(status.remaining_seconds, 0);
        assert_eq!(gate.authorize(&pair()).await, Err(SignalError::QuotaExceeded));
    }

    #[tokio::test]
    async fn new_month_starts_at_zero() {
        let clock = january();
        let gate = gate(clock.clone());
        gate.commit_usage(&pair(), 300).await.unwrap();

        clock.advance_secs(31 * 24 * 3600);
        let status = gate.status(&pair()).await.unwrap();
        assert_eq!(status.month.to_string(), "2024-02");
        assert_eq!(status.used_seconds, 0);
    }

    #[tokio::test]
    async fn concurrent_commits_never_exceed_cap() {
        let gate = Arc::new(gate(january()));
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                gate.commit_usage(&pair(), 25).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(gate.status(&pair()).await.unwrap().used_seconds, 300);
        assert!(gate.guards.is_empty());
    }
}
