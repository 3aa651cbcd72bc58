//! Per-pair monthly usage record and clamp arithmetic.

use serde::Serialize;

use super::{MonthKey, PairKey};

/// Default monthly call budget per pair (5 minutes).
pub const DEFAULT_MONTHLY_CAP_SECS: u32 = 300;

/// Adds `seconds` to `used`, never exceeding `cap`.
///
/// Values already above `cap` (e.g. after the cap was lowered) are pulled
/// down to `cap` as well.
pub fn clamp_add(used: u32, seconds: u32, cap: u32) -> u32 {
    used.saturating_add(seconds).min(cap)
}

/// Usage counter for one pair in one calendar month.
///
/// # Invariants
///
/// - `used_seconds <= cap_seconds`
/// - An unseen month starts at `used_seconds = 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRecord {
    pair: PairKey,
    month: MonthKey,
    used_seconds: u32,
    cap_seconds: u32,
}

impl QuotaRecord {
    /// Rebuilds a record from stored usage, applying the clamp.
    pub fn reconstitute(pair: PairKey, month: MonthKey, used_seconds: u32, cap_seconds: u32) -> Self {
        Self {
            pair,
            month,
            used_seconds: used_seconds.min(cap_seconds),
            cap_seconds,
        }
    }

    pub fn used_seconds(&self) -> u32 {
        self.used_seconds
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.cap_seconds.saturating_sub(self.used_seconds)
    }

    /// Read-only view for callers and the wire.
    pub fn status(&self) -> QuotaStatus {
        QuotaStatus {
            pair: self.pair.clone(),
            month: self.month,
            used_seconds: self.used_seconds,
            cap_seconds: self.cap_seconds,
            remaining_seconds: self.remaining_seconds(),
        }
    }
}

/// Snapshot of a pair's budget for the current month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub pair: PairKey,
    pub month: MonthKey,
    pub used_seconds: u32,
    pub cap_seconds: u32,
    pub remaining_seconds: u32,
}

impl QuotaStatus {
    pub fn is_exhausted(&self) -> bool {
        self.remaining_seconds == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};
    use proptest::prelude::*;

    fn stored(used: u32, cap: u32) -> QuotaRecord {
        let pair = PairKey::new(&UserId::new("u1").unwrap(), &UserId::new("u2").unwrap()).unwrap();
        QuotaRecord::reconstitute(pair, MonthKey::of(&Timestamp::from_unix_secs(1705276800)), used, cap)
    }

    #[test]
    fn unused_month_has_full_budget() {
        let status = stored(0, DEFAULT_MONTHLY_CAP_SECS).status();
        assert_eq!(status.used_seconds, 0);
        assert_eq!(status.remaining_seconds, 300);
        assert!(!status.is_exhausted());
    }

    #[test]
    fn usage_past_cap_reads_as_exactly_cap() {
        let record = stored(500, 300);
        assert_eq!(record.used_seconds(), 300);
        assert_eq!(record.remaining_seconds(), 0);
        assert!(record.status().is_exhausted());
    }

    #[test]
    fn clamp_stops_at_cap() {
        assert_eq!(clamp_add(280, 30, 300), 300);
        assert_eq!(clamp_add(10, 10, 300), 20);
        assert_eq!(clamp_add(u32::MAX - 1, 10, u32::MAX), u32::MAX);
    }

    proptest! {
        #[test]
        fn clamped_sums_never_exceed_cap(cap in 1u32..10_000, commits in proptest::collection::vec(0u32..2_000, 0..40)) {
            let mut used = 0;
            let mut total: u64 = 0;
            for secs in commits {
                used = clamp_add(used, secs, cap);
                total += u64::from(secs);
                prop_assert!(used <= cap);
            }
            prop_assert_eq!(u64::from(used), total.min(u64::from(cap)));
        }
    }
}
