//! Second-resolution UTC instants used for ring deadlines, call timing and
//! message stamps.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A UTC instant. Serializes as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Builds an instant from Unix seconds. Values chrono cannot represent
    /// fall back to the epoch.
    pub fn from_unix_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        Self(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    pub fn as_unix_secs(&self) -> u64 {
        u64::try_from(self.0.timestamp()).unwrap_or(0)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self < other
    }

    /// Whole seconds from `earlier` to `self`. Zero when `earlier` is later.
    pub fn secs_since(&self, earlier: &Timestamp) -> u32 {
        let secs = self.0.signed_duration_since(earlier.0).num_seconds();
        u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX / 1000);
        Self(self.0 + Duration::seconds(secs))
    }

    /// Adds a std duration. An out-of-range duration leaves the instant as is.
    pub fn plus(&self, duration: std::time::Duration) -> Self {
        Duration::from_std(duration)
            .map(|d| Self(self.0 + d))
            .unwrap_or(*self)
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}
