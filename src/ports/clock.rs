//! Clock port - source of "now" for every time-based decision.
//!
//! Ring timeouts, session elapsed time and quota month buckets all read the
//! clock through this port so tests can drive virtual time with
//! [`ManualClock`](crate::adapters::ManualClock) instead of sleeping.

use crate::domain::foundation::Timestamp;

/// Port for reading the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}
