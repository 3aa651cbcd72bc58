//! Quota module - per-pair monthly call budget.
//!
//! Pure value types; the serialized read-modify-write lives behind the
//! [`QuotaStore`](crate::ports::QuotaStore) port and the
//! [`QuotaGate`](crate::application::QuotaGate) service.

mod month_key;
mod pair_key;
mod record;

pub use month_key::MonthKey;
pub use pair_key::PairKey;
pub use record::{clamp_add, QuotaRecord, QuotaStatus, DEFAULT_MONTHLY_CAP_SECS};
