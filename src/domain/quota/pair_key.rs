//! Canonical, order-independent key for two matched users.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::domain::foundation::{UserId, ValidationError};

/// Unordered pair of distinct users.
///
/// `PairKey::new(a, b) == PairKey::new(b, a)`; the lexicographically smaller
/// id is always stored first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: UserId,
    high: UserId,
}

impl PairKey {
    /// Builds the canonical key for two users.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if both ids are the same user
    pub fn new(a: &UserId, b: &UserId) -> Result<Self, ValidationError> {
        if a == b {
            return Err(ValidationError::invalid_format(
                "pair_key",
                "a pair requires two distinct users",
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self {
            low: low.clone(),
            high: high.clone(),
        })
    }

    /// Returns true if the user is one side of this pair.
    pub fn contains(&self, user: &UserId) -> bool {
        &self.low == user || &self.high == user
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}

impl Serialize for PairKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
