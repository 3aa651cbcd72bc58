//! Calendar month bucket for quota accounting.

use chrono::Datelike;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::domain::foundation::Timestamp;

/// A UTC calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Month containing the given instant (UTC).
    pub fn of(ts: &Timestamp) -> Self {
        let dt = ts.as_datetime();
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
