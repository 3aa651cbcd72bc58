//! Small value types used by the call handshake.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::UserId;

/// Recipient's answer to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDecision {
    Accept,
    Decline,
}

/// Why an accepted call ended.
///
/// Serialized with the variant name (`"QuotaExhausted"`), which is what
/// clients display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    /// A participant hung up.
    Hangup,
    /// The pair's monthly budget ran out during the call.
    QuotaExhausted,
    /// The call hit the absolute per-call ceiling.
    TimeLimitReached,
    /// Remaining budget could not be read; the call is closed rather than
    /// left running unbounded.
    QuotaUnavailable,
}

impl EndReason {
    /// Returns true for reasons raised by the system rather than a participant.
    pub fn is_forced(&self) -> bool {
        !matches!(self, EndReason::Hangup)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::Hangup => "Hangup",
            EndReason::QuotaExhausted => "QuotaExhausted",
            EndReason::TimeLimitReached => "TimeLimitReached",
            EndReason::QuotaUnavailable => "QuotaUnavailable",
        };
        write!(f, "{}", s)
    }
}

/// Who asked for a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(UserId),
    /// Timers and quota enforcement.
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Actor::User(id) => Some(id),
            Actor::System => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::System => write!(f, "system"),
        }
    }
}
