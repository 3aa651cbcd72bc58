//! InvitationStatus - lifecycle of a call invitation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Lifecycle status of a call invitation.
///
/// ```text
/// Pending ──► Accepted ──► Ended
///    │
///    ├──► Declined
///    ├──► Canceled
///    └──► Missed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Canceled,
    Missed,
    Ended,
}

impl InvitationStatus {
    /// Returns true while the invitation still blocks a new call for the pair.
    pub fn is_open(&self) -> bool {
        matches!(self, InvitationStatus::Pending | InvitationStatus::Accepted)
    }
}

impl StateMachine for InvitationStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use InvitationStatus::*;
        match self {
            Pending => vec![Accepted, Declined, Canceled, Missed],
            Accepted => vec![Ended],
            Declined | Canceled | Missed | Ended => vec![],
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvitationStatus::Pending => "Pending",
            InvitationStatus::Accepted => "Accepted",
            InvitationStatus::Declined => "Declined",
            InvitationStatus::Canceled => "Canceled",
            InvitationStatus::Missed => "Missed",
            InvitationStatus::Ended => "Ended",
        };
        write!(f, "{}", s)
    }
}
