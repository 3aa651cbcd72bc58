//! CallInvitation aggregate.
//!
//! An invitation is the unit of the call handshake. It is created Pending,
//! resolves exactly once, and if accepted later moves to Ended.

use serde::Serialize;
use std::time::Duration;

use super::InvitationStatus;
use crate::domain::foundation::{
    CallId, CallSessionId, RoomId, SignalError, StateMachine, Timestamp, UserId,
};
use crate::domain::quota::PairKey;

/// Default ring timeout before a Pending invitation becomes Missed.
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(60);

/// Call invitation between two matched users.
///
/// # Invariants
///
/// - `caller != recipient`
/// - `expires_at = created_at + ring timeout`
/// - `status` only moves along [`InvitationStatus`] transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvitation {
    session_id: CallSessionId,
    call_id: CallId,
    caller_id: UserId,
    recipient_id: UserId,
    pair: PairKey,
    room_id: RoomId,
    created_at: Timestamp,
    expires_at: Timestamp,
    status: InvitationStatus,
    resolved_at: Option<Timestamp>,
}

impl CallInvitation {
    /// Creates a Pending invitation with fresh session and call ids.
    ///
    /// # Errors
    ///
    /// - `NotAuthorized` if caller and recipient are the same user
    pub fn new(
        caller_id: UserId,
        recipient_id: UserId,
        room_id: RoomId,
        now: Timestamp,
        ring_timeout: Duration,
    ) -> Result<Self, SignalError> {
        let pair = PairKey::new(&caller_id, &recipient_id)
            .map_err(|_| SignalError::not_authorized("cannot call yourself"))?;

        Ok(Self {
            session_id: CallSessionId::new(),
            call_id: CallId::new(),
            caller_id,
            recipient_id,
            pair,
            room_id,
            created_at: now,
            expires_at: now.plus(ring_timeout),
            status: InvitationStatus::Pending,
            resolved_at: None,
        })
    }

    pub fn session_id(&self) -> CallSessionId {
        self.session_id
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn caller_id(&self) -> &UserId {
        &self.caller_id
    }

    pub fn recipient_id(&self) -> &UserId {
        &self.recipient_id
    }

    pub fn pair(&self) -> &PairKey {
        &self.pair
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn status(&self) -> InvitationStatus {
        self.status
    }

    /// When the invitation last changed state, if ever.
    pub fn resolved_at(&self) -> Option<Timestamp> {
        self.resolved_at
    }

    /// Returns true once the ring window has closed.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        !now.is_before(&self.expires_at)
    }

    /// Returns true if the user is the caller or the recipient.
    pub fn involves(&self, user: &UserId) -> bool {
        self.pair.contains(user)
    }

    /// Compare-and-set on the status.
    ///
    /// Commits `target` only if the current status is `expected` and the
    /// transition is legal.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if another writer already moved the invitation, or
    ///   the transition is not allowed
    pub fn transition(
        &mut self,
        expected: InvitationStatus,
        target: InvitationStatus,
        now: Timestamp,
    ) -> Result<(), SignalError> {
        if self.status != expected {
            return Err(SignalError::invalid_state(format!(
                "invitation {} is {}, expected {}",
                self.session_id, self.status, expected
            )));
        }
        self.status = self.status.transition_to(target).map_err(|_| {
            SignalError::invalid_state(format!(
                "invitation {} cannot move from {} to {}",
                self.session_id, self.status, target
            ))
        })?;
        self.resolved_at = Some(now);
        Ok(())
    }
}
