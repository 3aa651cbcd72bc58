//! CallSession - the Accepted phase of a call.

use serde::Serialize;

use crate::domain::foundation::{CallId, CallSessionId, Timestamp, UserId};
use crate::domain::quota::PairKey;

/// Default absolute ceiling for a single call, independent of the monthly cap.
pub const DEFAULT_PER_CALL_CEILING_SECS: u32 = 300;

/// Live call between two participants.
///
/// Exists only while the owning invitation is Accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    session_id: CallSessionId,
    call_id: CallId,
    pair: PairKey,
    caller_id: UserId,
    recipient_id: UserId,
    started_at: Timestamp,
    ended_at: Option<Timestamp>,
    accumulated_seconds: u32,
}

impl CallSession {
    pub fn start(
        session_id: CallSessionId,
        call_id: CallId,
        pair: PairKey,
        caller_id: UserId,
        recipient_id: UserId,
        started_at: Timestamp,
    ) -> Self {
        Self {
            session_id,
            call_id,
            pair,
            caller_id,
            recipient_id,
            started_at,
            ended_at: None,
            accumulated_seconds: 0,
        }
    }

    pub fn session_id(&self) -> CallSessionId {
        self.session_id
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn pair(&self) -> &PairKey {
        &self.pair
    }

    pub fn participants(&self) -> [&UserId; 2] {
        [&self.caller_id, &self.recipient_id]
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Timestamp> {
        self.ended_at
    }

    pub fn accumulated_seconds(&self) -> u32 {
        self.accumulated_seconds
    }

    /// Whole seconds elapsed since the call was accepted.
    pub fn elapsed_secs(&self, now: &Timestamp) -> u32 {
        now.secs_since(&self.started_at)
    }

    /// Closes the session and returns its duration in seconds.
    ///
    /// Calling this twice keeps the first end time.
    pub fn finish(&mut self, now: Timestamp) -> u32 {
        if self.ended_at.is_none() {
            self.accumulated_seconds = self.elapsed_secs(&now);
            self.ended_at = Some(now);
        }
        self.accumulated_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(started: Timestamp) -> CallSession {
        let u1 = UserId::new("u1").unwrap();
        let u2 = UserId::new("u2").unwrap();
        CallSession::start(
            CallSessionId::new(),
            CallId::new(),
            PairKey::new(&u1, &u2).unwrap(),
            u1,
            u2,
            started,
        )
    }

    #[test]
    fn elapsed_counts_whole_seconds() {
        let start = Timestamp::from_unix_secs(1_700_000_000);
        let s = session(start);
        assert_eq!(s.elapsed_secs(&start.plus_secs(42)), 42);
    }

    #[test]
    fn elapsed_before_start_is_zero() {
        let start = Timestamp::from_unix_secs(1_700_000_000);
        let s = session(start);
        assert_eq!(s.elapsed_secs(&Timestamp::from_unix_secs(1_699_999_000)), 0);
    }

    #[test]
    fn finish_is_sticky() {
        let start = Timestamp::from_unix_secs(1_700_000_000);
        let mut s = session(start);
        assert_eq!(s.finish(start.plus_secs(30)), 30);
        assert_eq!(s.finish(start.plus_secs(90)), 30);
        assert_eq!(s.ended_at(), Some(start.plus_secs(30)));
    }
}
