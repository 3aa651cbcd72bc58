//! SessionRegistry - live Accepted calls and their time limits.
//!
//! Every tick compares each session's elapsed time with the pair's remaining
//! monthly budget and the per-call ceiling, and asks the controller to end
//! sessions that ran out. A call that reaches the ceiling without going past
//! its budget reports `TimeLimitReached`; one that goes past the budget
//! reports `QuotaExhausted`.

use std::sync::Arc;

use dashmap::DashMap;

use super::call_controller::CallController;
use crate::domain::call::{Actor, CallSession, EndReason};
use crate::domain::foundation::{CallSessionId, SignalError};
use crate::ports::Clock;

use super::quota_gate::QuotaGate;

/// What a tick decided for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// Remaining live budget is at or under the warning threshold.
    Warn { remaining_seconds: u32 },
    End(EndReason),
}

/// Decides the fate of a session from its elapsed time and the pair's
/// remaining monthly budget (not yet including this call).
pub fn verdict(elapsed: u32, remaining: u32, ceiling: u32, warning_threshold: u32) -> Verdict {
    if elapsed >= ceiling && elapsed <= remaining {
        return Verdict::End(EndReason::TimeLimitReached);
    }
    if elapsed >= remaining {
        return Verdict::End(EndReason::QuotaExhausted);
    }
    let live_remaining = remaining - elapsed;
    if live_remaining <= warning_threshold {
        Verdict::Warn {
            remaining_seconds: live_remaining,
        }
    } else {
        Verdict::Continue
    }
}

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub ended: Vec<(CallSessionId, EndReason)>,
    pub warned: usize,
}

#[derive(Debug, Clone)]
struct Tracked {
    session: CallSession,
    warned: bool,
}

/// Registry of live call sessions.
pub struct SessionRegistry {
    sessions: DashMap<CallSessionId, Tracked>,
    quota: Arc<QuotaGate>,
    clock: Arc<dyn Clock>,
    per_call_ceiling_secs: u32,
    quota_warning_secs: u32,
}

impl SessionRegistry {
    pub fn new(
        quota: Arc<QuotaGate>,
        clock: Arc<dyn Clock>,
        per_call_ceiling_secs: u32,
        quota_warning_secs: u32,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            quota,
            clock,
            per_call_ceiling_secs,
            quota_warning_secs,
        }
    }

    /// Starts tracking a session that just became Accepted.
    pub fn track(&self, session: CallSession) {
        tracing::debug!(session_id = %session.session_id(), pair = %session.pair(), "Tracking call session");
        self.sessions.insert(
            session.session_id(),
            Tracked {
                session,
                warned: false,
            },
        );
    }

    /// Stops tracking and hands back the session, if it was live.
    pub fn untrack(&self, session_id: &CallSessionId) -> Option<CallSession> {
        self.sessions
            .remove(session_id)
            .map(|(_, tracked)| tracked.session)
    }

    pub fn is_tracked(&self, session_id: &CallSessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Checks every live session once.
    pub async fn tick(&self, controller: &CallController) -> TickReport {
        let now = self.clock.now();
        let live: Vec<CallSession> = self
            .sessions
            .iter()
            .map(|tracked| tracked.session.clone())
            .collect();

        let mut report = TickReport {
            checked: live.len(),
            ..Default::default()
        };

        for session in live {
            let session_id = session.session_id();
            let elapsed = session.elapsed_secs(&now);

            let decision = match self.quota.remaining_seconds(session.pair()).await {
                Ok(remaining) => verdict(
                    elapsed,
                    remaining,
                    self.per_call_ceiling_secs,
                    self.quota_warning_secs,
                ),
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %e,
                        "Remaining quota unreadable, ending call"
                    );
                    Verdict::End(EndReason::QuotaUnavailable)
                }
            };

            match decision {
                Verdict::Continue => {}
                Verdict::Warn { remaining_seconds } => {
                    if self.mark_warned(&session_id) {
                        controller
                            .send_quota_warning(&session, remaining_seconds)
                            .await;
                        report.warned += 1;
                    }
                }
                Verdict::End(reason) => {
                    match controller.end(session_id, Actor::System, reason).await {
                        Ok(_) => report.ended.push((session_id, reason)),
                        Err(SignalError::InvalidState(_)) | Err(SignalError::NotFound(_)) => {
                            tracing::debug!(session_id = %session_id, "Session already ended");
                        }
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "Forced end failed");
                        }
                    }
                }
            }
        }

        report
    }

    // Flips the warned flag once; false if already warned or untracked.
    fn mark_warned(&self, session_id: &CallSessionId) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut tracked) if !tracked.warned => {
                tracked.warned = true;
                true
            }
            _ => false,
        }
    }
}
