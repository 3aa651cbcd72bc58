//! CallController - the call invitation state machine.
//!
//! # Concurrency
//!
//! Invitations live in a `DashMap` keyed by session id. Every transition is a
//! compare-and-set performed under that entry's lock, so when `respond`,
//! `cancel`, the expiry sweep or a forced `end` race on one session exactly
//! one commits and the others get `InvalidState`.
//!
//! `open_by_pair` holds the single open invitation per pair. It is written
//! only through its entry API and may briefly point at a finished
//! invitation; `initiate` treats such a slot as free.
//!
//! Every transition is committed and announced while holding the room's
//! dispatch lane, so clients receive outcomes in commit order. Persistence
//! runs after the lane is released.
//!
//! Lock order is `room lane → open_by_pair → invitations → sessions`. No
//! map reference is held across an `.await`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::quota_gate::QuotaGate;
use super::room_router::RoomRouter;
use super::session_registry::SessionRegistry;
use crate::domain::call::{
    Actor, CallDecision, CallInvitation, CallSession, EndReason, InvitationStatus,
};
use crate::domain::chat::ChatMessage;
use crate::domain::events::OutboundEvent;
use crate::domain::foundation::{CallSessionId, ConnectionId, SignalError, Timestamp, UserId};
use crate::domain::quota::PairKey;
use crate::ports::{Clock, MediaProvider, RelationshipChecker, SignalingStore};

/// How long finished invitations stay queryable before the sweep drops them.
pub const RESOLVED_RETENTION: Duration = Duration::from_secs(3600);

/// External collaborators the controller talks to.
#[derive(Clone)]
pub struct CallCollaborators {
    pub relationships: Arc<dyn RelationshipChecker>,
    pub store: Arc<dyn SignalingStore>,
    pub media: Arc<dyn MediaProvider>,
}

/// Runs the call handshake for matched pairs.
pub struct CallController {
    invitations: DashMap<CallSessionId, CallInvitation>,
    open_by_pair: DashMap<PairKey, CallSessionId>,
    router: Arc<RoomRouter>,
    quota: Arc<QuotaGate>,
    sessions: Arc<SessionRegistry>,
    collaborators: CallCollaborators,
    clock: Arc<dyn Clock>,
    ring_timeout: Duration,
}

impl CallController {
    pub fn new(
        router: Arc<RoomRouter>,
        quota: Arc<QuotaGate>,
        sessions: Arc<SessionRegistry>,
        collaborators: CallCollaborators,
        clock: Arc<dyn Clock>,
        ring_timeout: Duration,
    ) -> Self {
        Self {
            invitations: DashMap::new(),
            open_by_pair: DashMap::new(),
            router,
            quota,
            sessions,
            collaborators,
            clock,
            ring_timeout,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Handshake
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts ringing the recipient.
    ///
    /// # Errors
    ///
    /// - `NotAuthorized` if the users are not matched (or are the same user)
    /// - `AlreadyInProgress` if the pair already has a Pending or Accepted call
    /// - `QuotaExceeded` if the pair's monthly budget is used up
    /// - `TransportUnavailable` if the recipient is offline; the invitation
    ///   is still recorded and will be replayed when they reconnect
    pub async fn initiate(
        &self,
        caller: &UserId,
        recipient: &UserId,
    ) -> Result<CallSessionId, SignalError> {
        // 1. Matched pair with a conversation room
        if caller == recipient {
            return Err(SignalError::not_authorized("cannot call yourself"));
        }
        let room_id = self
            .collaborators
            .relationships
            .conversation_room(caller, recipient)
            .await?
            .ok_or_else(|| {
                SignalError::not_authorized(format!("{} and {} are not matched", caller, recipient))
            })?;
        let pair = PairKey::new(caller, recipient)?;

        // 2. Cheap check before touching the quota store
        if let Some(existing) = self.open_call(&pair) {
            return Err(SignalError::AlreadyInProgress(existing));
        }

        // 3. Monthly budget
        self.quota.authorize(&pair).await?;

        // 4. Claim the pair slot and ring, both inside the room's lane
        let invitation = CallInvitation::new(
            caller.clone(),
            recipient.clone(),
            room_id,
            self.clock.now(),
            self.ring_timeout,
        )?;
        let session_id = invitation.session_id();
        let report = {
            let turn = self.router.turn(invitation.room_id()).await;
            self.claim_pair(pair, &invitation)?;
            turn.deliver_to_users(&[recipient], invited_event(&invitation))
        };

        tracing::info!(
            session_id = %session_id,
            caller = %caller,
            recipient = %recipient,
            expires_at = %invitation.expires_at().to_rfc3339(),
            "Call invitation created"
        );

        // 5. Persist
        self.persist(&invitation).await;
        if report.reached_nobody() {
            tracing::info!(session_id = %session_id, recipient = %recipient, "Recipient offline, invitation kept for replay");
            return Err(SignalError::TransportUnavailable(session_id));
        }

        Ok(session_id)
    }

    /// Recipient accepts or declines a Pending invitation.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown session
    /// - `InvalidState` if the responder is not the recipient, the
    ///   invitation is no longer Pending, or the ring window has closed
    /// - `Infrastructure` if the media provider cannot issue a join reference
    pub async fn respond(
        &self,
        session_id: CallSessionId,
        responder: &UserId,
        decision: CallDecision,
    ) -> Result<(), SignalError> {
        let invitation = self.snapshot(&session_id)?;
        if invitation.recipient_id() != responder {
            return Err(SignalError::invalid_state(format!(
                "{} is not the recipient of {}",
                responder, session_id
            )));
        }

        let now = self.clock.now();
        if invitation.status() == InvitationStatus::Pending && invitation.is_expired_at(&now) {
            self.expire(&invitation, now).await;
            return Err(SignalError::invalid_state(format!(
                "invitation {} expired",
                session_id
            )));
        }
        if invitation.status() != InvitationStatus::Pending {
            return Err(SignalError::invalid_state(format!(
                "invitation {} is {}",
                session_id,
                invitation.status()
            )));
        }

        match decision {
            CallDecision::Accept => self.accept(&invitation, now).await,
            CallDecision::Decline => {
                self.close_unanswered(
                    &invitation,
                    InvitationStatus::Declined,
                    now,
                    OutboundEvent::CallDeclined { session_id },
                )
                .await?;
                tracing::info!(session_id = %session_id, "Call declined");
                Ok(())
            }
        }
    }

    /// Caller withdraws a Pending invitation.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown session
    /// - `InvalidState` if the user is not the caller or the invitation is
    ///   no longer Pending
    pub async fn cancel(&self, session_id: CallSessionId, caller: &UserId) -> Result<(), SignalError> {
        let invitation = self.snapshot(&session_id)?;
        if invitation.caller_id() != caller {
            return Err(SignalError::invalid_state(format!(
                "{} is not the caller of {}",
                caller, session_id
            )));
        }

        self.close_unanswered(
            &invitation,
            InvitationStatus::Canceled,
            self.clock.now(),
            OutboundEvent::CallCanceled { session_id },
        )
        .await?;
        tracing::info!(session_id = %session_id, "Call canceled by caller");
        Ok(())
    }

    /// Ends an Accepted call, commits its duration to the pair's quota and
    /// notifies both participants. Returns the duration in seconds.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown session
    /// - `NotAuthorized` if a user who is not a participant tries to end it
    /// - `InvalidState` if the call is not Accepted (including a second end)
    pub async fn end(
        &self,
        session_id: CallSessionId,
        ender: Actor,
        reason: EndReason,
    ) -> Result<u32, SignalError> {
        let now = self.clock.now();
        let snapshot = self.snapshot(&session_id)?;
        if let Some(user) = ender.user_id() {
            if !snapshot.involves(user) {
                return Err(SignalError::not_authorized(format!(
                    "{} is not a participant of {}",
                    user, session_id
                )));
            }
        }

        let (invitation, duration) = {
            let turn = self.router.turn(snapshot.room_id()).await;

            // 1. Commit Accepted → Ended and take the live session
            let (invitation, session) = {
                let mut invitation = self.invitations.get_mut(&session_id).ok_or_else(|| {
                    SignalError::not_found(format!("call session {}", session_id))
                })?;
                invitation.transition(InvitationStatus::Accepted, InvitationStatus::Ended, now)?;
                (invitation.value().clone(), self.sessions.untrack(&session_id))
            };

            // 2. Account the call before the pair can ring again
            let duration = match session {
                Some(mut session) => session.finish(now),
                None => {
                    tracing::warn!(session_id = %session_id, "Ended call had no live session");
                    0
                }
            };
            self.commit_usage(invitation.pair(), duration, session_id).await;
            self.release_pair(&invitation);

            // 3. Notify
            turn.deliver_to_users(
                &participants(&invitation),
                OutboundEvent::CallEnded {
                    session_id,
                    duration_seconds: duration,
                    reason,
                },
            );
            (invitation, duration)
        };

        tracing::info!(
            session_id = %session_id,
            pair = %invitation.pair(),
            duration_seconds = duration,
            reason = %reason,
            ended_by = %ender,
            "Call ended"
        );

        // 4. Persistence hand-off
        self.persist(&invitation).await;
        self.record_summary(&invitation, duration, reason, now).await;

        Ok(duration)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timers and connection lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Moves every Pending invitation past its deadline to Missed and drops
    /// finished invitations older than [`RESOLVED_RETENTION`]. Returns the
    /// number of invitations that became Missed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<CallInvitation> = self
            .invitations
            .iter()
            .filter(|entry| {
                entry.status() == InvitationStatus::Pending && entry.is_expired_at(&now)
            })
            .map(|entry| entry.value().clone())
            .collect();

        let mut missed = 0;
        for invitation in due {
            if self.expire(&invitation, now).await {
                missed += 1;
            }
        }

        self.prune_resolved(now);
        missed
    }

    /// Cancels a caller's ringing invitations once their last connection is
    /// gone. Accepted calls are left to the session limits.
    pub async fn caller_went_offline(&self, caller: &UserId) -> usize {
        let now = self.clock.now();
        let outgoing: Vec<CallInvitation> = self
            .invitations
            .iter()
            .filter(|entry| {
                entry.status() == InvitationStatus::Pending && entry.caller_id() == caller
            })
            .map(|entry| entry.value().clone())
            .collect();

        let mut canceled = 0;
        for invitation in outgoing {
            let session_id = invitation.session_id();
            let closed = self
                .close_unanswered(
                    &invitation,
                    InvitationStatus::Canceled,
                    now,
                    OutboundEvent::CallCanceled { session_id },
                )
                .await;
            match closed {
                Ok(_) => {
                    tracing::info!(session_id = %session_id, caller = %caller, "Caller disconnected, call canceled");
                    canceled += 1;
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Invitation resolved before disconnect cleanup");
                }
            }
        }
        canceled
    }

    /// Re-sends `call_invited` to a freshly registered connection for every
    /// invitation still ringing for its user, oldest first. Each invitation
    /// is rechecked inside its room's lane, so a replay never lands after
    /// the call's outcome. Returns the number replayed.
    pub async fn replay_pending(&self, recipient: &UserId, connection_id: &ConnectionId) -> usize {
        let now = self.clock.now();
        let mut pending: Vec<CallInvitation> = self
            .invitations
            .iter()
            .filter(|entry| {
                entry.status() == InvitationStatus::Pending
                    && entry.recipient_id() == recipient
                    && !entry.is_expired_at(&now)
            })
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|invitation| invitation.created_at());

        let mut replayed = 0;
        for invitation in pending {
            let turn = self.router.turn(invitation.room_id()).await;
            if self.is_ringing(&invitation.session_id())
                && turn.send_to_connection(connection_id, invited_event(&invitation))
            {
                replayed += 1;
            }
        }
        replayed
    }

    /// Tells both participants the pair's budget is nearly spent.
    pub async fn send_quota_warning(&self, session: &CallSession, remaining_seconds: u32) {
        let Some(invitation) = self.invitation(&session.session_id()) else {
            return;
        };
        tracing::info!(
            session_id = %session.session_id(),
            pair = %session.pair(),
            remaining_seconds,
            "Quota warning"
        );
        self.router
            .deliver_to_users(
                invitation.room_id(),
                &session.participants(),
                OutboundEvent::QuotaWarning {
                    pair_key: session.pair().clone(),
                    remaining_seconds,
                },
            )
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn invitation(&self, session_id: &CallSessionId) -> Option<CallInvitation> {
        self.invitations
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    /// Open (Pending or Accepted) invitation for the pair, if any.
    pub fn open_call(&self, pair: &PairKey) -> Option<CallSessionId> {
        let existing = self.open_by_pair.get(pair).map(|slot| *slot)?;
        self.is_open(&existing).then_some(existing)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn accept(&self, invitation: &CallInvitation, now: Timestamp) -> Result<(), SignalError> {
        let session_id = invitation.session_id();
        let join_reference = self
            .collaborators
            .media
            .join_reference(session_id, invitation.pair())
            .await?;

        let accepted = {
            let turn = self.router.turn(invitation.room_id()).await;
            let accepted = self.transition(
                &session_id,
                InvitationStatus::Pending,
                InvitationStatus::Accepted,
                now,
            )?;
            turn.deliver_to_users(
                &participants(&accepted),
                OutboundEvent::CallAccepted {
                    session_id,
                    join_reference,
                },
            );
            accepted
        };
        tracing::info!(session_id = %session_id, pair = %accepted.pair(), "Call accepted");

        self.persist(&accepted).await;
        Ok(())
    }

    /// Compare-and-set on one invitation. Entering Accepted also starts the
    /// live session under the same entry lock.
    fn transition(
        &self,
        session_id: &CallSessionId,
        expected: InvitationStatus,
        target: InvitationStatus,
        now: Timestamp,
    ) -> Result<CallInvitation, SignalError> {
        let mut entry = self
            .invitations
            .get_mut(session_id)
            .ok_or_else(|| SignalError::not_found(format!("call session {}", session_id)))?;
        let invitation = entry.value_mut();
        invitation.transition(expected, target, now)?;

        if target == InvitationStatus::Accepted {
            self.sessions.track(CallSession::start(
                invitation.session_id(),
                invitation.call_id(),
                invitation.pair().clone(),
                invitation.caller_id().clone(),
                invitation.recipient_id().clone(),
                now,
            ));
        }
        Ok(invitation.clone())
    }

    // Records the invitation and points the pair at it. A slot still naming
    // a finished invitation counts as free.
    fn claim_pair(&self, pair: PairKey, invitation: &CallInvitation) -> Result<(), SignalError> {
        let session_id = invitation.session_id();
        match self.open_by_pair.entry(pair) {
            Entry::Occupied(mut slot) => {
                let existing = *slot.get();
                if self.is_open(&existing) {
                    return Err(SignalError::AlreadyInProgress(existing));
                }
                self.invitations.insert(session_id, invitation.clone());
                slot.insert(session_id);
            }
            Entry::Vacant(slot) => {
                self.invitations.insert(session_id, invitation.clone());
                slot.insert(session_id);
            }
        }
        Ok(())
    }

    async fn expire(&self, invitation: &CallInvitation, now: Timestamp) -> bool {
        let session_id = invitation.session_id();
        let closed = self
            .close_unanswered(
                invitation,
                InvitationStatus::Missed,
                now,
                OutboundEvent::CallMissed { session_id },
            )
            .await;
        match closed {
            Ok(_) => {
                tracing::info!(session_id = %session_id, "Call missed");
                true
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Expiry lost the race");
                false
            }
        }
    }

    // Shared path of Declined, Canceled and Missed: commit, free the pair and
    // notify inside the room's lane, then persist.
    async fn close_unanswered(
        &self,
        invitation: &CallInvitation,
        target: InvitationStatus,
        now: Timestamp,
        event: OutboundEvent,
    ) -> Result<CallInvitation, SignalError> {
        let closed = {
            let turn = self.router.turn(invitation.room_id()).await;
            let closed = self.transition(
                &invitation.session_id(),
                InvitationStatus::Pending,
                target,
                now,
            )?;
            self.release_pair(&closed);
            turn.deliver_to_users(&participants(&closed), event);
            closed
        };
        self.persist(&closed).await;
        Ok(closed)
    }

    async fn commit_usage(&self, pair: &PairKey, seconds: u32, session_id: CallSessionId) {
        if seconds == 0 {
            return;
        }
        match self.quota.commit_usage(pair, seconds).await {
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(session_id = %session_id, pair = %pair, error = %e, "Quota commit failed, retrying");
            }
        }
        if let Err(e) = self.quota.commit_usage(pair, seconds).await {
            tracing::error!(
                session_id = %session_id,
                pair = %pair,
                seconds,
                error = %e,
                "Quota commit failed after retry, usage not recorded"
            );
        }
    }

    async fn record_summary(
        &self,
        invitation: &CallInvitation,
        duration: u32,
        reason: EndReason,
        now: Timestamp,
    ) {
        let summary = ChatMessage::system(
            invitation.room_id().clone(),
            invitation.caller_id().clone(),
            format!("Call ended after {}s ({})", duration, reason),
            now,
        );
        if let Err(e) = self.collaborators.store.save_message(&summary).await {
            tracing::warn!(session_id = %invitation.session_id(), error = %e, "Failed to persist call summary");
        }
    }

    async fn persist(&self, invitation: &CallInvitation) {
        if let Err(e) = self.collaborators.store.save_invitation(invitation).await {
            tracing::warn!(
                session_id = %invitation.session_id(),
                status = %invitation.status(),
                error = %e,
                "Failed to persist invitation"
            );
        }
    }

    fn release_pair(&self, invitation: &CallInvitation) {
        let session_id = invitation.session_id();
        self.open_by_pair
            .remove_if(invitation.pair(), |_, current| *current == session_id);
    }

    fn is_open(&self, session_id: &CallSessionId) -> bool {
        self.invitations
            .get(session_id)
            .map(|entry| entry.status().is_open())
            .unwrap_or(false)
    }

    fn is_ringing(&self, session_id: &CallSessionId) -> bool {
        let now = self.clock.now();
        self.invitations
            .get(session_id)
            .map(|entry| entry.status() == InvitationStatus::Pending && !entry.is_expired_at(&now))
            .unwrap_or(false)
    }

    fn snapshot(&self, session_id: &CallSessionId) -> Result<CallInvitation, SignalError> {
        self.invitation(session_id)
            .ok_or_else(|| SignalError::not_found(format!("call session {}", session_id)))
    }

    fn prune_resolved(&self, now: Timestamp) {
        self.invitations.retain(|_, invitation| {
            let finished = !invitation.status().is_open();
            let stale = invitation
                .resolved_at()
                .map(|at| !now.is_before(&at.plus(RESOLVED_RETENTION)))
                .unwrap_or(false);
            !(finished && stale)
        });
    }
}

fn participants(invitation: &CallInvitation) -> [&UserId; 2] {
    [invitation.caller_id(), invitation.recipient_id()]
}

fn invited_event(invitation: &CallInvitation) -> OutboundEvent {
    OutboundEvent::CallInvited {
        session_id: invitation.session_id(),
        call_id: invitation.call_id(),
        caller_id: invitation.caller_id().clone(),
        expires_at: invitation.expires_at(),
    }
}
