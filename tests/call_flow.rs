//! Integration tests for the call handshake.
//!
//! Covers ringing, accept/decline/cancel, ring timeout, replay on
//! reconnect, caller disconnect and the races between them.

mod common;

use std::sync::Arc;

use common::{pair, user, Harness};
use duo_signal::domain::call::{Actor, CallDecision, EndReason, InvitationStatus};
use duo_signal::domain::chat::MessageKind;
use duo_signal::domain::events::{InboundEvent, OutboundEvent};
use duo_signal::domain::foundation::SignalError;

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn accepted_call_delivers_join_reference_to_both() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;

    let session_id = h.ring(&mut alice, "bob").await;
    let invited = bob.drain();
    assert!(matches!(
        invited.as_slice(),
        [OutboundEvent::CallInvited { session_id: s, caller_id, .. }]
            if *s == session_id && *caller_id == user("alice")
    ));

    h.send(
        &bob,
        InboundEvent::CallRespond {
            session_id,
            decision: CallDecision::Accept,
        },
    )
    .await
    .unwrap();

    let expected = OutboundEvent::CallAccepted {
        session_id,
        join_reference: format!("media://{}", session_id),
    };
    assert_eq!(alice.drain(), vec![expected.clone()]);
    assert_eq!(bob.drain(), vec![expected]);
    assert!(h.services.sessions.is_tracked(&session_id));
    assert_eq!(
        h.store.invitation(&session_id).unwrap().status(),
        InvitationStatus::Accepted
    );
}

#[tokio::test]
async fn declined_call_notifies_both_and_frees_pair() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;

    let session_id = h.ring(&mut alice, "bob").await;
    bob.drain();
    h.send(
        &bob,
        InboundEvent::CallRespond {
            session_id,
            decision: CallDecision::Decline,
        },
    )
    .await
    .unwrap();

    assert_eq!(alice.names(), vec!["call_declined"]);
    assert_eq!(bob.names(), vec!["call_declined"]);
    assert!(h.services.controller.open_call(&pair("alice", "bob")).is_none());

    // The pair can call again right away
    let again = h.ring(&mut alice, "bob").await;
    assert_ne!(again, session_id);
}

#[tokio::test]
async fn second_invitation_for_pair_is_rejected() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let bob = h.connect("bob").await;

    let session_id = h.ring(&mut alice, "bob").await;

    let err = h
        .send(
            &bob,
            InboundEvent::CallInitiate {
                recipient_id: user("alice"),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, SignalError::AlreadyInProgress(session_id));
}

#[tokio::test]
async fn unmatched_users_cannot_call() {
    let h = Harness::new();
    let mut bob = h.connect("bob").await;
    let _carol = h.connect("carol").await;

    let err = h
        .send(
            &bob,
            InboundEvent::CallInitiate {
                recipient_id: user("carol"),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::NotAuthorized(_)));
    assert!(matches!(
        bob.drain().as_slice(),
        [OutboundEvent::Error { code, .. }] if code == "NOT_AUTHORIZED"
    ));
}

#[tokio::test]
async fn only_recipient_may_respond_and_only_caller_may_cancel() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let bob = h.connect("bob").await;
    let session_id = h.ring(&mut alice, "bob").await;

    let err = h
        .send(
            &alice,
            InboundEvent::CallRespond {
                session_id,
                decision: CallDecision::Accept,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::InvalidState(_)));

    let err = h
        .send(&bob, InboundEvent::CallCancel { session_id })
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::InvalidState(_)));

    assert_eq!(
        h.services.controller.invitation(&session_id).unwrap().status(),
        InvitationStatus::Pending
    );
}

#[tokio::test]
async fn finished_invitation_rejects_every_transition() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let bob = h.connect("bob").await;
    let session_id = h.ring(&mut alice, "bob").await;

    h.send(&alice, InboundEvent::CallCancel { session_id })
        .await
        .unwrap();

    let accept = h
        .send(
            &bob,
            InboundEvent::CallRespond {
                session_id,
                decision: CallDecision::Accept,
            },
        )
        .await;
    let cancel = h.send(&alice, InboundEvent::CallCancel { session_id }).await;
    let end = h.send(&alice, InboundEvent::CallEnd { session_id }).await;

    for result in [accept, cancel, end] {
        assert!(matches!(result, Err(SignalError::InvalidState(_))));
    }
    assert_eq!(
        h.services.controller.invitation(&session_id).unwrap().status(),
        InvitationStatus::Canceled
    );
}

// =============================================================================
// Timeouts and connection lifecycle
// =============================================================================

#[tokio::test]
async fn unanswered_call_becomes_missed_after_ring_timeout() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    let session_id = h.ring(&mut alice, "bob").await;
    bob.drain();

    h.clock.advance_secs(59);
    assert_eq!(h.services.controller.sweep_expired().await, 0);

    h.clock.advance_secs(1);
    assert_eq!(h.services.controller.sweep_expired().await, 1);

    let missed = OutboundEvent::CallMissed { session_id };
    assert_eq!(alice.drain(), vec![missed.clone()]);
    assert_eq!(bob.drain(), vec![missed]);

    let late = h
        .send(
            &bob,
            InboundEvent::CallRespond {
                session_id,
                decision: CallDecision::Accept,
            },
        )
        .await;
    assert!(matches!(late, Err(SignalError::InvalidState(_))));
}

#[tokio::test]
async fn late_response_before_sweep_still_expires_the_call() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    let session_id = h.ring(&mut alice, "bob").await;
    bob.drain();

    h.clock.advance_secs(61);
    let err = h
        .send(
            &bob,
            InboundEvent::CallRespond {
                session_id,
                decision: CallDecision::Accept,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::InvalidState(_)));
    assert_eq!(alice.names(), vec!["call_missed"]);
    assert_eq!(bob.names(), vec!["call_missed", "error"]);
    assert_eq!(h.services.controller.sweep_expired().await, 0);
}

#[tokio::test]
async fn offline_recipient_gets_invitation_on_connect() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;

    let result = h
        .send(
            &alice,
            InboundEvent::CallInitiate {
                recipient_id: user("bob"),
            },
        )
        .await;
    let session_id = match result {
        Err(SignalError::TransportUnavailable(session_id)) => session_id,
        other => panic!("expected TransportUnavailable, got {:?}", other),
    };
    assert_eq!(alice.names(), vec!["call_ringing", "error"]);

    let mut bob = h.connect_raw("bob").await;
    let events = bob.drain();
    assert_eq!(events[0].name(), "connected");
    assert_eq!(events[1].session_id(), Some(session_id));
    assert_eq!(events[1].name(), "call_invited");

    h.send(
        &bob,
        InboundEvent::CallRespond {
            session_id,
            decision: CallDecision::Accept,
        },
    )
    .await
    .unwrap();
    assert_eq!(alice.names(), vec!["call_accepted"]);
}

#[tokio::test]
async fn caller_going_offline_cancels_ringing_call() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    let session_id = h.ring(&mut alice, "bob").await;
    bob.drain();

    h.services.dispatcher.on_disconnect(&alice.id).await;

    assert_eq!(bob.drain(), vec![OutboundEvent::CallCanceled { session_id }]);
    assert_eq!(
        h.services.controller.invitation(&session_id).unwrap().status(),
        InvitationStatus::Canceled
    );
}

#[tokio::test]
async fn caller_with_another_device_keeps_ringing() {
    let h = Harness::new();
    let mut phone = h.connect("alice").await;
    let _laptop = h.connect("alice").await;
    let _bob = h.connect("bob").await;
    let session_id = h.ring(&mut phone, "bob").await;

    h.services.dispatcher.on_disconnect(&phone.id).await;

    assert_eq!(
        h.services.controller.invitation(&session_id).unwrap().status(),
        InvitationStatus::Pending
    );
}

// =============================================================================
// Ending
// =============================================================================

#[tokio::test]
async fn hangup_commits_duration_and_records_summary() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    let session_id = h.ring(&mut alice, "bob").await;
    h.send(
        &bob,
        InboundEvent::CallRespond {
            session_id,
            decision: CallDecision::Accept,
        },
    )
    .await
    .unwrap();
    alice.drain();
    bob.drain();

    h.clock.advance_secs(42);
    h.send(&alice, InboundEvent::CallEnd { session_id })
        .await
        .unwrap();

    let ended = OutboundEvent::CallEnded {
        session_id,
        duration_seconds: 42,
        reason: EndReason::Hangup,
    };
    assert_eq!(alice.drain(), vec![ended.clone()]);
    assert_eq!(bob.drain(), vec![ended]);

    let status = h.services.quota.status(&pair("alice", "bob")).await.unwrap();
    assert_eq!(status.used_seconds, 42);
    assert!(!h.services.sessions.is_tracked(&session_id));

    let summaries: Vec<_> = h
        .store
        .messages()
        .await
        .into_iter()
        .filter(|m| m.kind() == MessageKind::System)
        .collect();
    assert_eq!(summaries.len(), 1);
}

#[tokio::test]
async fn outsider_cannot_end_a_call() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let bob = h.connect("bob").await;
    let carol = h.connect("carol").await;
    let session_id = h.ring(&mut alice, "bob").await;
    h.send(
        &bob,
        InboundEvent::CallRespond {
            session_id,
            decision: CallDecision::Accept,
        },
    )
    .await
    .unwrap();

    let err = h
        .send(&carol, InboundEvent::CallEnd { session_id })
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::NotAuthorized(_)));
    assert!(h.services.sessions.is_tracked(&session_id));
}

// =============================================================================
// Races
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accept_and_cancel_race_has_one_winner() {
    for _ in 0..20 {
        let h = Harness::new();
        let mut alice = h.connect("alice").await;
        let _bob = h.connect("bob").await;
        let session_id = h.ring(&mut alice, "bob").await;

        let controller = h.services.controller.clone();
        let accept = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .respond(session_id, &user("bob"), CallDecision::Accept)
                    .await
            }
        });
        let cancel = tokio::spawn({
            let controller = controller.clone();
            async move { controller.cancel(session_id, &user("alice")).await }
        });

        let accepted = accept.await.unwrap();
        let canceled = cancel.await.unwrap();
        assert!(accepted.is_ok() != canceled.is_ok(), "exactly one must win");

        let status = controller.invitation(&session_id).unwrap().status();
        if accepted.is_ok() {
            assert_eq!(status, InvitationStatus::Accepted);
            assert!(h.services.sessions.is_tracked(&session_id));
        } else {
            assert_eq!(status, InvitationStatus::Canceled);
            assert!(!h.services.sessions.is_tracked(&session_id));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hangups_end_once_and_charge_once() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let _bob = h.connect("bob").await;
    let session_id = h.ring(&mut alice, "bob").await;
    h.services
        .controller
        .respond(session_id, &user("bob"), CallDecision::Accept)
        .await
        .unwrap();
    h.clock.advance_secs(30);

    let controller = Arc::clone(&h.services.controller);
    let tasks: Vec<_> = ["alice", "bob"]
        .into_iter()
        .map(|who| {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .end(session_id, Actor::User(user(who)), EndReason::Hangup)
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(duration) => {
                assert_eq!(duration, 30);
                wins += 1;
            }
            Err(e) => assert!(matches!(e, SignalError::InvalidState(_))),
        }
    }

    assert_eq!(wins, 1);
    let status = h.services.quota.status(&pair("alice", "bob")).await.unwrap();
    assert_eq!(status.used_seconds, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accept_at_the_deadline_races_the_sweep_with_one_miss() {
    for _ in 0..20 {
        let h = Harness::new();
        let mut alice = h.connect("alice").await;
        let mut bob = h.connect("bob").await;
        let session_id = h.ring(&mut alice, "bob").await;
        bob.drain();
        h.clock.advance_secs(60);

        let controller = h.services.controller.clone();
        let accept = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .respond(session_id, &user("bob"), CallDecision::Accept)
                    .await
            }
        });
        let sweep = tokio::spawn({
            let controller = controller.clone();
            async move { controller.sweep_expired().await }
        });

        let accepted = accept.await.unwrap();
        let swept = sweep.await.unwrap();

        assert!(matches!(accepted, Err(SignalError::InvalidState(_))));
        assert!(swept <= 1);
        assert_eq!(
            controller.invitation(&session_id).unwrap().status(),
            InvitationStatus::Missed
        );
        assert!(!h.services.sessions.is_tracked(&session_id));
        assert_eq!(alice.names(), vec!["call_missed"]);
        assert_eq!(bob.names(), vec!["call_missed"]);
    }
}
