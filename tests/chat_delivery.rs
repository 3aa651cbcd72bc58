//! Integration tests for room membership and chat fan-out.

mod common;

use common::{room, user, Harness};
use duo_signal::domain::events::{InboundEvent, OutboundEvent};
use duo_signal::domain::foundation::{MessageId, SignalError};

fn send_message(room_id: &str, body: &str) -> InboundEvent {
    InboundEvent::SendMessage {
        room_id: room(room_id),
        body: body.to_string(),
    }
}

fn delivered_ids(events: &[OutboundEvent]) -> Vec<MessageId> {
    events
        .iter()
        .filter_map(|event| match event {
            OutboundEvent::MessageDelivered { message_id, .. } => Some(*message_id),
            _ => None,
        })
        .collect()
}

fn delivered_bodies(events: &[OutboundEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            OutboundEvent::MessageDelivered { body, .. } => Some(body.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn every_device_sees_the_same_message_id() {
    let h = Harness::new();
    let mut phone = h.connect("alice").await;
    let mut laptop = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    for client in [&mut phone, &mut laptop, &mut bob] {
        h.join(client, "r1").await;
    }

    h.send(&phone, send_message("r1", "hi bob")).await.unwrap();

    let ack = phone.drain();
    let sent_id = match ack.as_slice() {
        [OutboundEvent::MessageSent { message_id, .. }] => *message_id,
        other => panic!("expected message_sent ack, got {:?}", other),
    };
    assert_eq!(delivered_ids(&laptop.drain()), vec![sent_id]);

    let bob_events = bob.drain();
    assert_eq!(delivered_ids(&bob_events), vec![sent_id]);
    assert!(matches!(
        bob_events.as_slice(),
        [OutboundEvent::MessageDelivered { sender_id, body, .. }]
            if *sender_id == user("alice") && body == "hi bob"
    ));

    let saved = h.store.messages().await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].message_id(), sent_id);
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    h.join(&mut alice, "r1").await;
    h.join(&mut bob, "r1").await;

    for body in ["m1", "m2", "m3"] {
        h.send(&alice, send_message("r1", body)).await.unwrap();
    }

    assert_eq!(delivered_bodies(&bob.drain()), vec!["m1", "m2", "m3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_produce_one_room_order() {
    let h = Harness::new();
    let mut a1 = h.connect("alice").await;
    let mut a2 = h.connect("alice").await;
    let mut b1 = h.connect("bob").await;
    let mut b2 = h.connect("bob").await;
    for client in [&mut a1, &mut a2, &mut b1, &mut b2] {
        h.join(client, "r1").await;
    }

    let mut tasks = Vec::new();
    for (sender, tag) in [(a1.id, "a"), (b1.id, "b")] {
        let dispatcher = h.services.dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                dispatcher
                    .dispatch(&sender, send_message("r1", &format!("{}{}", tag, i)))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Observers that sent nothing see all twenty in one shared order
    let seen_by_a2 = delivered_bodies(&a2.drain());
    let seen_by_b2 = delivered_bodies(&b2.drain());
    assert_eq!(seen_by_a2.len(), 20);
    assert_eq!(seen_by_a2, seen_by_b2);

    // Each sender's own messages keep their order
    for tag in ["a", "b"] {
        let own: Vec<&String> = seen_by_a2.iter().filter(|b| b.starts_with(tag)).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("{}{}", tag, i)).collect();
        assert_eq!(own, expected.iter().collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn sending_requires_joining_the_room() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    h.join(&mut bob, "r1").await;

    let err = h.send(&alice, send_message("r1", "hi")).await.unwrap_err();

    assert!(matches!(err, SignalError::NotAuthorized(_)));
    assert_eq!(alice.names(), vec!["error"]);
    assert!(bob.drain().is_empty());
    assert!(h.store.messages().await.is_empty());
}

#[tokio::test]
async fn outsider_cannot_join_room() {
    let h = Harness::new();
    let mut carol = h.connect("carol").await;

    let err = h
        .send(&carol, InboundEvent::JoinRoom { room_id: room("r1") })
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::NotAuthorized(_)));
    assert_eq!(carol.names(), vec!["error"]);
}

#[tokio::test]
async fn oversized_message_is_rejected_without_delivery() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    h.join(&mut alice, "r1").await;
    h.join(&mut bob, "r1").await;

    let body = "x".repeat(4001);
    let err = h.send(&alice, send_message("r1", &body)).await.unwrap_err();

    assert!(matches!(err, SignalError::Validation(_)));
    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn left_room_stops_delivery() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    h.join(&mut alice, "r1").await;
    h.join(&mut bob, "r1").await;

    h.send(&bob, InboundEvent::LeaveRoom { room_id: room("r1") })
        .await
        .unwrap();
    assert_eq!(bob.names(), vec!["room_left"]);

    h.send(&alice, send_message("r1", "anyone?")).await.unwrap();
    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn malformed_frame_gets_validation_error() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;

    h.services
        .dispatcher
        .on_frame(&alice.id, r#"{"type":"teleport"}"#)
        .await;

    assert!(matches!(
        alice.drain().as_slice(),
        [OutboundEvent::Error { code, .. }] if code == "VALIDATION_FAILED"
    ));
}

#[tokio::test]
async fn ping_gets_pong() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;

    h.services.dispatcher.on_frame(&alice.id, r#"{"type":"ping"}"#).await;

    assert_eq!(alice.drain(), vec![OutboundEvent::Pong]);
}

#[tokio::test]
async fn disconnect_removes_connection_from_rooms() {
    let h = Harness::new();
    let mut alice = h.connect("alice").await;
    h.join(&mut alice, "r1").await;

    h.services.dispatcher.on_disconnect(&alice.id).await;

    assert_eq!(h.services.registry.connection_count(), 0);
    assert_eq!(h.services.registry.room_count(), 0);
    assert!(h.services.registry.room_members(&room("r1")).is_empty());
}
