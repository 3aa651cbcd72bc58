//! Shared harness for signaling integration tests.
//!
//! Wires the real services against in-memory adapters and a manual clock.
//! Matches: alice-bob in room `r1`, alice-carol in room `r2`.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use duo_signal::adapters::{
    InMemoryQuotaStore, InMemorySignalingStore, ManualClock, StaticRelationshipChecker,
    StubMediaProvider,
};
use duo_signal::application::{Collaborators, ConnectionHandle, SignalingServices};
use duo_signal::config::CallsConfig;
use duo_signal::domain::events::{InboundEvent, OutboundEvent};
use duo_signal::domain::foundation::{
    CallSessionId, ConnectionId, RoomId, SignalError, Timestamp, UserId,
};
use duo_signal::domain::quota::{MonthKey, PairKey};
use duo_signal::ports::Clock;

/// 2024-01-15T00:00:00Z
pub const START: u64 = 1_705_276_800;

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn room(id: &str) -> RoomId {
    RoomId::new(id).unwrap()
}

pub fn pair(a: &str, b: &str) -> PairKey {
    PairKey::new(&user(a), &user(b)).unwrap()
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub quota_store: Arc<InMemoryQuotaStore>,
    pub store: Arc<InMemorySignalingStore>,
    pub services: SignalingServices,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CallsConfig::default())
    }

    pub fn with_config(calls: CallsConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(START)));
        let quota_store = Arc::new(InMemoryQuotaStore::new());
        let store = Arc::new(InMemorySignalingStore::new());
        let relationships = StaticRelationshipChecker::new()
            .with_match(&user("alice"), &user("bob"), room("r1"))
            .with_match(&user("alice"), &user("carol"), room("r2"));

        let services = SignalingServices::build(
            &calls,
            Collaborators {
                relationships: Arc::new(relationships),
                quota_store: quota_store.clone(),
                store: store.clone(),
                media: Arc::new(StubMediaProvider::new()),
                clock: clock.clone(),
            },
        );

        Self {
            clock,
            quota_store,
            store,
            services,
        }
    }

    /// Opens a connection and discards the `connected` greeting.
    pub async fn connect(&self, id: &str) -> Client {
        let mut client = self.connect_raw(id).await;
        client.drain();
        client
    }

    /// Opens a connection and keeps everything it was sent.
    pub async fn connect_raw(&self, id: &str) -> Client {
        let (handle, rx) = ConnectionHandle::channel(user(id), 64);
        let id = self.services.dispatcher.on_connect(handle).await;
        Client { id, rx }
    }

    pub async fn send(&self, client: &Client, event: InboundEvent) -> Result<(), SignalError> {
        self.services.dispatcher.dispatch(&client.id, event).await
    }

    pub async fn join(&self, client: &mut Client, room_id: &str) {
        self.send(client, InboundEvent::JoinRoom { room_id: room(room_id) })
            .await
            .unwrap();
        client.drain();
    }

    /// Seeds this month's usage for a pair.
    pub fn seed_usage(&self, pair: &PairKey, used_seconds: u32) {
        self.quota_store
            .seed(pair, MonthKey::of(&self.clock.now()), used_seconds);
    }

    /// Rings `recipient` from `caller` and returns the session id from the
    /// caller's `call_ringing` ack.
    pub async fn ring(&self, caller: &mut Client, recipient: &str) -> CallSessionId {
        let _ = self
            .send(
                caller,
                InboundEvent::CallInitiate {
                    recipient_id: user(recipient),
                },
            )
            .await;
        caller
            .drain()
            .iter()
            .find_map(|event| match event {
                OutboundEvent::CallRinging { session_id, .. } => Some(*session_id),
                _ => None,
            })
            .expect("caller should receive call_ringing")
    }
}

pub struct Client {
    pub id: ConnectionId,
    rx: mpsc::Receiver<OutboundEvent>,
}

impl Client {
    /// Everything queued for this connection so far.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn names(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(|event| event.name()).collect()
    }
}
