//! RoomRouter - ordered fan-out of events to room members.
//!
//! Each room has one dispatch lane (an async mutex). Every delivery for the
//! room, whether a broadcast or a targeted call event, enqueues its frames
//! while holding the lane, so all members observe the room's events in
//! submission order. Enqueueing never blocks: a full connection queue drops
//! the frame for that connection only.
//!
//! Callers that change state and then announce it take a [`LaneTurn`] and
//! do both under it, so clients see outcomes in commit order.
//!
//! ```text
//!  send_message ─┐
//!  call_initiate ─┼─► lane(room) ─► conn-1 queue ─► socket
//!  sweep (missed) ┘                └► conn-2 queue ─► socket
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::connection_registry::{ConnectionHandle, ConnectionRegistry, DeliveryFailure};
use crate::domain::events::OutboundEvent;
use crate::domain::foundation::{ConnectionId, RoomId, UserId};

/// Outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the event was queued for.
    pub delivered: usize,
    /// Connections whose queue was full or closed.
    pub dropped: usize,
}

impl DeliveryReport {
    /// True if no connection received the event.
    pub fn reached_nobody(&self) -> bool {
        self.delivered == 0
    }

    fn record(&mut self, handle: &ConnectionHandle, event: &OutboundEvent) {
        match handle.try_deliver(event.clone()) {
            Ok(()) => self.delivered += 1,
            Err(DeliveryFailure::QueueFull) => {
                self.dropped += 1;
                tracing::warn!(
                    connection_id = %handle.id(),
                    event = event.name(),
                    "Outbound queue full, dropping event"
                );
            }
            Err(DeliveryFailure::Closed) => {
                self.dropped += 1;
                tracing::debug!(
                    connection_id = %handle.id(),
                    event = event.name(),
                    "Connection closed before delivery"
                );
            }
        }
    }
}

/// Routes events to room members through per-room dispatch lanes.
pub struct RoomRouter {
    registry: Arc<ConnectionRegistry>,
    lanes: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl RoomRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            lanes: DashMap::new(),
        }
    }

    /// Waits for exclusive use of the room's dispatch lane.
    pub async fn turn(&self, room_id: &RoomId) -> LaneTurn<'_> {
        let guard = self.lane(room_id).lock_owned().await;
        LaneTurn {
            router: self,
            room_id: room_id.clone(),
            guard: Some(guard),
        }
    }

    /// Delivers `event` to every live connection of every room member.
    ///
    /// Best effort; nothing is retried.
    pub async fn broadcast(
        &self,
        room_id: &RoomId,
        event: OutboundEvent,
        exclude: Option<ConnectionId>,
    ) -> DeliveryReport {
        let _turn = self.turn(room_id).await;
        let members = self.registry.room_members(room_id);
        self.fan_out(&members, &event, exclude)
    }

    /// Delivers `event` to the listed users' connections through the room's
    /// lane, whether or not they have joined the room.
    pub async fn deliver_to_users(
        &self,
        room_id: &RoomId,
        users: &[&UserId],
        event: OutboundEvent,
    ) -> DeliveryReport {
        self.turn(room_id).await.deliver_to_users(users, event)
    }

    /// Sends directly to one connection, outside any room lane. Used for
    /// acks and errors addressed to the requester.
    pub fn send_to_connection(&self, connection_id: &ConnectionId, event: OutboundEvent) -> bool {
        self.send_one(connection_id, &event)
    }

    /// Number of rooms with a dispatch in flight.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }

    fn send_one(&self, connection_id: &ConnectionId, event: &OutboundEvent) -> bool {
        match self.registry.connection(connection_id) {
            Some(handle) => {
                let mut report = DeliveryReport::default();
                report.record(&handle, event);
                report.delivered == 1
            }
            None => false,
        }
    }

    fn fan_out(
        &self,
        users: &[UserId],
        event: &OutboundEvent,
        exclude: Option<ConnectionId>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut seen = HashSet::new();
        for user_id in users {
            for handle in self.registry.connections_for(user_id) {
                if Some(handle.id()) == exclude || !seen.insert(handle.id()) {
                    continue;
                }
                report.record(&handle, event);
            }
        }
        report
    }

    fn lane(&self, room_id: &RoomId) -> Arc<Mutex<()>> {
        self.lanes
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Clones are only taken under the shard lock, so a count of one here
    // means no dispatch holds or waits on this lane.
    fn release_lane(&self, room_id: &RoomId) {
        self.lanes
            .remove_if(room_id, |_, lane| Arc::strong_count(lane) == 1);
    }
}

/// Exclusive hold on one room's dispatch lane. The lane is handed to the
/// next waiter when the turn is dropped.
pub struct LaneTurn<'a> {
    router: &'a RoomRouter,
    room_id: RoomId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LaneTurn<'_> {
    /// Queues `event` for every live connection of the listed users.
    pub fn deliver_to_users(&self, users: &[&UserId], event: OutboundEvent) -> DeliveryReport {
        let users: Vec<UserId> = users.iter().map(|u| (*u).clone()).collect();
        self.router.fan_out(&users, &event, None)
    }

    /// Queues `event` for a single connection.
    pub fn send_to_connection(&self, connection_id: &ConnectionId, event: OutboundEvent) -> bool {
        self.router.send_one(connection_id, &event)
    }
}

impl Drop for LaneTurn<'_> {
    fn drop(&mut self) {
        // Let go of the lane before checking whether it can be dropped
        self.guard.take();
        self.router.release_lane(&self.room_id);
    }
}
