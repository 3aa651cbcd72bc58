//! ConnectionRegistry - live connections, per-user device sets and room
//! membership.
//!
//! # Architecture
//!
//! ```text
//! connections: conn-1 → {user: alice, rooms: {r1}}   by_user: alice → {conn-1, conn-2}
//!              conn-2 → {user: alice, rooms: {}}              bob   → {conn-3}
//!              conn-3 → {user: bob,   rooms: {r1}}    rooms:   r1    → {conn-1, conn-3}
//! ```
//!
//! # Concurrency
//!
//! Every map is a `DashMap`, so connect/disconnect events for different users
//! never contend. Per-user and per-room sets are removed only through
//! `remove_if(.., is_empty)`, which runs under the shard lock and therefore
//! cannot race a concurrent insert for the same key.
//!
//! Lock order is `connections → rooms`. No method holds a map reference
//! across an `.await`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::events::OutboundEvent;
use crate::domain::foundation::{ConnectionId, RoomId, SignalError, UserId};
use crate::ports::RelationshipChecker;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The connection's outbound queue is at capacity.
    QueueFull,
    /// The connection's writer has gone away.
    Closed,
}

/// Transport handle for one live connection.
///
/// Cloning is cheap; all clones feed the same bounded outbound queue, which
/// the transport drains in FIFO order.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::Sender<OutboundEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, user_id: UserId, sender: mpsc::Sender<OutboundEvent>) -> Self {
        Self { id, user_id, sender }
    }

    /// Creates a handle with a fresh id and its receiving end.
    pub fn channel(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionId::new(), user_id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queues an event without waiting.
    pub fn try_deliver(&self, event: OutboundEvent) -> Result<(), DeliveryFailure> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::QueueFull,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

#[derive(Debug)]
struct Connection {
    handle: ConnectionHandle,
    joined_rooms: HashSet<RoomId>,
}

/// What an unregister removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub rooms: Vec<RoomId>,
    /// True if this was the user's last live connection.
    pub last_connection: bool,
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    by_user: DashMap<UserId, DashSet<ConnectionId>>,
    rooms: DashMap<RoomId, DashSet<ConnectionId>>,
    relationships: Arc<dyn RelationshipChecker>,
}

impl ConnectionRegistry {
    pub fn new(relationships: Arc<dyn RelationshipChecker>) -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
            rooms: DashMap::new(),
            relationships,
        }
    }

    /// Registers a connection. Idempotent: returns false if the id is
    /// already known.
    pub fn register(&self, handle: ConnectionHandle) -> bool {
        let id = handle.id();
        let user_id = handle.user_id().clone();

        match self.connections.entry(id) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(Connection {
                    handle,
                    joined_rooms: HashSet::new(),
                });
            }
        }
        self.by_user.entry(user_id.clone()).or_default().insert(id);

        tracing::debug!(connection_id = %id, user_id = %user_id, "Connection registered");
        true
    }

    /// Removes a connection and its room memberships. No-op for unknown ids.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Departure> {
        let (_, connection) = self.connections.remove(connection_id)?;
        let user_id = connection.handle.user_id().clone();

        for room_id in &connection.joined_rooms {
            if let Some(members) = self.rooms.get(room_id) {
                members.remove(connection_id);
            }
            self.rooms.remove_if(room_id, |_, members| members.is_empty());
        }

        if let Some(devices) = self.by_user.get(&user_id) {
            devices.remove(connection_id);
        }
        let last_connection = self
            .by_user
            .remove_if(&user_id, |_, devices| devices.is_empty())
            .is_some();

        tracing::debug!(
            connection_id = %connection_id,
            user_id = %user_id,
            last_connection,
            "Connection unregistered"
        );

        Some(Departure {
            connection_id: *connection_id,
            user_id,
            rooms: connection.joined_rooms.into_iter().collect(),
            last_connection,
        })
    }

    /// Adds the connection to a room after the relationship service confirms
    /// the user is a participant. Returns false if it was already joined.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the connection is not registered
    /// - `NotAuthorized` if the user is not a participant of the room
    /// - `Infrastructure` if the relationship service fails
    pub async fn join_room(
        &self,
        connection_id: &ConnectionId,
        room_id: &RoomId,
    ) -> Result<bool, SignalError> {
        let user_id = self.require_user(connection_id)?;
        self.authorize_room(&user_id, room_id).await?;

        let mut connection = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| SignalError::not_found(format!("connection {}", connection_id)))?;
        let joined = connection.joined_rooms.insert(room_id.clone());
        self.rooms
            .entry(room_id.clone())
            .or_default()
            .insert(*connection_id);
        Ok(joined)
    }

    /// Removes the connection from a room. Returns false if it was not joined.
    ///
    /// # Errors
    ///
    /// Same as [`join_room`](Self::join_room).
    pub async fn leave_room(
        &self,
        connection_id: &ConnectionId,
        room_id: &RoomId,
    ) -> Result<bool, SignalError> {
        let user_id = self.require_user(connection_id)?;
        self.authorize_room(&user_id, room_id).await?;

        let mut connection = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| SignalError::not_found(format!("connection {}", connection_id)))?;
        let left = connection.joined_rooms.remove(room_id);
        if let Some(members) = self.rooms.get(room_id) {
            members.remove(connection_id);
        }
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
        Ok(left)
    }

    /// Live connections of a user (all devices).
    pub fn connections_for(&self, user_id: &UserId) -> Vec<ConnectionHandle> {
        let ids: Vec<ConnectionId> = match self.by_user.get(user_id) {
            Some(devices) => devices.iter().map(|id| *id.key()).collect(),
            None => Vec::new(),
        };
        self.handles(ids)
    }

    /// Users with at least one connection joined to the room.
    pub fn room_members(&self, room_id: &RoomId) -> Vec<UserId> {
        let ids: Vec<ConnectionId> = match self.rooms.get(room_id) {
            Some(members) => members.iter().map(|id| *id.key()).collect(),
            None => Vec::new(),
        };
        let users: BTreeSet<UserId> = self
            .handles(ids)
            .into_iter()
            .map(|handle| handle.user_id().clone())
            .collect();
        users.into_iter().collect()
    }

    pub fn connection(&self, connection_id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections
            .get(connection_id)
            .map(|connection| connection.handle.clone())
    }

    pub fn is_joined(&self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        self.connections
            .get(connection_id)
            .map(|connection| connection.joined_rooms.contains(room_id))
            .unwrap_or(false)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.by_user.contains_key(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn handles(&self, ids: Vec<ConnectionId>) -> Vec<ConnectionHandle> {
        ids.into_iter()
            .filter_map(|id| self.connection(&id))
            .collect()
    }

    fn require_user(&self, connection_id: &ConnectionId) -> Result<UserId, SignalError> {
        self.connections
            .get(connection_id)
            .map(|connection| connection.handle.user_id().clone())
            .ok_or_else(|| SignalError::not_found(format!("connection {}", connection_id)))
    }

    async fn authorize_room(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), SignalError> {
        if self.relationships.is_room_participant(user_id, room_id).await? {
            Ok(())
        } else {
            Err(SignalError::not_authorized(format!(
                "{} is not a participant of room {}",
                user_id, room_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticRelationshipChecker;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    fn registry() -> ConnectionRegistry {
        let relationships =
            StaticRelationshipChecker::new().with_match(&user("alice"), &user("bob"), room("r1"));
        ConnectionRegistry::new(Arc::new(relationships))
    }

    #[test]
    fn register_is_idempotent() {
        let registry = registry();
        let (handle, _rx) = ConnectionHandle::channel(user("alice"), 8);

        assert!(registry.register(handle.clone()));
        assert!(!registry.register(handle));
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.connections_for(&user("alice")).len(), 1);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = registry();
        assert!(registry.unregister(&ConnectionId::new()).is_none());
    }

    #[test]
    fn last_connection_flag_tracks_devices() {
        let registry = registry();
        let (phone, _rx1) = ConnectionHandle::channel(user("alice"), 8);
        let (laptop, _rx2) = ConnectionHandle::channel(user("alice"), 8);
        registry.register(phone.clone());
        registry.register(laptop.clone());

        let first = registry.unregister(&phone.id()).unwrap();
        assert!(!first.last_connection);
        assert!(registry.is_online(&user("alice")));

        let second = registry.unregister(&laptop.id()).unwrap();
        assert!(second.last_connection);
        assert!(!registry.is_online(&user("alice")));
    }

    #[tokio::test]
    async fn join_room_requires_participant() {
        let registry = registry();
        let (carol, _rx) = ConnectionHandle::channel(user("carol"), 8);
        registry.register(carol.clone());

        let err = registry.join_room(&carol.id(), &room("r1")).await.unwrap_err();
        assert!(matches!(err, SignalError::NotAuthorized(_)));
        assert!(!registry.is_joined(&carol.id(), &room("r1")));
    }

    #[tokio::test]
    async fn join_room_unknown_connection_is_not_found() {
        let registry = registry();
        let err = registry
            .join_room(&ConnectionId::new(), &room("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::NotFound(_)));
    }

    #[tokio::test]
    async fn room_members_are_distinct_users() {
        let registry = registry();
        let (a1, _rx1) = ConnectionHandle::channel(user("alice"), 8);
        let (a2, _rx2) = ConnectionHandle::channel(user("alice"), 8);
        let (b1, _rx3) = ConnectionHandle::channel(user("bob"), 8);
        for handle in [&a1, &a2, &b1] {
            registry.register(handle.clone());
            registry.join_room(&handle.id(), &room("r1")).await.unwrap();
        }

        assert_eq!(registry.room_members(&room("r1")), vec![user("alice"), user("bob")]);
    }

    #[tokio::test]
    async fn unregister_cleans_empty_rooms() {
        let registry = registry();
        let (a1, _rx) = ConnectionHandle::channel(user("alice"), 8);
        registry.register(a1.clone());
        registry.join_room(&a1.id(), &room("r1")).await.unwrap();
        assert_eq!(registry.room_count(), 1);

        let departure = registry.unregister(&a1.id()).unwrap();
        assert_eq!(departure.rooms, vec![room("r1")]);
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn leave_room_is_idempotent() {
        let registry = registry();
        let (a1, _rx) = ConnectionHandle::channel(user("alice"), 8);
        registry.register(a1.clone());
        registry.join_room(&a1.id(), &room("r1")).await.unwrap();

        assert!(registry.leave_room(&a1.id(), &room("r1")).await.unwrap());
        assert!(!registry.leave_room(&a1.id(), &room("r1")).await.unwrap());
        assert!(registry.room_members(&room("r1")).is_empty());
    }

    #[tokio::test]
    async fn concurrent_connect_disconnect_keeps_sets_consistent() {
        let registry = Arc::new(registry());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _rx) = ConnectionHandle::channel(UserId::new("alice").unwrap(), 4);
                registry.register(handle.clone());
                tokio::task::yield_now().await;
                registry.unregister(&handle.id());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.connection_count(), 0);
        assert!(!registry.is_online(&user("alice")));
    }

    #[test]
    fn closed_receiver_reports_closed() {
        let (handle, rx) = ConnectionHandle::channel(user("alice"), 1);
        drop(rx);
        assert_eq!(handle.try_deliver(OutboundEvent::Pong), Err(DeliveryFailure::Closed));
    }

    #[test]
    fn full_queue_reports_full() {
        let (handle, _rx) = ConnectionHandle::channel(user("alice"), 1);
        handle.try_deliver(OutboundEvent::Pong).unwrap();
        assert_eq!(handle.try_deliver(OutboundEvent::Pong), Err(DeliveryFailure::QueueFull));
    }
}
