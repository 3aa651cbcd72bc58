//! Dispatcher - routes inbound client events to the signaling services.
//!
//! The transport hands every decoded frame to [`Dispatcher::on_frame`]. A
//! rejected request produces a single `error` frame for the requesting
//! connection; nothing else observes it.

use std::sync::Arc;

use super::call_controller::CallController;
use super::connection_registry::{ConnectionHandle, ConnectionRegistry};
use super::room_router::RoomRouter;
use crate::domain::call::{Actor, EndReason};
use crate::domain::chat::ChatMessage;
use crate::domain::events::{InboundEvent, OutboundEvent};
use crate::domain::foundation::{
    CallSessionId, ConnectionId, RoomId, SignalError, UserId, ValidationError,
};
use crate::ports::{Clock, SignalingStore};

/// Entry point for connection lifecycle and client events.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    router: Arc<RoomRouter>,
    controller: Arc<CallController>,
    store: Arc<dyn SignalingStore>,
    clock: Arc<dyn Clock>,
    max_message_len: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<RoomRouter>,
        controller: Arc<CallController>,
        store: Arc<dyn SignalingStore>,
        clock: Arc<dyn Clock>,
        max_message_len: usize,
    ) -> Self {
        Self {
            registry,
            router,
            controller,
            store,
            clock,
            max_message_len,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &CallController {
        &self.controller
    }

    /// Registers a new connection, greets it and replays any invitation
    /// still ringing for the user.
    pub async fn on_connect(&self, handle: ConnectionHandle) -> ConnectionId {
        let connection_id = handle.id();
        let user_id = handle.user_id().clone();
        if !self.registry.register(handle) {
            return connection_id;
        }

        self.router.send_to_connection(
            &connection_id,
            OutboundEvent::Connected {
                connection_id,
                user_id: user_id.clone(),
            },
        );

        let replayed = self
            .controller
            .replay_pending(&user_id, &connection_id)
            .await;

        tracing::debug!(
            connection_id = %connection_id,
            user_id = %user_id,
            replayed_invitations = replayed,
            "Connection registered"
        );
        connection_id
    }

    /// Drops a connection. When the user's last device leaves, their
    /// ringing outgoing calls are canceled.
    pub async fn on_disconnect(&self, connection_id: &ConnectionId) {
        let Some(departure) = self.registry.unregister(connection_id) else {
            return;
        };

        tracing::debug!(
            connection_id = %connection_id,
            user_id = %departure.user_id,
            rooms = departure.rooms.len(),
            last_connection = departure.last_connection,
            "Connection closed"
        );

        if departure.last_connection {
            self.controller.caller_went_offline(&departure.user_id).await;
        }
    }

    /// Decodes one text frame and dispatches it.
    pub async fn on_frame(&self, connection_id: &ConnectionId, frame: &str) {
        match serde_json::from_str::<InboundEvent>(frame) {
            Ok(event) => {
                // Rejections are already reported to the requester.
                let _ = self.dispatch(connection_id, event).await;
            }
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Malformed frame");
                let err = SignalError::from(ValidationError::invalid_format(
                    "frame",
                    e.to_string(),
                ));
                self.router
                    .send_to_connection(connection_id, OutboundEvent::error(&err));
            }
        }
    }

    /// Handles one client event. A rejection is sent to the requesting
    /// connection as an `error` frame and also returned.
    pub async fn dispatch(
        &self,
        connection_id: &ConnectionId,
        event: InboundEvent,
    ) -> Result<(), SignalError> {
        let name = event.name();
        let result = self.route(connection_id, event).await;

        if let Err(err) = &result {
            if err.is_client_error() {
                tracing::debug!(connection_id = %connection_id, event = name, error = %err, "Request rejected");
            } else {
                tracing::error!(connection_id = %connection_id, event = name, error = %err, "Request failed");
            }
            self.router
                .send_to_connection(connection_id, OutboundEvent::error(err));
        }
        result
    }

    async fn route(
        &self,
        connection_id: &ConnectionId,
        event: InboundEvent,
    ) -> Result<(), SignalError> {
        let user_id = self.user_of(connection_id)?;

        match event {
            InboundEvent::JoinRoom { room_id } => {
                self.registry.join_room(connection_id, &room_id).await?;
                self.reply(connection_id, OutboundEvent::RoomJoined { room_id });
                Ok(())
            }
            InboundEvent::LeaveRoom { room_id } => {
                self.registry.leave_room(connection_id, &room_id).await?;
                self.reply(connection_id, OutboundEvent::RoomLeft { room_id });
                Ok(())
            }
            InboundEvent::SendMessage { room_id, body } => {
                self.send_message(connection_id, user_id, room_id, body).await
            }
            InboundEvent::CallInitiate { recipient_id } => {
                self.call_initiate(connection_id, &user_id, &recipient_id).await
            }
            InboundEvent::CallRespond {
                session_id,
                decision,
            } => self.controller.respond(session_id, &user_id, decision).await,
            InboundEvent::CallCancel { session_id } => {
                self.controller.cancel(session_id, &user_id).await
            }
            InboundEvent::CallEnd { session_id } => self
                .controller
                .end(session_id, Actor::User(user_id), EndReason::Hangup)
                .await
                .map(|_| ()),
            InboundEvent::Ping => {
                self.reply(connection_id, OutboundEvent::Pong);
                Ok(())
            }
        }
    }

    async fn send_message(
        &self,
        connection_id: &ConnectionId,
        sender: UserId,
        room_id: RoomId,
        body: String,
    ) -> Result<(), SignalError> {
        // 1. Sender must have joined the room on this connection
        if !self.registry.is_joined(connection_id, &room_id) {
            return Err(SignalError::not_authorized(format!(
                "connection has not joined room {}",
                room_id
            )));
        }

        // 2. Allocate id and timestamp before fan-out
        let message = ChatMessage::text(
            room_id,
            sender,
            body,
            self.clock.now(),
            self.max_message_len,
        )?;

        // 3. Deliver to every other connection in the room, then ack
        let report = self
            .router
            .broadcast(
                message.room_id(),
                OutboundEvent::delivered(&message),
                Some(*connection_id),
            )
            .await;
        self.reply(
            connection_id,
            OutboundEvent::MessageSent {
                room_id: message.room_id().clone(),
                message_id: message.message_id(),
                sent_at: message.sent_at(),
            },
        );

        tracing::debug!(
            message_id = %message.message_id(),
            room_id = %message.room_id(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Message routed"
        );

        // 4. Persistence hand-off; never undoes delivery
        if let Err(e) = self.store.save_message(&message).await {
            tracing::warn!(message_id = %message.message_id(), error = %e, "Failed to persist message");
        }
        Ok(())
    }

    async fn call_initiate(
        &self,
        connection_id: &ConnectionId,
        caller: &UserId,
        recipient: &UserId,
    ) -> Result<(), SignalError> {
        match self.controller.initiate(caller, recipient).await {
            Ok(session_id) => {
                self.ringing(connection_id, session_id);
                Ok(())
            }
            Err(SignalError::TransportUnavailable(session_id)) => {
                // Recorded but undelivered: the caller still gets the
                // session so it can cancel.
                self.ringing(connection_id, session_id);
                Err(SignalError::TransportUnavailable(session_id))
            }
            Err(e) => Err(e),
        }
    }

    fn ringing(&self, connection_id: &ConnectionId, session_id: CallSessionId) {
        if let Some(invitation) = self.controller.invitation(&session_id) {
            self.reply(
                connection_id,
                OutboundEvent::CallRinging {
                    session_id,
                    call_id: invitation.call_id(),
                    recipient_id: invitation.recipient_id().clone(),
                    expires_at: invitation.expires_at(),
                },
            );
        }
    }

    fn reply(&self, connection_id: &ConnectionId, event: OutboundEvent) {
        self.router.send_to_connection(connection_id, event);
    }

    fn user_of(&self, connection_id: &ConnectionId) -> Result<UserId, SignalError> {
        self.registry
            .connection(connection_id)
            .map(|handle| handle.user_id().clone())
            .ok_or_else(|| SignalError::not_found(format!("connection {}", connection_id)))
    }
}
