//! Wire protocol between connected clients and the signaling core.
//!
//! - Client → Server: room membership, chat, call handshake, ping
//! - Server → Client: acks, deliveries, call lifecycle, quota warnings, errors
//!
//! Every frame is a JSON object tagged by `type`; payload fields are camelCase.

use serde::{Deserialize, Serialize};

use crate::domain::call::{CallDecision, EndReason};
use crate::domain::chat::ChatMessage;
use crate::domain::foundation::{
    CallId, CallSessionId, ConnectionId, MessageId, RoomId, SignalError, Timestamp, UserId,
};
use crate::domain::quota::PairKey;

// ============================================
// Client → Server
// ============================================

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InboundEvent {
    JoinRoom { room_id: RoomId },
    LeaveRoom { room_id: RoomId },
    SendMessage { room_id: RoomId, body: String },
    CallInitiate { recipient_id: UserId },
    CallRespond { session_id: CallSessionId, decision: CallDecision },
    CallCancel { session_id: CallSessionId },
    CallEnd { session_id: CallSessionId },
    Ping,
}

impl InboundEvent {
    /// Stable event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::JoinRoom { .. } => "join_room",
            InboundEvent::LeaveRoom { .. } => "leave_room",
            InboundEvent::SendMessage { .. } => "send_message",
            InboundEvent::CallInitiate { .. } => "call_initiate",
            InboundEvent::CallRespond { .. } => "call_respond",
            InboundEvent::CallCancel { .. } => "call_cancel",
            InboundEvent::CallEnd { .. } => "call_end",
            InboundEvent::Ping => "ping",
        }
    }
}

// ============================================
// Server → Client
// ============================================

/// Events the server pushes to connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    /// Sent once after the socket is registered.
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
    },
    RoomJoined {
        room_id: RoomId,
    },
    RoomLeft {
        room_id: RoomId,
    },
    /// Ack to the sender; carries the allocated id.
    MessageSent {
        room_id: RoomId,
        message_id: MessageId,
        sent_at: Timestamp,
    },
    MessageDelivered {
        room_id: RoomId,
        message_id: MessageId,
        sender_id: UserId,
        body: String,
        sent_at: Timestamp,
    },
    /// Ack to the caller that the invitation is recorded and ringing.
    CallRinging {
        session_id: CallSessionId,
        call_id: CallId,
        recipient_id: UserId,
        expires_at: Timestamp,
    },
    CallInvited {
        session_id: CallSessionId,
        call_id: CallId,
        caller_id: UserId,
        expires_at: Timestamp,
    },
    CallAccepted {
        session_id: CallSessionId,
        join_reference: String,
    },
    CallDeclined {
        session_id: CallSessionId,
    },
    CallCanceled {
        session_id: CallSessionId,
    },
    CallMissed {
        session_id: CallSessionId,
    },
    CallEnded {
        session_id: CallSessionId,
        duration_seconds: u32,
        reason: EndReason,
    },
    QuotaWarning {
        pair_key: PairKey,
        remaining_seconds: u32,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl OutboundEvent {
    /// Builds the delivery event for a chat message.
    pub fn delivered(message: &ChatMessage) -> Self {
        OutboundEvent::MessageDelivered {
            room_id: message.room_id().clone(),
            message_id: message.message_id(),
            sender_id: message.sender_id().clone(),
            body: message.body().to_string(),
            sent_at: message.sent_at(),
        }
    }

    /// Builds the rejection sent back to the requesting connection.
    pub fn error(err: &SignalError) -> Self {
        OutboundEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Stable event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Connected { .. } => "connected",
            OutboundEvent::RoomJoined { .. } => "room_joined",
            OutboundEvent::RoomLeft { .. } => "room_left",
            OutboundEvent::MessageSent { .. } => "message_sent",
            OutboundEvent::MessageDelivered { .. } => "message_delivered",
            OutboundEvent::CallRinging { .. } => "call_ringing",
            OutboundEvent::CallInvited { .. } => "call_invited",
            OutboundEvent::CallAccepted { .. } => "call_accepted",
            OutboundEvent::CallDeclined { .. } => "call_declined",
            OutboundEvent::CallCanceled { .. } => "call_canceled",
            OutboundEvent::CallMissed { .. } => "call_missed",
            OutboundEvent::CallEnded { .. } => "call_ended",
            OutboundEvent::QuotaWarning { .. } => "quota_warning",
            OutboundEvent::Error { .. } => "error",
            OutboundEvent::Pong => "pong",
        }
    }

    /// Session the event refers to, if any.
    pub fn session_id(&self) -> Option<CallSessionId> {
        match self {
            OutboundEvent::CallRinging { session_id, .. }
            | OutboundEvent::CallInvited { session_id, .. }
            | OutboundEvent::CallAccepted { session_id, .. }
            | OutboundEvent::CallDeclined { session_id }
            | OutboundEvent::CallCanceled { session_id }
            | OutboundEvent::CallMissed { session_id }
            | OutboundEvent::CallEnded { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }
}
