//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types
//! that form the vocabulary of the signaling domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{ErrorCode, SignalError, ValidationError};
pub use ids::{CallId, CallSessionId, ConnectionId, MessageId, RoomId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
