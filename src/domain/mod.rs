//! Domain layer containing signaling rules and wire types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, timestamps, errors)
//! - `call` - Invitation state machine and live call sessions
//! - `quota` - Pair keys, month buckets and clamped usage records
//! - `chat` - Chat messages and body validation
//! - `events` - Client/server wire events

pub mod call;
pub mod chat;
pub mod events;
pub mod foundation;
pub mod quota;
