//! WebSocket transport for signaling clients.
//!
//! # Architecture
//!
//! ```text
//!   client ──text frame──► reader task ──► Dispatcher
//!                                              │
//!   client ◄──text frame── writer task ◄── bounded queue ◄── RoomRouter
//! ```
//!
//! Each socket owns one bounded outbound queue. The writer drains it in
//! order, so a client sees events in the order they were enqueued.

pub mod handler;

pub use handler::{health, signaling_router, ws_handler, AppState, ConnectParams};
