//! Application layer - signaling services.
//!
//! Services orchestrate domain rules and coordinate between ports. The
//! transport adapter only talks to the [`Dispatcher`]; everything else is
//! wired together at startup.
//!
//! ```text
//! transport ─► Dispatcher ─► ConnectionRegistry
//!                  │       ─► RoomRouter ─► connection queues
//!                  └─────────► CallController ─► QuotaGate ─► QuotaStore
//!                                  ▲        └─► SessionRegistry
//!                     PeriodicTask ┘
//! ```

pub mod call_controller;
pub mod connection_registry;
pub mod dispatcher;
pub mod quota_gate;
pub mod room_router;
pub mod scheduler;
pub mod services;
pub mod session_registry;

pub use call_controller::{CallCollaborators, CallController, RESOLVED_RETENTION};
pub use connection_registry::{ConnectionHandle, ConnectionRegistry, DeliveryFailure, Departure};
pub use dispatcher::Dispatcher;
pub use quota_gate::QuotaGate;
pub use room_router::{DeliveryReport, LaneTurn, RoomRouter};
pub use scheduler::{ExpirySweep, PeriodicJob, PeriodicTask, SessionTick};
pub use services::{Collaborators, SignalingServices};
pub use session_registry::{verdict, SessionRegistry, TickReport, Verdict};
