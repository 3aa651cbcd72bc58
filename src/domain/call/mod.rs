//! Call module - invitation handshake and live sessions.

mod invitation;
mod session;
mod status;
mod values;

pub use invitation::{CallInvitation, DEFAULT_RING_TIMEOUT};
pub use session::{CallSession, DEFAULT_PER_CALL_CEILING_SECS};
pub use status::InvitationStatus;
pub use values::{Actor, CallDecision, EndReason};
