//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the signaling core to external systems:
//! - `clock` - System and manual clocks
//! - `quota` - Quota counters (in-memory, Redis)
//! - `relationship` - Match service stand-in
//! - `persistence` - Message and invitation hand-off
//! - `media` - Media room join references
//! - `websocket` - Client transport

pub mod clock;
pub mod media;
pub mod persistence;
pub mod quota;
pub mod relationship;
pub mod websocket;

pub use clock::{ManualClock, SystemClock};
pub use media::StubMediaProvider;
pub use persistence::InMemorySignalingStore;
pub use quota::{InMemoryQuotaStore, RedisQuotaStore};
pub use relationship::StaticRelationshipChecker;
pub use websocket::{signaling_router, AppState};
