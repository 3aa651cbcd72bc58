//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the signaling core and the outside world. Adapters implement these ports.
//!
//! ## Collaborator Ports
//!
//! - `RelationshipChecker` - Match/conversation authorization
//! - `SignalingStore` - Persistence hand-off for messages and invitations
//! - `MediaProvider` - Join references for the third-party media room
//!
//! ## Infrastructure Ports
//!
//! - `QuotaStore` - Per-pair monthly usage counters (in-memory or Redis)
//! - `Clock` - Injectable time source

mod clock;
mod media_provider;
mod quota_store;
mod relationship_checker;
mod signaling_store;

pub use clock::Clock;
pub use media_provider::{MediaError, MediaProvider};
pub use quota_store::{QuotaStore, QuotaStoreError};
pub use relationship_checker::{RelationshipChecker, RelationshipError};
pub use signaling_store::{SignalingStore, StoreError};
