//! Media provider adapters.

mod stub;

pub use stub::StubMediaProvider;
