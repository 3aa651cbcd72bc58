//! Relationship service adapters.

mod static_checker;

pub use static_checker::StaticRelationshipChecker;
