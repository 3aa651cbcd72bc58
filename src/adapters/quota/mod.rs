//! Quota store adapters.
//!
//! - `InMemoryQuotaStore` - single-instance deployments and tests
//! - `RedisQuotaStore` - shared counters for multi-instance deployments

mod in_memory;
mod redis;

pub use in_memory::InMemoryQuotaStore;
pub use redis::RedisQuotaStore;
