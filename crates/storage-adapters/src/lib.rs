//! # storage-adapters
//!
//! Implementations of the `domains` storage ports.
//!
//! - [`memory`]: in-process ledger, always compiled
//! - [`postgres`]: `sqlx` ledger (feature `db-postgres`)
//! - [`rate_limit`]: in-process fixed-window limiter
//! - [`redis_rate_limit`]: shared limiter (feature `redis`)

pub mod memory;
pub mod rate_limit;

#[cfg(feature = "db-postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis_rate_limit;

pub use memory::MemoryLedgerStore;
pub use rate_limit::MemoryRateLimiter;

#[cfg(feature = "db-postgres")]
pub use postgres::PgLedgerStore;

#[cfg(feature = "redis")]
pub use redis_rate_limit::RedisRateLimiter;
