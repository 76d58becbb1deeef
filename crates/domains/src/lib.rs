//! notemart/crates/domains/src/lib.rs
//!
//! Entities, money math, errors and port definitions for the points ledger.
//! No I/O lives here.

pub mod errors;
pub mod models;
pub mod ports;
pub mod pricing;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
pub use pricing::*;
