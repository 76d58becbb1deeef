//! Request handlers. Each one authenticates, calls a single service
//! operation, records its outcome, and serialises the result.

pub mod admin;
pub mod me;
pub mod notes;
pub mod points;
pub mod promo;
pub mod system;
