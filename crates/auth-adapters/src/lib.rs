//! # auth-adapters
//!
//! Implementations of the `IdentityProvider` port.
//!
//! - [`jwt`]: HS256 bearer tokens (feature `auth-jwt`)

#[cfg(feature = "auth-jwt")]
pub mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::JwtIdentityProvider;
