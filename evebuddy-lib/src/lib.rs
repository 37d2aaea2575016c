//! EveBuddy core library
//!
//! Reusable pieces behind the EveBuddy companion app for EVE Online: a
//! thread-safe forest store for hierarchical views, the EVE SSO login
//! flow and ESI rate limit tables.

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod tree;

pub use error::Error;
