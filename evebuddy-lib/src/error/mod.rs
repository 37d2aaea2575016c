//! Error types

mod auth;
mod rate_limit;
mod tree;

pub use auth::*;
pub use rate_limit::*;
pub use tree::*;

/// Top-level error for consumers that drive several subsystems at once.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Forest store error.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// SSO authentication error.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Rate limit lookup or spec error.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}
