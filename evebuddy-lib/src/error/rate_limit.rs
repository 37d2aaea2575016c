//! Rate limit error types

/// Errors raised while reading an API spec or resolving a rate limit bucket.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The API spec is not valid JSON.
    #[error("invalid API spec: {0}")]
    Json(#[from] serde_json::Error),

    /// The API spec is valid JSON but does not have the expected shape.
    #[error("malformed API spec at {location}: {message}")]
    MalformedSpec { location: String, message: String },

    /// A window size like `15m` could not be parsed.
    #[error("invalid window size: {0:?}")]
    InvalidWindow(String),

    /// The same group is declared with different limits.
    #[error("rate limit group {group:?} declared with conflicting limits")]
    ConflictingGroup { group: String },

    /// The operation is not part of the rate limit table.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The operation references a group that is not in the table.
    #[error("operation {operation} references unknown rate limit group {group}")]
    UnknownGroup { operation: String, group: String },

    /// Authenticated requests are bucketed per character.
    #[error("missing character ID for authenticated request: {0}")]
    MissingCharacterId(String),
}
