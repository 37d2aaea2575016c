//! Authentication error types

use std::time::Duration;

/// Errors that can occur during the SSO flow.
///
/// Every phase of the flow reports its own variant. Nothing is retried
/// automatically; the caller decides whether to restart the flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client configuration is incomplete.
    #[error("Invalid SSO configuration: {0}")]
    InvalidConfig(String),

    /// Another authentication is in progress on this client.
    #[error("Another authentication is already running")]
    AlreadyRunning,

    /// Failed to start or drive the local callback server.
    #[error("Failed to start callback server: {0}")]
    CallbackServerFailed(String),

    /// Failed to open the system browser.
    #[error("Failed to open browser: {0}")]
    BrowserLaunch(#[source] std::io::Error),

    /// The callback `state` did not match the generated value.
    #[error("State mismatch (possible CSRF attack)")]
    StateMismatch,

    /// The callback carried no authorization code.
    #[error("Callback is missing the authorization code")]
    MissingCode,

    /// The identity provider reported an error on the callback.
    #[error("Authorization denied: {error}: {description}")]
    ProviderDenied { error: String, description: String },

    /// No callback arrived within the configured timeout.
    #[error("No SSO callback received within {0:?}")]
    Timeout(Duration),

    /// The flow was cancelled by the caller.
    #[error("SSO authentication cancelled")]
    Cancelled,

    /// Network error while talking to the identity provider.
    #[error("Network error during auth: {0}")]
    Network(#[from] reqwest::Error),

    /// The token endpoint answered with an error payload.
    #[error("Token exchange failed: {error}: {description}")]
    TokenExchange { error: String, description: String },

    /// A refresh was requested without a refresh token.
    #[error("Missing refresh token")]
    MissingRefreshToken,

    /// The discovery document or JWKS could not be used.
    #[error("JWKS discovery failed: {0}")]
    Discovery(String),

    /// The access token is not a well-formed JWT.
    #[error("Malformed access token: {0}")]
    MalformedToken(String),

    /// The token references a key that is not in the JWKS.
    #[error("Signing key not found: {kid}")]
    KeyNotFound { kid: String },

    /// The token signature does not verify against the JWKS key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The access token has expired.
    #[error("Access token expired")]
    TokenExpired,

    /// Any other JWT verification failure.
    #[error("Token verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// The token was issued by an unexpected issuer.
    #[error("Invalid issuer: {issuer}")]
    IssuerMismatch { issuer: String },

    /// The token audience does not contain the expected values.
    #[error("Invalid audience: {audience:?}")]
    AudienceMismatch { audience: Vec<String> },

    /// Required identity claims are missing or malformed.
    #[error("Malformed claims: {0}")]
    MalformedClaims(String),
}
