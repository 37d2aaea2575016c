//! SSO client configuration

use std::time::Duration;

use jsonwebtoken::Algorithm;

/// EVE SSO v2 authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://login.eveonline.com/v2/oauth/authorize";

/// EVE SSO v2 token endpoint.
pub const TOKEN_URL: &str = "https://login.eveonline.com/v2/oauth/token";

/// Authorization server metadata, which points at the JWKS.
pub const DISCOVERY_URL: &str =
    "https://login.eveonline.com/.well-known/oauth-authorization-server";

/// Audience every EVE access token carries next to the client ID.
pub const EVE_AUDIENCE: &str = "EVE Online";

/// Configuration for an [`SsoClient`](super::SsoClient).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use evebuddy_lib::auth::SsoConfig;
///
/// let config = SsoConfig::new("my-client-id")
///     .with_port(0)
///     .with_timeout(Duration::from_secs(60))
///     .with_open_browser(false);
///
/// assert_eq!(config.callback_path, "/sso/callback");
/// ```
#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// Application client ID registered with EVE developers.
    pub client_id: String,
    /// Client secret. Sent as HTTP Basic auth when set.
    pub client_secret: Option<String>,
    /// Local callback port. `0` picks a free port.
    pub port: u16,
    pub callback_path: String,
    pub authorize_url: String,
    pub token_url: String,
    pub discovery_url: String,
    /// Issuer values accepted in the `iss` claim.
    pub accepted_issuers: Vec<String>,
    /// Audience required in the `aud` claim besides the client ID.
    pub audience: String,
    /// Signature algorithms accepted for access tokens.
    pub algorithms: Vec<Algorithm>,
    /// How long [`authenticate`](super::SsoClient::authenticate) waits for the callback.
    pub timeout: Duration,
    /// Whether [`authenticate`](super::SsoClient::authenticate) opens the system browser.
    pub open_browser: bool,
}

impl SsoConfig {
    /// Creates a configuration with the EVE defaults.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            port: 8000,
            callback_path: "/sso/callback".to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            discovery_url: DISCOVERY_URL.to_string(),
            accepted_issuers: vec![
                "login.eveonline.com".to_string(),
                "https://login.eveonline.com".to_string(),
            ],
            audience: EVE_AUDIENCE.to_string(),
            algorithms: vec![Algorithm::RS256, Algorithm::ES256],
            timeout: Duration::from_secs(5 * 60),
            open_browser: true,
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = url.into();
        self
    }

    pub fn with_accepted_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_issuers = issuers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    /// Redirect URI registered for the given callback port.
    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://127.0.0.1:{}{}", port, self.callback_path)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("client ID is empty".to_string());
        }
        if !self.callback_path.starts_with('/') {
            return Err(format!(
                "callback path must start with '/': {:?}",
                self.callback_path
            ));
        }
        if self.algorithms.is_empty() {
            return Err("no signature algorithms accepted".to_string());
        }
        Ok(())
    }
}
