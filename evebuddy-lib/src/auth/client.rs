//! Authorization code + PKCE flow against EVE SSO

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use http_body_util::Full;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::SsoConfig;
use super::Token;
use super::common::TokenExchange;
use super::common::TokenResponse;
use super::jwt::Verifier;
use super::pkce;
use crate::error::AuthError;

/// How long open browser connections may finish after the flow decided.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// FlowState
// =============================================================================

/// Progress of the most recent authentication on an [`SsoClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    /// The callback listener is bound and waiting for the browser.
    AwaitingCallback,
    /// The callback arrived; the token is being exchanged and verified.
    Validating,
    Authenticated,
    Failed,
}

// =============================================================================
// SsoClient
// =============================================================================

/// EVE Online SSO client.
///
/// Runs the authorization code flow with PKCE: a local HTTP listener
/// receives the browser callback, the code is exchanged for a token and the
/// access token is verified against the provider's JWKS before its
/// character claims are trusted.
///
/// One authentication may run at a time per client. The client is cheap to
/// clone; clones share the flow state and the key cache.
///
/// # Example
///
/// ```ignore
/// use evebuddy_lib::auth::{SsoClient, SsoConfig};
///
/// let client = SsoClient::new(SsoConfig::new("your-client-id"))?;
/// let token = client.authenticate(["esi-assets.read_assets.v1"]).await?;
/// println!("Logged in as {}", token.character_name);
/// ```
#[derive(Clone)]
pub struct SsoClient {
    inner: Arc<SsoClientInner>,
}

struct SsoClientInner {
    config: SsoConfig,
    http_client: reqwest::Client,
    verifier: Verifier,
    running: AtomicBool,
    state: Mutex<FlowState>,
}

impl SsoClient {
    /// Creates a new client.
    ///
    /// Fails with [`AuthError::InvalidConfig`] when the client ID is empty.
    pub fn new(config: SsoConfig) -> Result<Self, AuthError> {
        config.validate().map_err(AuthError::InvalidConfig)?;
        Ok(Self {
            inner: Arc::new(SsoClientInner {
                config,
                http_client: reqwest::Client::new(),
                verifier: Verifier::new(),
                running: AtomicBool::new(false),
                state: Mutex::new(FlowState::Idle),
            }),
        })
    }

    pub fn config(&self) -> &SsoConfig {
        &self.inner.config
    }

    /// Returns the state of the most recent flow.
    pub fn state(&self) -> FlowState {
        match self.inner.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, state: FlowState) {
        self.inner.set_state(state);
    }

    /// Starts an authentication.
    ///
    /// Binds the callback listener and builds the authorization URL. The
    /// caller opens the URL (or calls [`PendingLogin::open_browser`]) and
    /// then waits on the returned [`PendingLogin`].
    pub async fn start<I, S>(&self, scopes: I) -> Result<PendingLogin, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AuthError::AlreadyRunning);
        }
        let flight = FlightGuard {
            client: self.clone(),
        };

        let config = &self.inner.config;
        let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AuthError::CallbackServerFailed(format!("Failed to bind {}: {}", addr, e))
        })?;
        let local_addr = listener.local_addr().map_err(|e| {
            AuthError::CallbackServerFailed(format!("Failed to get local address: {}", e))
        })?;
        let redirect_uri = config.redirect_uri(local_addr.port());

        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::code_challenge(&code_verifier);
        let state = pkce::generate_state();
        let scope = scopes
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");

        let auth_url = format!(
            "{}?response_type=code&redirect_uri={}&client_id={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            config.authorize_url,
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&scope),
            urlencoding::encode(&state),
            urlencoding::encode(&code_challenge),
        );

        log::info!("sso: callback listener bound on {}", local_addr);
        self.set_state(FlowState::AwaitingCallback);

        Ok(PendingLogin {
            auth_url,
            redirect_uri,
            listener,
            state,
            code_verifier,
            flight,
        })
    }

    /// Runs a complete authentication bounded by the configured timeout.
    ///
    /// Opens the browser unless disabled in the config.
    pub async fn authenticate<I, S>(&self, scopes: I) -> Result<Token, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.authenticate_with_cancel(scopes, CancellationToken::new())
            .await
    }

    /// Like [`authenticate`](Self::authenticate), but also stops when `cancel` fires.
    pub async fn authenticate_with_cancel<I, S>(
        &self,
        scopes: I,
        cancel: CancellationToken,
    ) -> Result<Token, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pending = self.start(scopes).await?;
        if self.inner.config.open_browser {
            pending.open_browser()?;
        } else {
            log::info!("sso: waiting for login at {}", pending.auth_url);
        }

        let timeout = self.inner.config.timeout;
        match tokio::time::timeout(timeout, pending.wait_with_cancel(cancel)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("sso: no callback within {:?}", timeout);
                self.set_state(FlowState::Failed);
                Err(AuthError::Timeout(timeout))
            }
        }
    }

    /// Exchanges a refresh token for a new verified token.
    ///
    /// The previous refresh token is kept when the provider does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        let response = self.exchange().refresh(refresh_token).await?;
        let mut token = self.verify(response).await?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        log::info!("sso: refreshed token for {}", token.character_name);
        Ok(token)
    }

    fn exchange(&self) -> TokenExchange<'_> {
        TokenExchange {
            http_client: &self.inner.http_client,
            config: &self.inner.config,
        }
    }

    async fn verify(&self, response: TokenResponse) -> Result<Token, AuthError> {
        let identity = self
            .inner
            .verifier
            .verify(
                &self.inner.http_client,
                &self.inner.config,
                &response.access_token,
            )
            .await?;

        // Out of range lifetimes fall back to the token's own `exp`
        let expires_at = response
            .expires_in
            .and_then(|secs| {
                let at = i64::try_from(secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
                if at.is_none() {
                    log::warn!("sso: ignoring out of range expires_in {}", secs);
                }
                at
            })
            .unwrap_or(identity.expires_at);

        Ok(Token {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            token_type: response.token_type,
            expires_at,
            character_id: identity.character_id,
            character_name: identity.character_name,
            scopes: identity.scopes,
        })
    }
}

impl SsoClientInner {
    fn set_state(&self, state: FlowState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }
}

impl std::fmt::Debug for SsoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoClient")
            .field("client_id", &self.inner.config.client_id)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .finish()
    }
}

/// Releases the single-flight slot when the pending login goes away.
struct FlightGuard {
    client: SsoClient,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let inner = &self.client.inner;
        if let Ok(mut state) = inner.state.lock()
            && matches!(*state, FlowState::AwaitingCallback | FlowState::Validating)
        {
            *state = FlowState::Failed;
        }
        inner.running.store(false, Ordering::Release);
    }
}

// =============================================================================
// PendingLogin
// =============================================================================

/// A started authentication.
///
/// Open `auth_url` in a browser, then call [`wait`](Self::wait). Dropping
/// it releases the listener and marks the flow failed.
pub struct PendingLogin {
    /// URL to open in the browser
    pub auth_url: String,
    /// Local redirect URI (e.g., "http://127.0.0.1:8000/sso/callback")
    pub redirect_uri: String,
    listener: TcpListener,
    state: String,
    code_verifier: String,
    flight: FlightGuard,
}

/// First callback request, handed from the HTTP handler to the flow.
struct Callback {
    result: Result<String, AuthError>,
    reply: oneshot::Sender<Reply>,
}

/// Page shown in the browser once the flow decided.
struct Reply {
    status: StatusCode,
    message: String,
}

impl Reply {
    fn failure(error: &AuthError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("Authentication failed: {}. Please try again.", error),
        }
    }
}

impl PendingLogin {
    /// Opens `auth_url` in the system browser.
    pub fn open_browser(&self) -> Result<(), AuthError> {
        log::info!("sso: opening browser for login");
        open::that(&self.auth_url).map_err(AuthError::BrowserLaunch)
    }

    /// Local address the callback listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Waits for the browser callback, then exchanges and verifies the token.
    pub async fn wait(self) -> Result<Token, AuthError> {
        self.wait_with_cancel(CancellationToken::new()).await
    }

    /// Like [`wait`](Self::wait), but stops when `cancel` fires.
    pub async fn wait_with_cancel(self, cancel: CancellationToken) -> Result<Token, AuthError> {
        let client = self.flight.client.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            result = self.run() => result,
        };
        match &result {
            Ok(token) => {
                log::info!("sso: authenticated {}", token.character_name);
                client.set_state(FlowState::Authenticated);
            }
            Err(e) => {
                log::warn!("sso: authentication failed: {}", e);
                client.set_state(FlowState::Failed);
            }
        }
        result
    }

    async fn run(&self) -> Result<Token, AuthError> {
        let (tx, mut rx) = oneshot::channel::<Callback>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let mut connections = JoinSet::new();
        let callback_path: Arc<str> = self.flight.client.inner.config.callback_path.as_str().into();
        let expected_state: Arc<str> = self.state.as_str().into();

        let callback = loop {
            tokio::select! {
                received = &mut rx => {
                    break received.map_err(|_| {
                        AuthError::CallbackServerFailed("Callback handler dropped".to_string())
                    })?;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(|e| {
                        AuthError::CallbackServerFailed(format!("Accept failed: {}", e))
                    })?;
                    log::debug!("sso: connection from {}", peer);
                    let tx = Arc::clone(&tx);
                    let callback_path = Arc::clone(&callback_path);
                    let expected_state = Arc::clone(&expected_state);
                    let service = service_fn(move |req: Request<Incoming>| {
                        serve_request(
                            req,
                            Arc::clone(&tx),
                            Arc::clone(&callback_path),
                            Arc::clone(&expected_state),
                        )
                    });
                    connections.spawn(async move {
                        let conn = http1::Builder::new()
                            .keep_alive(false)
                            .serve_connection(TokioIo::new(stream), service);
                        // Browsers close connections early; not an error for the flow.
                        if let Err(e) = conn.await {
                            log::debug!("sso: callback connection error: {}", e);
                        }
                    });
                }
            }
        };

        log::info!("sso: callback received");
        let result = match callback.result {
            Ok(code) => self.complete(&code).await,
            Err(e) => Err(e),
        };

        let reply = match &result {
            Ok(token) => Reply {
                status: StatusCode::OK,
                message: format!(
                    "Authentication completed for {}. Scopes granted: {}. You can close this window now.",
                    token.character_name,
                    token.scopes.join(", ")
                ),
            },
            Err(e) => Reply::failure(e),
        };
        let _ = callback.reply.send(reply);

        let drain = async { while connections.join_next().await.is_some() {} };
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, drain).await;
        result
    }

    async fn complete(&self, code: &str) -> Result<Token, AuthError> {
        let client = &self.flight.client;
        client.set_state(FlowState::Validating);
        log::debug!("sso: exchanging authorization code");
        let response = client
            .exchange()
            .authorization_code(code, &self.code_verifier)
            .await?;
        client.verify(response).await
    }
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("auth_url", &self.auth_url)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Callback Handler
// =============================================================================

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<Callback>>>>;

/// Answers one request on the callback listener.
///
/// Only the first request to the callback path is forwarded to the flow.
/// Its response is held until the flow sends the outcome page.
async fn serve_request(
    req: Request<Incoming>,
    tx: CallbackSender,
    callback_path: Arc<str>,
    expected_state: Arc<str>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() != &*callback_path {
        return Ok(text_response(StatusCode::NOT_FOUND, "Not found".to_string()));
    }

    let sender = match tx.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    let Some(sender) = sender else {
        return Ok(text_response(
            StatusCode::CONFLICT,
            "Authentication was already handled.".to_string(),
        ));
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let result = handle_callback(&req, &expected_state);
    let _ = sender.send(Callback {
        result,
        reply: reply_tx,
    });

    let reply = reply_rx.await.unwrap_or_else(|_| Reply {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "Authentication was aborted.".to_string(),
    });
    Ok(text_response(reply.status, reply.message))
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Parse the OAuth callback and extract the authorization code
fn handle_callback(req: &Request<Incoming>, expected_state: &str) -> Result<String, AuthError> {
    let query = req.uri().query().unwrap_or("");
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    parse_callback(&params, expected_state)
}

fn parse_callback(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> Result<String, AuthError> {
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| error.clone());
        return Err(AuthError::ProviderDenied {
            error: error.clone(),
            description,
        });
    }

    match params.get("state") {
        Some(state) if state == expected_state => {}
        _ => return Err(AuthError::StateMismatch),
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or(AuthError::MissingCode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_callback_accepts_matching_state() {
        let p = params(&[("code", "abc"), ("state", "s1")]);
        assert_eq!(parse_callback(&p, "s1").unwrap(), "abc");
    }

    #[test]
    fn test_parse_callback_rejects_state_mismatch() {
        let p = params(&[("code", "abc"), ("state", "other")]);
        assert!(matches!(parse_callback(&p, "s1"), Err(AuthError::StateMismatch)));

        let missing = params(&[("code", "abc")]);
        assert!(matches!(parse_callback(&missing, "s1"), Err(AuthError::StateMismatch)));
    }

    #[test]
    fn test_parse_callback_reports_provider_error() {
        let p = params(&[("error", "access_denied"), ("state", "s1")]);
        match parse_callback(&p, "s1") {
            Err(AuthError::ProviderDenied { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "access_denied");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_callback_requires_code() {
        let p = params(&[("state", "s1")]);
        assert!(matches!(parse_callback(&p, "s1"), Err(AuthError::MissingCode)));
    }

    #[test]
    fn test_new_rejects_empty_client_id() {
        assert!(matches!(
            SsoClient::new(SsoConfig::new("")),
            Err(AuthError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_start_is_single_flight() {
        let client = SsoClient::new(SsoConfig::new("abc").with_port(0)).unwrap();
        let pending = client.start(["publicData"]).await.unwrap();
        assert_eq!(client.state(), FlowState::AwaitingCallback);
        assert!(pending.auth_url.contains("code_challenge_method=S256"));
        assert!(pending.auth_url.contains("scope=publicData"));

        assert!(matches!(
            client.start(["publicData"]).await,
            Err(AuthError::AlreadyRunning)
        ));

        drop(pending);
        assert_eq!(client.state(), FlowState::Failed);
        assert!(client.start(["publicData"]).await.is_ok());
    }
}
