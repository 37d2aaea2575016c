//! SSO flow against a fake identity provider.
//!
//! The provider serves discovery, JWKS and token endpoints on an ephemeral
//! port and signs access tokens with an HS256 key published as `oct` JWK.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use evebuddy_lib::auth::Algorithm;
use evebuddy_lib::auth::FlowState;
use evebuddy_lib::auth::PendingLogin;
use evebuddy_lib::auth::SsoClient;
use evebuddy_lib::auth::SsoConfig;
use evebuddy_lib::auth::Token;
use evebuddy_lib::error::AuthError;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::Method;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const CLIENT_ID: &str = "client-abc";
const SECRET: &[u8] = b"evebuddy-test-signing-key-0001";
const KID: &str = "test-key";
const SCOPE: &str = "esi-assets.read_assets.v1";

// =============================================================================
// Fake identity provider
// =============================================================================

#[derive(Debug)]
struct TokenRequest {
    form: HashMap<String, String>,
    authorization: Option<String>,
}

struct IdpState {
    token_status: StatusCode,
    token_body: Value,
    token_requests: Vec<TokenRequest>,
    jwks_requests: usize,
}

struct Idp {
    addr: SocketAddr,
    state: Arc<Mutex<IdpState>>,
}

impl Idp {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(IdpState {
            token_status: StatusCode::OK,
            token_body: token_body(&sign(claims())),
            token_requests: Vec::new(),
            jwks_requests: 0,
        }));

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let service =
                        service_fn(move |req| handle(req, Arc::clone(&shared), addr));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn config(&self) -> SsoConfig {
        SsoConfig::new(CLIENT_ID)
            .with_port(0)
            .with_open_browser(false)
            .with_authorize_url(self.url("/authorize"))
            .with_token_url(self.url("/token"))
            .with_discovery_url(self.url("/.well-known/oauth-authorization-server"))
            .with_algorithms(vec![Algorithm::HS256])
            .with_timeout(Duration::from_secs(10))
    }

    fn respond_with(&self, status: StatusCode, body: Value) {
        let mut state = self.state.lock().unwrap();
        state.token_status = status;
        state.token_body = body;
    }

    fn token_requests(&self) -> usize {
        self.state.lock().unwrap().token_requests.len()
    }

    fn jwks_requests(&self) -> usize {
        self.state.lock().unwrap().jwks_requests
    }

    fn last_form(&self) -> HashMap<String, String> {
        let state = self.state.lock().unwrap();
        state.token_requests.last().unwrap().form.clone()
    }
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<Mutex<IdpState>>,
    addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (method, path.as_str()) {
        (Method::GET, "/.well-known/oauth-authorization-server") => json_response(
            StatusCode::OK,
            &json!({
                "issuer": "https://login.eveonline.com",
                "jwks_uri": format!("http://{addr}/jwks"),
            }),
        ),
        (Method::GET, "/jwks") => {
            state.lock().unwrap().jwks_requests += 1;
            json_response(
                StatusCode::OK,
                &json!({
                    "keys": [{
                        "kty": "oct",
                        "kid": KID,
                        "alg": "HS256",
                        "k": URL_SAFE_NO_PAD.encode(SECRET),
                    }]
                }),
            )
        }
        (Method::POST, "/token") => {
            let authorization = req
                .headers()
                .get(hyper::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let form = url::form_urlencoded::parse(&body).into_owned().collect();
            let mut state = state.lock().unwrap();
            state.token_requests.push(TokenRequest {
                form,
                authorization,
            });
            json_response(state.token_status, &state.token_body)
        }
        _ => json_response(StatusCode::NOT_FOUND, &json!({})),
    };
    Ok(response)
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

// =============================================================================
// Tokens
// =============================================================================

fn claims() -> Value {
    json!({
        "sub": "CHARACTER:EVE:93000001",
        "name": "Erik Kalkoken",
        "iss": "login.eveonline.com",
        "aud": [CLIENT_ID, "EVE Online"],
        "scp": [SCOPE],
        "exp": chrono::Utc::now().timestamp() + 1200,
    })
}

fn sign_with(claims: &Value, kid: &str, secret: &[u8]) -> String {
    let header = Header {
        kid: Some(kid.to_string()),
        ..Header::new(Algorithm::HS256)
    };
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

fn sign(claims: Value) -> String {
    sign_with(&claims, KID, SECRET)
}

fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "expires_in": 1199,
        "token_type": "Bearer",
        "refresh_token": "refresh-1",
    })
}

// =============================================================================
// Browser
// =============================================================================

fn state_param(pending: &PendingLogin) -> String {
    let url = url::Url::parse(&pending.auth_url).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

/// Plays the browser: opens the redirect URI with the given query.
async fn browse(url: String) -> (StatusCode, String) {
    let response = reqwest::get(url).await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.text().await.unwrap())
}

/// Starts a login and answers the callback with `query`.
async fn login_with(
    client: &SsoClient,
    query: impl FnOnce(&str) -> String,
) -> (Result<Token, AuthError>, StatusCode, String) {
    let pending = client.start([SCOPE]).await.unwrap();
    let url = format!("{}?{}", pending.redirect_uri, query(&state_param(&pending)));
    let (result, (status, body)) = tokio::join!(pending.wait(), browse(url));
    (result, status, body)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_login_happy_path() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();

    let (result, status, body) =
        login_with(&client, |state| format!("code=auth-code&state={state}")).await;
    let token = result.unwrap();

    assert_eq!(token.character_id, 93000001);
    assert_eq!(token.character_name, "Erik Kalkoken");
    assert_eq!(token.scopes, vec![SCOPE]);
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert!(!token.is_expired());
    assert_eq!(client.state(), FlowState::Authenticated);

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Erik Kalkoken"));

    let form = idp.last_form();
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "auth-code");
    assert_eq!(form["client_id"], CLIENT_ID);
    assert!(!form["code_verifier"].is_empty());
}

#[tokio::test]
async fn test_auth_url_carries_pkce_and_scopes() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();
    let pending = client
        .start(["esi-assets.read_assets.v1", "esi-mail.read_mail.v1"])
        .await
        .unwrap();

    let url = url::Url::parse(&pending.auth_url).unwrap();
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["redirect_uri"], pending.redirect_uri);
    assert_eq!(
        params["scope"],
        "esi-assets.read_assets.v1 esi-mail.read_mail.v1"
    );
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["code_challenge"].len(), 43);
    assert!(pending.redirect_uri.starts_with("http://127.0.0.1:"));
    assert!(pending.redirect_uri.ends_with("/sso/callback"));
}

#[tokio::test]
async fn test_state_mismatch_never_exchanges_code() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();

    let (result, status, _) =
        login_with(&client, |_| "code=auth-code&state=forged".to_string()).await;

    assert!(matches!(result, Err(AuthError::StateMismatch)));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(idp.token_requests(), 0);
    assert_eq!(client.state(), FlowState::Failed);
}

#[tokio::test]
async fn test_provider_denied() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();

    let (result, _, _) = login_with(&client, |state| {
        format!("error=access_denied&error_description=User+cancelled&state={state}")
    })
    .await;

    match result {
        Err(AuthError::ProviderDenied { error, description }) => {
            assert_eq!(error, "access_denied");
            assert_eq!(description, "User cancelled");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(idp.token_requests(), 0);
}

#[tokio::test]
async fn test_missing_code() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();
    let (result, _, _) = login_with(&client, |state| format!("state={state}")).await;
    assert!(matches!(result, Err(AuthError::MissingCode)));
}

#[tokio::test]
async fn test_other_paths_are_ignored() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();
    let pending = client.start([SCOPE]).await.unwrap();
    let state = state_param(&pending);
    let base = pending.redirect_uri.trim_end_matches("/sso/callback").to_string();
    let callback = format!("{}?code=auth-code&state={}", pending.redirect_uri, state);

    let browser = async {
        let (status, _) = browse(format!("{base}/favicon.ico")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        browse(callback).await
    };
    let (result, (status, _)) = tokio::join!(pending.wait(), browser);
    assert!(result.is_ok());
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_token_endpoint_error() {
    let idp = Idp::start().await;
    idp.respond_with(
        StatusCode::BAD_REQUEST,
        json!({"error": "invalid_grant", "error_description": "bad code"}),
    );
    let client = SsoClient::new(idp.config()).unwrap();

    let (result, status, _) =
        login_with(&client, |state| format!("code=auth-code&state={state}")).await;

    match result {
        Err(AuthError::TokenExchange { error, description }) => {
            assert_eq!(error, "invalid_grant");
            assert_eq!(description, "bad code");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_issuer_is_rejected() {
    let idp = Idp::start().await;
    let mut claims = claims();
    claims["iss"] = json!("https://evil.example.com");
    idp.respond_with(StatusCode::OK, token_body(&sign(claims)));
    let client = SsoClient::new(idp.config()).unwrap();

    let (result, _, _) =
        login_with(&client, |state| format!("code=auth-code&state={state}")).await;
    assert!(matches!(
        result,
        Err(AuthError::IssuerMismatch { issuer }) if issuer == "https://evil.example.com"
    ));
}

#[tokio::test]
async fn test_foreign_signature_is_rejected() {
    let idp = Idp::start().await;
    idp.respond_with(
        StatusCode::OK,
        token_body(&sign_with(&claims(), KID, b"some-other-secret")),
    );
    let client = SsoClient::new(idp.config()).unwrap();

    let (result, _, _) =
        login_with(&client, |state| format!("code=auth-code&state={state}")).await;
    assert!(matches!(result, Err(AuthError::InvalidSignature)));
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let idp = Idp::start().await;
    let mut claims = claims();
    claims["exp"] = json!(chrono::Utc::now().timestamp() - 3600);
    idp.respond_with(StatusCode::OK, token_body(&sign(claims)));
    let client = SsoClient::new(idp.config()).unwrap();

    let (result, _, _) =
        login_with(&client, |state| format!("code=auth-code&state={state}")).await;
    assert!(matches!(result, Err(AuthError::TokenExpired)));
}

#[tokio::test]
async fn test_unknown_key_refetches_once() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();

    idp.respond_with(StatusCode::OK, token_body(&sign(claims())));
    client.refresh("refresh-1").await.unwrap();
    assert_eq!(idp.jwks_requests(), 1);

    idp.respond_with(
        StatusCode::OK,
        token_body(&sign_with(&claims(), "rotated", SECRET)),
    );
    let result = client.refresh("refresh-1").await;
    assert!(matches!(result, Err(AuthError::KeyNotFound { kid }) if kid == "rotated"));
    assert_eq!(idp.jwks_requests(), 2);
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token() {
    let idp = Idp::start().await;
    idp.respond_with(
        StatusCode::OK,
        json!({"access_token": sign(claims()), "expires_in": "1199"}),
    );
    let client = SsoClient::new(idp.config()).unwrap();

    let token = client.refresh("refresh-1").await.unwrap();
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(token.character_id, 93000001);

    let form = idp.last_form();
    assert_eq!(form["grant_type"], "refresh_token");
    assert_eq!(form["refresh_token"], "refresh-1");

    // Verified keys are cached between calls.
    client.refresh("refresh-1").await.unwrap();
    assert_eq!(idp.jwks_requests(), 1);
}

#[tokio::test]
async fn test_huge_expires_in_falls_back_to_exp_claim() {
    let idp = Idp::start().await;
    let claims = claims();
    let exp = claims["exp"].as_i64().unwrap();
    idp.respond_with(
        StatusCode::OK,
        json!({"access_token": sign(claims), "expires_in": 10_000_000_000_000_000u64}),
    );
    let client = SsoClient::new(idp.config()).unwrap();

    let token = client.refresh("refresh-1").await.unwrap();
    assert_eq!(token.expires_at.timestamp(), exp);
    assert!(!token.is_expired());

    idp.respond_with(
        StatusCode::OK,
        json!({"access_token": sign(self::claims()), "expires_in": u64::MAX}),
    );
    let token = client.refresh("refresh-1").await.unwrap();
    assert!(!token.is_expired());
}

#[tokio::test]
async fn test_refresh_without_token() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();
    assert!(matches!(
        client.refresh("").await,
        Err(AuthError::MissingRefreshToken)
    ));
    assert_eq!(idp.token_requests(), 0);
}

#[tokio::test]
async fn test_client_secret_is_sent_as_basic_auth() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config().with_client_secret("s3cret")).unwrap();
    client.refresh("refresh-1").await.unwrap();

    let state = idp.state.lock().unwrap();
    let authorization = state.token_requests[0].authorization.clone().unwrap();
    let expected = base64::engine::general_purpose::STANDARD.encode(format!("{CLIENT_ID}:s3cret"));
    assert_eq!(authorization, format!("Basic {expected}"));
}

#[tokio::test]
async fn test_authenticate_times_out() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config().with_timeout(Duration::from_millis(100))).unwrap();

    let result = client.authenticate([SCOPE]).await;
    assert!(matches!(result, Err(AuthError::Timeout(_))));
    assert_eq!(client.state(), FlowState::Failed);

    // The listener and the single-flight slot are released.
    assert!(client.start([SCOPE]).await.is_ok());
}

#[tokio::test]
async fn test_authenticate_can_be_cancelled() {
    let idp = Idp::start().await;
    let client = SsoClient::new(idp.config()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client.authenticate_with_cancel([SCOPE], cancel).await;
    assert!(matches!(result, Err(AuthError::Cancelled)));
    assert_eq!(client.state(), FlowState::Failed);
}
