//! Access token verification against the SSO key set

use chrono::DateTime;
use chrono::Utc;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::SsoConfig;
use crate::error::AuthError;

/// Identity extracted from a verified access token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Identity {
    pub character_id: i32,
    pub character_name: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Discovery {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    exp: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    aud: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many")]
    scp: Option<Vec<String>>,
}

/// Accepts a claim that is either a single string or an array of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(s)) => Some(vec![s]),
        Some(OneOrMany::Many(v)) => Some(v),
    })
}

/// Parses `CHARACTER:EVE:<id>`.
pub(crate) fn character_id_from_subject(sub: &str) -> Result<i32, AuthError> {
    let mut parts = sub.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("CHARACTER"), Some("EVE"), Some(id), None) => id
            .parse()
            .map_err(|_| AuthError::MalformedClaims(format!("invalid character ID in {sub:?}"))),
        _ => Err(AuthError::MalformedClaims(format!(
            "unexpected subject {sub:?}"
        ))),
    }
}

/// Verifies access tokens and caches the provider's JWKS.
///
/// The key set is fetched on first use through the discovery document and
/// fetched again once when a token names an unknown key.
pub(crate) struct Verifier {
    keys: RwLock<Option<JwkSet>>,
}

impl Verifier {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(None),
        }
    }

    pub async fn verify(
        &self,
        http_client: &reqwest::Client,
        config: &SsoConfig,
        access_token: &str,
    ) -> Result<Identity, AuthError> {
        let header =
            decode_header(access_token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::MalformedToken("header has no kid".to_string()))?;
        if !config.algorithms.contains(&header.alg) {
            return Err(AuthError::MalformedToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }

        let key = self.key(http_client, config, &kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        let data = decode::<Claims>(access_token, &key, &validation).map_err(map_decode_error)?;

        check_claims(config, data.claims)
    }

    async fn key(
        &self,
        http_client: &reqwest::Client,
        config: &SsoConfig,
        kid: &str,
    ) -> Result<DecodingKey, AuthError> {
        {
            let keys = self.keys.read().await;
            if let Some(jwk) = keys.as_ref().and_then(|set| set.find(kid)) {
                return Ok(DecodingKey::from_jwk(jwk)?);
            }
        }

        let mut keys = self.keys.write().await;
        let set = fetch_jwks(http_client, &config.discovery_url).await?;
        let key = match set.find(kid) {
            Some(jwk) => DecodingKey::from_jwk(jwk)?,
            None => {
                *keys = Some(set);
                return Err(AuthError::KeyNotFound {
                    kid: kid.to_string(),
                });
            }
        };
        *keys = Some(set);
        Ok(key)
    }
}

async fn fetch_jwks(
    http_client: &reqwest::Client,
    discovery_url: &str,
) -> Result<JwkSet, AuthError> {
    log::debug!("sso: fetching discovery document from {}", discovery_url);
    let response = http_client.get(discovery_url).send().await?;
    if !response.status().is_success() {
        return Err(AuthError::Discovery(format!(
            "discovery document returned HTTP {}",
            response.status()
        )));
    }
    let discovery: Discovery = response
        .json()
        .await
        .map_err(|e| AuthError::Discovery(format!("invalid discovery document: {e}")))?;

    log::info!("sso: fetching JWKS from {}", discovery.jwks_uri);
    let response = http_client.get(&discovery.jwks_uri).send().await?;
    if !response.status().is_success() {
        return Err(AuthError::Discovery(format!(
            "JWKS endpoint returned HTTP {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| AuthError::Discovery(format!("invalid JWKS: {e}")))
}

fn map_decode_error(error: jsonwebtoken::errors::Error) -> AuthError {
    match error.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::MalformedToken(error.to_string()),
        _ => AuthError::Jwt(error),
    }
}

fn check_claims(config: &SsoConfig, claims: Claims) -> Result<Identity, AuthError> {
    if !config.accepted_issuers.iter().any(|iss| *iss == claims.iss) {
        return Err(AuthError::IssuerMismatch { issuer: claims.iss });
    }

    let audience = claims.aud.unwrap_or_default();
    let has = |value: &str| audience.iter().any(|a| a == value);
    if !has(&config.client_id) || !has(&config.audience) {
        return Err(AuthError::AudienceMismatch { audience });
    }

    let character_id = character_id_from_subject(&claims.sub)?;
    let character_name = claims
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AuthError::MalformedClaims("missing name claim".to_string()))?;
    let scopes = claims
        .scp
        .ok_or_else(|| AuthError::MalformedClaims("missing scp claim".to_string()))?;
    let expires_at = DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| AuthError::MalformedClaims(format!("invalid exp {}", claims.exp)))?;

    Ok(Identity {
        character_id,
        character_name,
        scopes,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(json: serde_json::Value) -> Claims {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_character_id_from_subject() {
        assert_eq!(character_id_from_subject("CHARACTER:EVE:93000001").unwrap(), 93000001);
        assert!(character_id_from_subject("CHARACTER:EVE:abc").is_err());
        assert!(character_id_from_subject("CORPORATION:EVE:1").is_err());
        assert!(character_id_from_subject("CHARACTER:EVE:1:2").is_err());
    }

    #[test]
    fn test_scope_claim_may_be_a_single_string() {
        let c = claims(serde_json::json!({
            "sub": "CHARACTER:EVE:1", "iss": "login.eveonline.com", "exp": 0,
            "scp": "esi-assets.read_assets.v1", "aud": "abc"
        }));
        assert_eq!(c.scp, Some(vec!["esi-assets.read_assets.v1".to_string()]));
        assert_eq!(c.aud, Some(vec!["abc".to_string()]));
    }

    #[test]
    fn test_check_claims_requires_both_audiences() {
        let config = SsoConfig::new("abc");
        let c = claims(serde_json::json!({
            "sub": "CHARACTER:EVE:1", "iss": "login.eveonline.com", "exp": 2000000000,
            "name": "Bruce", "scp": [], "aud": ["abc"]
        }));
        assert!(matches!(
            check_claims(&config, c),
            Err(AuthError::AudienceMismatch { .. })
        ));
    }

    #[test]
    fn test_check_claims_extracts_identity() {
        let config = SsoConfig::new("abc");
        let c = claims(serde_json::json!({
            "sub": "CHARACTER:EVE:42", "iss": "https://login.eveonline.com", "exp": 2000000000,
            "name": "Bruce", "scp": ["a", "b"], "aud": ["abc", "EVE Online"]
        }));
        let identity = check_claims(&config, c).unwrap();
        assert_eq!(identity.character_id, 42);
        assert_eq!(identity.character_name, "Bruce");
        assert_eq!(identity.scopes, vec!["a", "b"]);
    }

    #[test]
    fn test_check_claims_rejects_missing_scopes() {
        let config = SsoConfig::new("abc");
        let c = claims(serde_json::json!({
            "sub": "CHARACTER:EVE:42", "iss": "login.eveonline.com", "exp": 2000000000,
            "name": "Bruce", "aud": ["abc", "EVE Online"]
        }));
        assert!(matches!(
            check_claims(&config, c),
            Err(AuthError::MalformedClaims(_))
        ));
    }
}
