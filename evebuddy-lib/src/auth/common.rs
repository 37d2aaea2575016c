//! Token endpoint calls

use serde::Deserialize;

use super::SsoConfig;
use crate::error::AuthError;

// =============================================================================
// Token Response Parsing
// =============================================================================

/// Token response from the SSO token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Deserializes `expires_in` which can be either a number or a string.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    match Option::<StringOrNumber>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrNumber::Number(n)) => Ok(Some(n)),
        Some(StringOrNumber::String(s)) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid expires_in value: {}", s))),
    }
}

/// Error response from the SSO token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

impl From<ErrorResponse> for AuthError {
    fn from(response: ErrorResponse) -> Self {
        let description = response
            .error_description
            .unwrap_or_else(|| response.error.clone());
        AuthError::TokenExchange {
            error: response.error,
            description,
        }
    }
}

// =============================================================================
// Token Exchange
// =============================================================================

/// Internal helper for token endpoint calls.
pub(crate) struct TokenExchange<'a> {
    pub http_client: &'a reqwest::Client,
    pub config: &'a SsoConfig,
}

impl TokenExchange<'_> {
    /// Exchange an authorization code for a token (PKCE flow).
    pub async fn authorization_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.post(&params).await
    }

    /// Refresh an access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        self.post(&params).await
    }

    async fn post(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let mut request = self.http_client.post(&self.config.token_url).form(params);
        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        log::debug!("sso: posting {} grant to token endpoint", params[0].1);
        let response = request.send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let error_response: ErrorResponse =
                response.json().await.unwrap_or_else(|_| ErrorResponse {
                    error: "unknown".to_string(),
                    error_description: Some(format!("HTTP {}", status)),
                });
            Err(error_response.into())
        }
    }
}
