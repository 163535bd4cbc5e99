//! Bearer-token credentials and the suppliers that issue them.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SyncError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Short-lived opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Issues tokens on demand.
///
/// `interactive = false` must never prompt the user; when a silent refresh
/// is impossible it fails with `AuthExpired`.
#[async_trait]
pub trait CredentialSupplier: Send + Sync {
    async fn acquire(&self, interactive: bool) -> Result<Token, SyncError>;
}

/// Supplier for a token obtained out of band (e.g. pasted into `.env`).
///
/// It has no way to mint a new token, so a silent refresh always fails.
pub struct StaticTokenSupplier {
    token: Token,
}

impl StaticTokenSupplier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Token::new(token),
        }
    }
}

#[async_trait]
impl CredentialSupplier for StaticTokenSupplier {
    async fn acquire(&self, interactive: bool) -> Result<Token, SyncError> {
        if !interactive {
            debug!("Static token cannot be refreshed");
            return Err(SyncError::AuthExpired);
        }
        Ok(self.token.clone())
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 refresh-token grant. Every acquire mints a new access token silently.
pub struct RefreshTokenSupplier {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl RefreshTokenSupplier {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
        })
    }

    /// Create from environment variables.
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID not set")?;
        let client_secret =
            std::env::var("GOOGLE_CLIENT_SECRET").context("GOOGLE_CLIENT_SECRET not set")?;
        let refresh_token =
            std::env::var("GOOGLE_REFRESH_TOKEN").context("GOOGLE_REFRESH_TOKEN not set")?;

        Self::new(&client_id, &client_secret, &refresh_token, timeout)
    }
}

#[async_trait]
impl CredentialSupplier for RefreshTokenSupplier {
    async fn acquire(&self, interactive: bool) -> Result<Token, SyncError> {
        debug!(interactive = interactive, "Refreshing access token");

        let body = RefreshRequest {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token: &self.refresh_token,
        };

        let response = self
            .http
            .post(&self.token_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::TransportFailure(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "Refresh token rejected");
            return Err(SyncError::AuthExpired);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SyncError::TransportFailure(format!(
                "token refresh failed: {} - {}",
                status, text
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::TransportFailure(e.to_string()))?;

        debug!(expires_in = ?parsed.expires_in, "Access token refreshed");
        Ok(Token::new(parsed.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_redacted_in_debug() {
        let token = Token::new("ya29.secret");
        assert_eq!(format!("{:?}", token), "Token(***)");
        assert_eq!(token.bearer(), "Bearer ya29.secret");
    }

    #[tokio::test]
    async fn test_static_supplier_returns_its_token() {
        let supplier = StaticTokenSupplier::new("abc");
        let token = supplier.acquire(true).await.unwrap();
        assert_eq!(token.as_str(), "abc");
    }

    #[tokio::test]
    async fn test_static_supplier_cannot_refresh() {
        let supplier = StaticTokenSupplier::new("abc");
        let result = supplier.acquire(false).await;
        assert_eq!(result, Err(SyncError::AuthExpired));
    }
}
