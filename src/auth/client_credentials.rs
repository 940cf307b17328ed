//! OAuth2 client-credentials token exchange

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use super::{TokenGrant, TokenProvider};
use crate::config::AuthConfig;
use crate::error::{Result, SyncError};

/// Token endpoint response (OAuth2 standard form)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges a client id and secret for an access token over HTTP
#[derive(Debug, Clone)]
pub struct ClientCredentialsProvider {
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    default_lifetime: Duration,
    http_client: reqwest::Client,
}

impl ClientCredentialsProvider {
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: None,
            default_lifetime: Duration::from_secs(300),
            http_client,
        })
    }

    pub fn from_config(config: &AuthConfig, timeout: Duration) -> Result<Self> {
        let mut provider = Self::new(
            &config.token_endpoint,
            &config.client_id,
            &config.client_secret,
            timeout,
        )?;
        provider.scope = config.scope.clone();
        provider.default_lifetime = Duration::from_secs(config.default_token_lifetime_secs);
        Ok(provider)
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Lifetime assumed when the endpoint does not send `expires_in`
    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn fetch_token(&self) -> Result<TokenGrant> {
        debug!(
            client_id = %self.client_id,
            token_endpoint = %self.token_endpoint,
            "requesting token with client credentials"
        );

        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(scope) = &self.scope {
            params.push(("scope", scope.as_str()));
        }

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "token endpoint request failed");
                SyncError::Authentication(format!("token request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "token endpoint rejected credentials");
            return Err(SyncError::Authentication(format!(
                "token endpoint returned HTTP {} - {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            error!(error = %e, "could not decode token response");
            SyncError::Authentication(format!("invalid token response: {}", e))
        })?;

        if let Some(token_type) = &token.token_type {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(SyncError::Authentication(format!(
                    "unsupported token type '{}'",
                    token_type
                )));
            }
        }

        let expires_in = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(self.default_lifetime);

        debug!(expires_in_secs = expires_in.as_secs(), "token acquired");

        Ok(TokenGrant {
            access_token: token.access_token,
            expires_in,
        })
    }
}
