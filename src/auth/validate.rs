//! Remote token validation against `/identity/token`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::token::TokenStorage;
use crate::error::{BarndoorError, Result};
use crate::utils::truncate_body;

/// Timeout applied to introspection requests
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Introspection response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenValidation {
    /// Whether the API accepts the token
    #[serde(default)]
    pub valid: bool,

    /// Error reported by the API, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// User information attached to the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<serde_json::Value>,

    /// Any other fields the API returns
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Asks the Barndoor API whether a token is currently valid
#[derive(Debug, Clone)]
pub struct TokenValidator {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenValidator {
    /// Validator with the default 5 second timeout
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_VALIDATION_TIMEOUT)
    }

    /// Validator with a custom timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Configured timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Raw validation call
    ///
    /// Unlike [`is_valid`](Self::is_valid) this keeps "unreachable" apart
    /// from "invalid".
    ///
    /// # Errors
    ///
    /// Returns `Connection` on transport failure or timeout, `Http` on a
    /// non-success status, `Decode` if the body is not the expected JSON.
    pub async fn validate(&self, token: &str, api_base_url: &str) -> Result<TokenValidation> {
        let url = format!("{}/identity/token", api_base_url.trim_end_matches('/'));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BarndoorError::connection(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BarndoorError::connection(&url, e))?;

        if !status.is_success() {
            return Err(BarndoorError::http(status.as_u16(), &url, truncate_body(&body)));
        }

        serde_json::from_str(&body).map_err(|e| BarndoorError::decode(&url, e.to_string()))
    }

    /// `true` only if the API positively confirms the token
    ///
    /// Transport errors, timeouts and error statuses all count as invalid.
    pub async fn is_valid(&self, token: &str, api_base_url: &str) -> bool {
        match self.validate(token, api_base_url).await {
            Ok(validation) => validation.valid,
            Err(e) => {
                tracing::debug!("Token validation failed: {e}");
                false
            }
        }
    }

    /// Check the token held by `storage`; `false` when none is stored
    pub async fn is_stored_token_active(&self, storage: &TokenStorage, api_base_url: &str) -> bool {
        match storage.load() {
            Some(token) if !token.is_empty() => self.is_valid(&token, api_base_url).await,
            _ => false,
        }
    }
}

/// Validate a token with the default timeout
///
/// # Errors
///
/// See [`TokenValidator::validate`].
pub async fn validate_token(token: &str, api_base_url: &str) -> Result<TokenValidation> {
    TokenValidator::new().validate(token, api_base_url).await
}

/// Check whether the token in the default store is accepted by the API
pub async fn is_token_active(api_base_url: &str) -> bool {
    match TokenStorage::new() {
        Ok(storage) => {
            TokenValidator::new()
                .is_stored_token_active(&storage, api_base_url)
                .await
        }
        Err(e) => {
            tracing::debug!("No token store available: {e}");
            false
        }
    }
}
