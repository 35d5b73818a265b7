//! `BarndoorSdk` - async client for the Barndoor server registry
//!
//! The client is a thin wrapper over the registry REST API. Every request
//! carries the user's token as a bearer credential; before the first request
//! the token is checked against the introspection endpoint (production only,
//! unless configured otherwise) and the result is remembered.
//!
//! # Example
//!
//! ```no_run
//! use barndoor_sdk::BarndoorSdk;
//! use barndoor_sdk::config::BarndoorConfig;
//!
//! # async fn example() -> barndoor_sdk::Result<()> {
//! let token = barndoor_sdk::auth::load_user_token().ok_or(barndoor_sdk::BarndoorError::NotAuthenticated)?;
//! let config = BarndoorConfig::from_env(Some(&token));
//! let sdk = BarndoorSdk::from_config(&config, Some(token))?;
//!
//! for server in sdk.list_servers().await? {
//!     println!("{} ({}): {}", server.name, server.slug, server.connection_status);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use crate::auth::{TokenStorage, TokenValidator};
use crate::config::BarndoorConfig;
use crate::error::{BarndoorError, Result};
use crate::http::ApiHttp;
use crate::types::server::ConnectionStatusResponse;
use crate::types::{ConnectionInit, ConnectionStatus, SdkOptions, ServerDetail, ServerSummary};
use crate::utils::percent_encode;

const MISSING_OAUTH_CONFIGURATION: &str = "OAuth server configuration not found";

/// Client for the Barndoor registry API
#[derive(Debug)]
pub struct BarndoorSdk {
    http: ApiHttp,
    validator: TokenValidator,
    validate_token: bool,
    token_validated: AtomicBool,
}

impl BarndoorSdk {
    /// Create a client with default options
    ///
    /// Without an explicit token the cached one is used.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` if no token is given and none is cached.
    pub fn new(api_base_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_options(api_base_url, token, SdkOptions::default())
    }

    /// Create a client for a resolved configuration
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` if no token is given and none is cached.
    pub fn from_config(config: &BarndoorConfig, token: Option<String>) -> Result<Self> {
        if config.has_unresolved_organization() {
            tracing::warn!(
                api_base_url = %config.api_base_url,
                "API URL still contains an organization placeholder"
            );
        }
        let options = SdkOptions::builder()
            .environment(config.environment)
            .build();
        Self::with_options(&config.api_base_url, token, options)
    }

    /// Create a client with explicit options
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` if no token is given and none is cached,
    /// or `InvalidConfig` if the HTTP client cannot be built.
    pub fn with_options(
        api_base_url: &str,
        token: Option<String>,
        options: SdkOptions,
    ) -> Result<Self> {
        let token = token
            .filter(|t| !t.is_empty())
            .or_else(|| stored_token(&options))
            .ok_or(BarndoorError::NotAuthenticated)?;

        let http = ApiHttp::new(
            api_base_url,
            token,
            options.request_timeout,
            options.connect_timeout,
        )?;

        Ok(Self {
            http,
            validator: TokenValidator::with_timeout(options.validation_timeout),
            validate_token: options.should_validate_token(),
            token_validated: AtomicBool::new(false),
        })
    }

    /// Bearer token used for requests
    #[must_use]
    pub fn token(&self) -> &str {
        self.http.token()
    }

    /// API base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.http.base()
    }

    /// Ask the API whether the token is valid
    ///
    /// Never fails; unreachable counts as invalid. A positive answer is
    /// remembered so later calls skip the check.
    pub async fn validate_cached_token(&self) -> bool {
        let valid = self.validator.is_valid(self.token(), self.base_url()).await;
        if valid {
            self.token_validated.store(true, Ordering::Release);
        }
        valid
    }

    /// Validate the token once, before the first registry call
    ///
    /// A no-op when validation is disabled or already succeeded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the API rejects the token, or the transport
    /// error if the introspection endpoint cannot be reached.
    pub async fn ensure_valid_token(&self) -> Result<()> {
        if !self.validate_token || self.token_validated.load(Ordering::Acquire) {
            return Ok(());
        }

        match self.validator.validate(self.token(), self.base_url()).await {
            Ok(validation) if validation.valid => {
                self.token_validated.store(true, Ordering::Release);
                Ok(())
            }
            Ok(validation) => {
                tracing::debug!(error = ?validation.error, "Token rejected by API");
                Err(BarndoorError::InvalidToken)
            }
            Err(BarndoorError::Http { status: 401 | 403, .. }) => Err(BarndoorError::InvalidToken),
            Err(e) => Err(e),
        }
    }

    /// List the servers the user can access
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or the request fails.
    pub async fn list_servers(&self) -> Result<Vec<ServerSummary>> {
        self.ensure_valid_token().await?;
        self.http.get("/servers").await
    }

    /// Fetch one server by id
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or the request fails
    /// (a 404 surfaces as `Http`).
    pub async fn get_server(&self, server_id: &str) -> Result<ServerDetail> {
        self.ensure_valid_token().await?;
        self.http.get(&server_path(server_id, "")).await
    }

    /// The user's connection state for a server
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or the request fails.
    pub async fn get_connection_status(&self, server_id: &str) -> Result<ConnectionStatus> {
        self.ensure_valid_token().await?;
        let response: ConnectionStatusResponse = self
            .http
            .get(&server_path(server_id, "/connection"))
            .await?;
        Ok(response.status)
    }

    /// Start the OAuth flow that connects the user's account to a server
    ///
    /// The returned `auth_url` is where the user must go to authorize.
    ///
    /// # Errors
    ///
    /// Returns `MissingOAuthConfiguration` if the registry has no OAuth
    /// credentials for the server, otherwise the request error.
    pub async fn initiate_connection(
        &self,
        server_id: &str,
        return_url: Option<&str>,
    ) -> Result<ConnectionInit> {
        self.ensure_valid_token().await?;

        let query: Vec<(&str, &str)> = return_url.map(|u| ("return_url", u)).into_iter().collect();
        let result = self
            .http
            .post(
                &server_path(server_id, "/connect"),
                &query,
                &serde_json::json!({}),
            )
            .await;

        match result {
            Err(BarndoorError::Http { status: 500, body, .. })
                if body.contains(MISSING_OAUTH_CONFIGURATION) =>
            {
                Err(BarndoorError::MissingOAuthConfiguration)
            }
            other => other,
        }
    }

    /// Find a server by slug, or by provider ignoring case
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing matches, or the listing error.
    pub async fn find_server(&self, identifier: &str) -> Result<ServerSummary> {
        self.list_servers()
            .await?
            .into_iter()
            .find(|s| s.matches(identifier))
            .ok_or_else(|| BarndoorError::not_found(identifier))
    }
}

/// `/servers/{id}{suffix}` with the id encoded as a single path segment
fn server_path(server_id: &str, suffix: &str) -> String {
    format!("/servers/{}{suffix}", percent_encode(server_id))
}

fn stored_token(options: &SdkOptions) -> Option<String> {
    let storage = match &options.token_path {
        Some(path) => TokenStorage::with_path(path),
        None => match TokenStorage::new() {
            Ok(storage) => storage,
            Err(e) => {
                tracing::debug!("No token store available: {e}");
                return None;
            }
        },
    };
    storage.load().filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options_in(dir: &TempDir) -> SdkOptions {
        SdkOptions::builder()
            .token_path(dir.path().join("token.json"))
            .build()
    }

    #[test]
    fn test_server_path_encodes_id() {
        assert_eq!(server_path("srv-notion", ""), "/servers/srv-notion");
        assert_eq!(
            server_path("../admin", "/connect"),
            "/servers/..%2Fadmin/connect"
        );
        assert_eq!(server_path("a b?x", "/connection"), "/servers/a%20b%3Fx/connection");
    }

    #[test]
    fn test_missing_token_is_not_authenticated() {
        let temp_dir = TempDir::new().unwrap();
        let result = BarndoorSdk::with_options("http://localhost:8000", None, options_in(&temp_dir));
        assert!(matches!(result, Err(BarndoorError::NotAuthenticated)));
    }

    #[test]
    fn test_empty_token_falls_back_to_store() {
        let temp_dir = TempDir::new().unwrap();
        let options = options_in(&temp_dir);
        TokenStorage::with_path(options.token_path.clone().unwrap())
            .save("cached")
            .unwrap();

        let sdk =
            BarndoorSdk::with_options("http://localhost:8000/", Some(String::new()), options)
                .unwrap();
        assert_eq!(sdk.token(), "cached");
        assert_eq!(sdk.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_explicit_token_wins() {
        let temp_dir = TempDir::new().unwrap();
        let sdk = BarndoorSdk::with_options(
            "http://localhost:8000",
            Some("explicit".into()),
            options_in(&temp_dir),
        )
        .unwrap();
        assert_eq!(sdk.token(), "explicit");
    }

    #[test]
    fn test_debug_hides_token() {
        let sdk = BarndoorSdk::new("http://localhost:8000", Some("secret-token".into())).unwrap();
        assert!(!format!("{sdk:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn test_validation_skipped_when_disabled() {
        let options = SdkOptions::builder().validate_token(false).build();
        // Port 9 (discard) is never contacted when validation is off.
        let sdk = BarndoorSdk::with_options("http://127.0.0.1:9", Some("t".into()), options)
            .unwrap();
        assert!(sdk.ensure_valid_token().await.is_ok());
    }
}
