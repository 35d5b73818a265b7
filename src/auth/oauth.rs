//! OAuth 2.0 authorization-code login against the Barndoor identity provider

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::callback::{
    CallbackError, DEFAULT_CALLBACK_PORT, PendingCallback, start_local_callback_server,
};
use super::token::{TokenError, TokenStorage};
use super::validate::TokenValidator;
use crate::config::{BarndoorConfig, DEFAULT_API_AUDIENCE, DEFAULT_AUTH_DOMAIN};
use crate::utils::{percent_encode, truncate_body};

const DEFAULT_SCOPES: &str = "openid profile email";
const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors that can occur during OAuth operations
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The token endpoint could not be reached
    #[error("Failed to connect to {url}: {source}")]
    Connection {
        /// Token endpoint URL
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Token exchange was rejected
    #[error("Token exchange failed (HTTP {status}): {message}")]
    Exchange {
        /// HTTP status code
        status: u16,
        /// Provider message
        message: String,
    },

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client credentials are not configured
    #[error("{0} is required - set AGENT_CLIENT_ID and AGENT_CLIENT_SECRET")]
    MissingCredentials(&'static str),

    /// Loopback callback error
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// Token storage error
    #[error("Token storage error: {0}")]
    Storage(#[from] TokenError),

    /// Browser could not be opened
    #[error("Could not open browser: {0}")]
    BrowserOpen(String),
}

/// Result type for OAuth operations
pub type AuthResult<T> = Result<T, OAuthError>;

/// OAuth configuration
#[derive(Clone)]
pub struct OAuthConfig {
    /// Identity provider domain (e.g. `auth.barndoor.ai`)
    pub auth_domain: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// API audience requested for the token
    pub audience: String,
    /// Loopback port registered as redirect target
    pub port: u16,
    /// How long to wait for the browser redirect
    pub callback_timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_domain: DEFAULT_AUTH_DOMAIN.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            audience: DEFAULT_API_AUDIENCE.to_string(),
            port: DEFAULT_CALLBACK_PORT,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

impl OAuthConfig {
    /// Take domain, credentials and audience from a resolved configuration
    #[must_use]
    pub fn from_config(config: &BarndoorConfig) -> Self {
        Self {
            auth_domain: config.auth_domain.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            audience: config.api_audience.clone(),
            ..Self::default()
        }
    }

    fn check_credentials(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(OAuthError::MissingCredentials("client_id"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(OAuthError::MissingCredentials("client_secret"));
        }
        Ok(())
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("auth_domain", &self.auth_domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("port", &self.port)
            .field("callback_timeout", &self.callback_timeout)
            .finish()
    }
}

/// Successful response from the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Error response from the token endpoint
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Builder for [`OAuthClient`]
#[derive(Debug)]
pub struct OAuthClientBuilder {
    config: Option<OAuthConfig>,
    storage: Option<TokenStorage>,
    validator: Option<TokenValidator>,
    auto_open_browser: bool,
}

impl Default for OAuthClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthClientBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            storage: None,
            validator: None,
            auto_open_browser: true,
        }
    }

    /// Set custom OAuth configuration
    #[must_use]
    pub fn config(mut self, config: OAuthConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set custom token storage
    #[must_use]
    pub fn storage(mut self, storage: TokenStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the validator used to check cached tokens
    #[must_use]
    pub fn validator(mut self, validator: TokenValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set whether to automatically open browser (default: true)
    #[must_use]
    pub fn auto_open_browser(mut self, auto_open: bool) -> Self {
        self.auto_open_browser = auto_open;
        self
    }

    /// Build the OAuth client
    ///
    /// # Errors
    ///
    /// Returns an error if no storage was given and the default token path
    /// cannot be determined.
    pub fn build(self) -> AuthResult<OAuthClient> {
        let storage = match self.storage {
            Some(storage) => storage,
            None => TokenStorage::new()?,
        };
        Ok(OAuthClient {
            config: self.config.unwrap_or_default(),
            storage,
            validator: self.validator.unwrap_or_default(),
            auto_open_browser: self.auto_open_browser,
            http_client: reqwest::Client::new(),
        })
    }
}

/// OAuth client for Barndoor login
///
/// Runs the hybrid authorization-code flow: the browser talks to the
/// provider, the redirect lands on a loopback listener, and the code is
/// exchanged with the client secret. Only a successful exchange touches the
/// token store.
#[derive(Debug)]
pub struct OAuthClient {
    config: OAuthConfig,
    storage: TokenStorage,
    validator: TokenValidator,
    auto_open_browser: bool,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Create an OAuth client with default storage
    ///
    /// # Errors
    ///
    /// Returns an error if the default token path cannot be determined.
    pub fn new(config: OAuthConfig) -> AuthResult<Self> {
        Self::builder().config(config).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder() -> OAuthClientBuilder {
        OAuthClientBuilder::new()
    }

    /// Get the OAuth configuration
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Get the token storage
    #[must_use]
    pub fn storage(&self) -> &TokenStorage {
        &self.storage
    }

    /// Authenticate - reuse the cached token if the API accepts it, else log in
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh login is needed and fails.
    pub async fn authenticate(&self, api_base_url: &str) -> AuthResult<String> {
        match self.storage.load() {
            Some(token) if self.validator.is_valid(&token, api_base_url).await => {
                tracing::debug!("Using cached Barndoor token");
                return Ok(token);
            }
            Some(_) => tracing::info!("Cached token is no longer valid"),
            None => tracing::debug!("No cached token found"),
        }

        self.login().await
    }

    /// Run the interactive login and cache the new token
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the callback fails or
    /// times out, or the exchange is rejected. The cached token is left as it
    /// was in every error case.
    pub async fn login(&self) -> AuthResult<String> {
        let pending = self.begin().await?;

        println!();
        println!("Opening browser for authentication...");
        println!("If the browser doesn't open automatically, visit:");
        println!("  {}", pending.auth_url());
        println!();

        if self.auto_open_browser {
            if let Err(e) = open_browser(pending.auth_url()) {
                tracing::debug!("Could not open browser: {e}");
                println!("(Could not open browser automatically - please open the URL manually)");
            }
        }

        let token = pending.complete().await?;
        println!("Login successful - token saved to {}", self.storage.path().display());
        Ok(token)
    }

    /// Start a login: bind the callback listener and build the authorization URL
    ///
    /// The caller is responsible for getting the user to
    /// [`PendingLogin::auth_url`], then awaiting [`PendingLogin::complete`].
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials` if client id or secret are empty, or a
    /// callback error if the port cannot be bound.
    pub async fn begin(&self) -> AuthResult<PendingLogin<'_>> {
        self.config.check_credentials()?;

        let (redirect_uri, callback) = start_local_callback_server(self.config.port).await?;
        let state = generate_state();
        let auth_url = build_authorization_url(
            &self.config.auth_domain,
            &self.config.client_id,
            &redirect_uri,
            &self.config.audience,
            &state,
        );

        Ok(PendingLogin {
            client: self,
            auth_url,
            redirect_uri,
            state,
            callback,
        })
    }

    /// Log out - delete cached token
    ///
    /// # Errors
    ///
    /// Returns an error if token deletion fails.
    pub fn logout(&self) -> AuthResult<()> {
        self.storage.clear()?;
        tracing::info!("Cleared cached Barndoor token");
        Ok(())
    }

    /// Get the cached token without validating it
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.storage.load()
    }
}

/// A login waiting for the browser redirect
#[derive(Debug)]
pub struct PendingLogin<'a> {
    client: &'a OAuthClient,
    auth_url: String,
    redirect_uri: String,
    state: String,
    callback: PendingCallback,
}

impl PendingLogin<'_> {
    /// URL the user has to open
    #[must_use]
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Redirect URI the listener answers on
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect, exchange the code and save the token
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, provider error, state mismatch, exchange
    /// failure, or if the token cannot be written.
    pub async fn complete(self) -> AuthResult<String> {
        let config = &self.client.config;
        let result = self.callback.wait(config.callback_timeout).await?;

        if !constant_time_eq(result.state.as_bytes(), self.state.as_bytes()) {
            return Err(CallbackError::StateMismatch.into());
        }

        let token = exchange_code_for_token(
            &self.client.http_client,
            &config.auth_domain,
            &config.client_id,
            &config.client_secret,
            &result.code,
            &self.redirect_uri,
        )
        .await?;

        self.client.storage.save(&token)?;
        Ok(token)
    }
}

/// Base URL for an identity provider domain
///
/// Domains with a scheme are used as-is; loopback hosts default to `http`,
/// everything else to `https`.
#[must_use]
pub fn auth_base_url(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.contains("://") {
        domain.to_string()
    } else if domain.starts_with("localhost") || domain.starts_with("127.0.0.1") {
        format!("http://{domain}")
    } else {
        format!("https://{domain}")
    }
}

/// Build the authorization URL the user's browser is sent to
#[must_use]
pub fn build_authorization_url(
    domain: &str,
    client_id: &str,
    redirect_uri: &str,
    audience: &str,
    state: &str,
) -> String {
    let params = [
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("audience", audience),
        ("scope", DEFAULT_SCOPES),
        ("state", state),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}/authorize?{query}", auth_base_url(domain))
}

/// Exchange an authorization code for an access token
///
/// Single POST to `/oauth/token` with the client secret; no retries, since
/// authorization codes are single-use.
///
/// # Errors
///
/// Returns `Connection` if the endpoint is unreachable, `Exchange` on a
/// non-success status, and `InvalidResponse` if no access token came back.
pub async fn exchange_code_for_token(
    http_client: &reqwest::Client,
    domain: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> AuthResult<String> {
    let token_url = format!("{}/oauth/token", auth_base_url(domain));
    let body = serde_json::json!({
        "grant_type": "authorization_code",
        "client_id": client_id,
        "client_secret": client_secret,
        "code": code,
        "redirect_uri": redirect_uri,
    });

    tracing::debug!(url = %token_url, "Exchanging authorization code");
    let response = http_client
        .post(&token_url)
        .json(&body)
        .send()
        .await
        .map_err(|source| OAuthError::Connection {
            url: token_url.clone(),
            source,
        })?;

    let status = response.status();
    let response_text = response
        .text()
        .await
        .map_err(|source| OAuthError::Connection {
            url: token_url.clone(),
            source,
        })?;

    if !status.is_success() {
        let message = match serde_json::from_str::<ErrorResponse>(&response_text) {
            Ok(error) => error.error_description.unwrap_or(error.error),
            Err(_) => truncate_body(&response_text),
        };
        return Err(OAuthError::Exchange {
            status: status.as_u16(),
            message,
        });
    }

    let token_response: TokenResponse = serde_json::from_str(&response_text).map_err(|e| {
        OAuthError::InvalidResponse(format!("Failed to parse token response: {e}"))
    })?;

    token_response
        .access_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            OAuthError::InvalidResponse("Token response is missing access_token".to_string())
        })
}

/// Generate a state parameter (base64url encoded hash of local entropy)
fn generate_state() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&hash[..24]) // 24 bytes = 32 chars in base64
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Open URL in default browser
fn open_browser(url: &str) -> AuthResult<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(url)
            .spawn()
            .map_err(|e| OAuthError::BrowserOpen(e.to_string()))?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(url)
            .spawn()
            .map_err(|e| OAuthError::BrowserOpen(e.to_string()))?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn()
            .map_err(|e| OAuthError::BrowserOpen(e.to_string()))?;
    }

    Ok(())
}

/// Open a URL in the user's browser (used for server connection flows too)
pub(crate) fn open_in_browser(url: &str) {
    if let Err(e) = open_browser(url) {
        tracing::debug!("Could not open browser: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_base64url_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, b);
    }

    #[test]
    fn test_auth_base_url() {
        assert_eq!(auth_base_url("auth.barndoor.ai"), "https://auth.barndoor.ai");
        assert_eq!(auth_base_url("localhost:3001"), "http://localhost:3001");
        assert_eq!(auth_base_url("http://127.0.0.1:9999/"), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_build_authorization_url() {
        let url = build_authorization_url(
            "auth.barndoor.ai",
            "client-1",
            "http://localhost:52765/callback",
            "https://barndoor.ai/",
            "st4te",
        );
        let parsed = reqwest::Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("auth.barndoor.ai"));
        assert_eq!(parsed.path(), "/authorize");

        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-1");
        assert_eq!(pairs["redirect_uri"], "http://localhost:52765/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["audience"], "https://barndoor.ai/");
        assert_eq!(pairs["state"], "st4te");
    }

    #[test]
    fn test_oauth_config_default() {
        let config = OAuthConfig::default();
        assert_eq!(config.auth_domain, DEFAULT_AUTH_DOMAIN);
        assert_eq!(config.port, DEFAULT_CALLBACK_PORT);
        assert!(config.client_id.is_empty());
    }

    #[test]
    fn test_oauth_config_debug_redacts_secret() {
        let config = OAuthConfig {
            client_secret: "super-secret".to_string(),
            ..OAuthConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_missing_credentials() {
        let config = OAuthConfig {
            client_id: String::new(),
            client_secret: "secret".to_string(),
            ..OAuthConfig::default()
        };
        assert!(matches!(
            config.check_credentials(),
            Err(OAuthError::MissingCredentials("client_id"))
        ));

        let config = OAuthConfig {
            client_id: "id".to_string(),
            client_secret: "  ".to_string(),
            ..OAuthConfig::default()
        };
        assert!(matches!(
            config.check_credentials(),
            Err(OAuthError::MissingCredentials("client_secret"))
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn test_oauth_client_builder() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let client = OAuthClient::builder()
            .storage(TokenStorage::with_path(temp_dir.path().join("token.json")))
            .auto_open_browser(false)
            .build()
            .unwrap();

        assert!(!client.auto_open_browser);
        assert_eq!(client.config().auth_domain, DEFAULT_AUTH_DOMAIN);
        assert_eq!(client.current_token(), None);
    }

    #[tokio::test]
    async fn test_exchange_rejects_blank_access_token() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "  "})),
            )
            .mount(&provider)
            .await;

        let err = exchange_code_for_token(
            &reqwest::Client::new(),
            &provider.uri(),
            "client-1",
            "secret-1",
            "code-1",
            "http://localhost:52765/callback",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidResponse(_)), "{err:?}");
    }
}
