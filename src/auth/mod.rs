//! Authentication and token lifecycle for the Barndoor SDK
//!
//! # Overview
//!
//! Barndoor logins use the OAuth 2.0 authorization-code flow with a client
//! secret and a loopback redirect:
//!
//! 1. Bind a one-shot listener on `localhost:52765` ([`start_local_callback_server`])
//! 2. Open the browser at the provider's authorization URL
//! 3. The provider redirects to `/callback?code=...&state=...`
//! 4. Exchange the code for an access token ([`exchange_code_for_token`])
//! 5. Cache the token in `~/.barndoor/token.json` ([`TokenStorage`])
//!
//! Before a cached token is used, [`TokenValidator`] asks the API whether it
//! is still accepted.
//!
//! # Example
//!
//! ```no_run
//! use barndoor_sdk::auth::{OAuthClient, OAuthConfig};
//! use barndoor_sdk::config::BarndoorConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BarndoorConfig::from_env(None);
//!     let client = OAuthClient::new(OAuthConfig::from_config(&config))?;
//!
//!     // Reuse the cached token if the API still accepts it, otherwise log in
//!     let token = client.authenticate(&config.api_base_url).await?;
//!     println!("Authenticated, token cached at {}", client.storage().path().display());
//!     # let _ = token;
//!     Ok(())
//! }
//! ```
//!
//! # Security
//!
//! - The token file is written atomically with user-only permissions (600)
//! - The `state` parameter is checked before the code is exchanged
//! - Tokens and client secrets never appear in error messages

mod callback;
mod oauth;
mod token;
mod validate;

pub use callback::{
    CALLBACK_PATH, CallbackError, CallbackResult, DEFAULT_CALLBACK_PORT, PendingCallback,
    start_local_callback_server,
};
pub use oauth::{
    AuthResult, OAuthClient, OAuthClientBuilder, OAuthConfig, OAuthError, PendingLogin,
    auth_base_url, build_authorization_url, exchange_code_for_token,
};
pub(crate) use oauth::open_in_browser;
pub use token::{
    TokenError, TokenStorage, clear_cached_token, default_token_path, load_user_token,
    save_user_token,
};
pub use validate::{
    DEFAULT_VALIDATION_TIMEOUT, TokenValidation, TokenValidator, is_token_active, validate_token,
};
