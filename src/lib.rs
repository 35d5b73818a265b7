//! # Barndoor SDK for Rust
//!
//! Client SDK for the Barndoor platform, which brokers OAuth connections
//! between a user's account and third-party data servers and exposes them as
//! MCP endpoints for AI agents. Async/await, strong typing, tokio-based.
//!
//! ## Quick Start
//!
//! ```no_run
//! use barndoor_sdk::config::{BarndoorConfig, load_dotenv};
//! use barndoor_sdk::quickstart::{
//!     ConnectPolling, ensure_server_connected, login_interactive, make_mcp_connection_params,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     load_dotenv(None, false);
//!     let config = BarndoorConfig::from_env(None);
//!
//!     // Cached token if still valid, browser login otherwise
//!     let sdk = login_interactive(&config).await?;
//!
//!     ensure_server_connected(&sdk, "salesforce", &ConnectPolling::default()).await?;
//!
//!     let token_config = config.with_token(sdk.token());
//!     let (params, public_url) =
//!         make_mcp_connection_params(&sdk, &token_config, "salesforce").await?;
//!     println!("MCP endpoint: {} ({:?})", params.url, public_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Interactive login ([`auth`])
//!
//! OAuth authorization-code flow with a one-shot loopback listener on
//! `localhost:52765`. The access token is cached in `~/.barndoor/token.json`
//! and checked against the API before reuse.
//!
//! ### 2. Tenant configuration ([`config`])
//!
//! Environment-driven settings (local, development, production). API and MCP
//! hostnames are templates; the organization is read from the token's claims
//! and substituted for `{organization_id}`.
//!
//! ### 3. Server registry ([`BarndoorSdk`])
//!
//! List servers, inspect them, and start the OAuth connection that links the
//! user's account to a server.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, BarndoorError>`](Result):
//!
//! ```no_run
//! # use barndoor_sdk::{BarndoorError, BarndoorSdk};
//! # async fn example(sdk: &BarndoorSdk) {
//! match sdk.find_server("notion").await {
//!     Ok(server) => println!("{}: {}", server.name, server.connection_status),
//!     Err(BarndoorError::NotFound(name)) => eprintln!("no server called {name}"),
//!     Err(e) if e.is_connection() => eprintln!("API unreachable: {e}"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # }
//! ```
//!
//! ## Security
//!
//! - **Token file** - written atomically, owner-only permissions (600)
//! - **Loopback only** - the callback listener binds `127.0.0.1`/`::1`
//! - **State check** - the OAuth `state` is compared before the code is exchanged
//! - **No secrets in errors** - tokens and client secrets are redacted from
//!   `Debug` output and never included in error text
//! - **Unverified claims** - token claims are only used to pick the tenant
//!   hostname, never for authorization decisions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
mod http;
pub mod quickstart;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use auth::{
    OAuthClient, OAuthConfig, TokenStorage, TokenValidator, clear_cached_token, is_token_active,
    load_user_token, save_user_token, validate_token,
};
pub use client::BarndoorSdk;
pub use config::{BarndoorConfig, ConfigOverrides, Environment};
pub use error::{BarndoorError, Result};
pub use quickstart::{
    ConnectPolling, ensure_server_connected, login_interactive, make_mcp_connection_params,
};
pub use types::{
    ConnectionId, ConnectionInit, ConnectionStatus, McpConnectionParams, SdkOptions,
    SdkOptionsBuilder, ServerDetail, ServerId, ServerSummary,
};

/// Version of the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
