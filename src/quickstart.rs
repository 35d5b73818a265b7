//! One-call helpers for agent scripts
//!
//! These glue login, the registry client and configuration together for the
//! common "log in, make sure a server is connected, hand MCP params to my
//! agent framework" sequence.

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::auth::{OAuthClient, OAuthConfig, TokenValidator, open_in_browser};
use crate::client::BarndoorSdk;
use crate::config::{BarndoorConfig, Environment};
use crate::error::{BarndoorError, Result};
use crate::types::McpConnectionParams;

/// Log in (reusing a valid cached token) and return a ready client
///
/// The client targets the API URL resolved for the token's organization.
///
/// # Errors
///
/// Returns an error if credentials are missing or the login flow fails.
pub async fn login_interactive(config: &BarndoorConfig) -> Result<BarndoorSdk> {
    let client = OAuthClient::new(OAuthConfig::from_config(config))?;
    login_with(&client, config).await
}

/// [`login_interactive`] with a caller-supplied OAuth client
///
/// - `prompt_for_login` forces a fresh login.
/// - In local mode with `skip_login_local`, any cached token is used as is.
/// - Otherwise a cached token is used if the API still accepts it.
///
/// # Errors
///
/// Returns an error if a login is needed and fails.
pub async fn login_with(client: &OAuthClient, config: &BarndoorConfig) -> Result<BarndoorSdk> {
    let cached = if config.prompt_for_login {
        None
    } else {
        client.current_token()
    };

    if let Some(token) = cached {
        let resolved = config.with_token(&token);
        if resolved.environment == Environment::Local && config.skip_login_local {
            tracing::debug!("Local mode: using cached token without validation");
            return BarndoorSdk::from_config(&resolved, Some(token));
        }
        if TokenValidator::new()
            .is_valid(&token, &resolved.api_base_url)
            .await
        {
            tracing::debug!("Using cached Barndoor token");
            return BarndoorSdk::from_config(&resolved, Some(token));
        }
        tracing::info!("Cached token is no longer valid, logging in again");
    }

    let token = client.login().await?;
    let resolved = config.with_token(&token);
    BarndoorSdk::from_config(&resolved, Some(token))
}

/// How [`ensure_server_connected`] waits for the user
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ConnectPolling"),
    builder_type(doc = "Builder for ConnectPolling", vis = "pub"),
    build_method(doc = "Build the ConnectPolling")
)]
pub struct ConnectPolling {
    /// Give up after this long
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,

    /// Delay between status checks
    #[builder(default = Duration::from_secs(1))]
    pub interval: Duration,

    /// Open the authorization URL in the system browser
    #[builder(default = true)]
    pub open_browser: bool,
}

impl Default for ConnectPolling {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Make sure the user's account is connected to a server
///
/// Looks the server up by slug or provider. If it is not connected yet,
/// starts the OAuth connection, sends the user to the authorization URL and
/// polls the status until it reports `connected`.
///
/// # Errors
///
/// Returns `NotFound` for an unknown server, `ConnectionTimeout` if the
/// user does not finish in time, or any registry error.
pub async fn ensure_server_connected(
    sdk: &BarndoorSdk,
    identifier: &str,
    polling: &ConnectPolling,
) -> Result<()> {
    let server = sdk.find_server(identifier).await?;
    if server.connection_status.is_connected() {
        tracing::debug!(server = %server.slug, "Server already connected");
        return Ok(());
    }

    let init = sdk.initiate_connection(&server.id, None).await?;
    let auth_url = init.auth_url.ok_or_else(|| {
        BarndoorError::decode(
            format!("{}/servers/{}/connect", sdk.base_url(), server.id),
            "response has no auth_url",
        )
    })?;

    println!("Authorize {} in your browser:", server.name);
    println!("  {auth_url}");
    if polling.open_browser {
        open_in_browser(&auth_url);
    }

    let deadline = tokio::time::Instant::now() + polling.timeout;
    loop {
        let status = sdk.get_connection_status(&server.id).await?;
        if status.is_connected() {
            tracing::info!(server = %server.slug, "Server connected");
            return Ok(());
        }
        tracing::debug!(server = %server.slug, %status, "Waiting for connection");

        if tokio::time::Instant::now() + polling.interval > deadline {
            return Err(BarndoorError::ConnectionTimeout {
                server: server.slug,
                waited: polling.timeout,
            });
        }
        tokio::time::sleep(polling.interval).await;
    }
}

/// MCP connection parameters for a server
///
/// The URL is `{mcp_base_url}/mcp/{slug}`. The second value is the public
/// URL of the endpoint, `None` in local mode where the endpoint is not
/// reachable from outside.
///
/// # Errors
///
/// Returns `NotFound` for an unknown server, or any registry error.
pub async fn make_mcp_connection_params(
    sdk: &BarndoorSdk,
    config: &BarndoorConfig,
    identifier: &str,
) -> Result<(McpConnectionParams, Option<String>)> {
    let server = sdk.find_server(identifier).await?;
    let url = format!(
        "{}/mcp/{}",
        config.mcp_base_url.trim_end_matches('/'),
        server.slug
    );

    let public_url = match config.environment {
        Environment::Local => None,
        Environment::Development | Environment::Production => Some(url.clone()),
    };

    Ok((
        McpConnectionParams::streamable_http(url, sdk.token()),
        public_url,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_polling() {
        let polling = ConnectPolling::default();
        assert_eq!(polling.timeout, Duration::from_secs(60));
        assert_eq!(polling.interval, Duration::from_secs(1));
        assert!(polling.open_browser);
    }
}
