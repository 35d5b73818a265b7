//! Barndoor CLI
//!
//! Log in, inspect the cached token and browse the server registry from the
//! command line.
//!
//! Run with: cargo run -p barndoor-cli -- login

use std::time::Duration;

use anyhow::{Context, bail};
use barndoor_sdk::auth::{
    OAuthClient, OAuthConfig, TokenStorage, clear_cached_token, is_token_active, load_user_token,
    save_user_token, validate_token,
};
use barndoor_sdk::config::{BarndoorConfig, load_dotenv};
use barndoor_sdk::quickstart::{ConnectPolling, ensure_server_connected, make_mcp_connection_params};
use barndoor_sdk::utils::mask_token;
use barndoor_sdk::{BarndoorSdk, SdkOptions};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "barndoor")]
#[command(about = "Barndoor login and token management", version)]
struct Cli {
    /// API base URL (defaults to the URL resolved from the environment and token)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in through the browser and cache the token
    Login {
        /// Loopback port registered as redirect target
        #[arg(long, default_value_t = barndoor_sdk::auth::DEFAULT_CALLBACK_PORT)]
        port: u16,

        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Seconds to wait for the browser redirect
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// Show whether a token is cached and still accepted
    Status,
    /// Show the full introspection result for the cached token
    Validate,
    /// Delete the cached token
    Clear,
    /// Cache a token obtained elsewhere
    Save {
        /// Access token
        token: String,
    },
    /// List servers available to the user
    Servers,
    /// Connect the user's account to a server
    Connect {
        /// Server slug or provider
        server: String,

        /// Seconds to wait for the connection
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
    /// Print MCP connection parameters for a server as JSON
    Mcp {
        /// Server slug or provider
        server: String,
    },
}

/// Configuration resolved for the cached token, if any
fn resolved_config() -> BarndoorConfig {
    match load_user_token() {
        Some(token) => BarndoorConfig::from_env(Some(&token)),
        None => BarndoorConfig::from_env(None),
    }
}

fn api_url(cli_url: Option<&str>, config: &BarndoorConfig) -> String {
    cli_url.map_or_else(|| config.api_base_url.clone(), str::to_string)
}

/// Client options for the configured environment
///
/// Token introspection stays off outside production, where `/identity/token`
/// may not be served.
fn sdk_options(config: &BarndoorConfig) -> SdkOptions {
    SdkOptions::builder().environment(config.environment).build()
}

fn sdk_for(api_url: &str, config: &BarndoorConfig) -> anyhow::Result<BarndoorSdk> {
    Ok(BarndoorSdk::with_options(api_url, None, sdk_options(config))?)
}

async fn login(port: u16, no_browser: bool, timeout: u64) -> anyhow::Result<()> {
    let config = BarndoorConfig::from_env(None);
    let oauth = OAuthConfig {
        port,
        callback_timeout: Duration::from_secs(timeout),
        ..OAuthConfig::from_config(&config)
    };
    let client = OAuthClient::builder()
        .config(oauth)
        .auto_open_browser(!no_browser)
        .build()?;

    let token = client.login().await.context("login failed")?;
    let resolved = config.with_token(&token);
    match resolved.organization_id.as_deref() {
        Some(org) => println!("Organization: {org}"),
        None => println!("Organization: (not found in token)"),
    }
    println!("API: {}", resolved.api_base_url);
    Ok(())
}

async fn status(api_url: &str) -> anyhow::Result<()> {
    println!("=== Token Status ===");
    let Some(token) = load_user_token() else {
        println!("No cached token found");
        return Ok(());
    };
    println!("Cached token: {}", mask_token(&token));

    let active = is_token_active(api_url).await;
    println!("Active: {}", if active { "yes" } else { "no" });
    Ok(())
}

async fn validate(api_url: &str) -> anyhow::Result<()> {
    println!("=== Token Validation ===");
    let Some(token) = load_user_token() else {
        println!("No cached token found");
        return Ok(());
    };

    let result = validate_token(&token, api_url).await?;
    println!("Valid: {}", if result.valid { "yes" } else { "no" });
    println!("Error: {}", result.error.as_deref().unwrap_or("none"));
    if let Some(user_info) = result.user_info {
        println!("User info: {}", serde_json::to_string_pretty(&user_info)?);
    }
    Ok(())
}

async fn servers(api_url: &str, config: &BarndoorConfig) -> anyhow::Result<()> {
    let sdk = sdk_for(api_url, config)?;
    let servers = sdk.list_servers().await?;
    if servers.is_empty() {
        println!("No servers available");
        return Ok(());
    }
    for server in servers {
        println!(
            "{:<24} {:<16} {:<12} {}",
            server.slug,
            server.provider.as_deref().unwrap_or("-"),
            server.connection_status,
            server.name
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("barndoor_sdk=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = load_dotenv(None, false) {
        tracing::debug!(path = %path.display(), "Loaded environment");
    }

    let cli = Cli::parse();
    let config = resolved_config();
    let api = api_url(cli.api_url.as_deref(), &config);

    match cli.command {
        Command::Login {
            port,
            no_browser,
            timeout,
        } => login(port, no_browser, timeout).await,
        Command::Status => status(&api).await,
        Command::Validate => validate(&api).await,
        Command::Clear => {
            clear_cached_token()?;
            println!("Cached token cleared");
            Ok(())
        }
        Command::Save { token } => {
            if token.trim().is_empty() {
                bail!("token must not be empty");
            }
            save_user_token(token.trim())?;
            println!("Token saved to {}", TokenStorage::new()?.path().display());
            Ok(())
        }
        Command::Servers => servers(&api, &config).await,
        Command::Connect { server, timeout } => {
            let sdk = sdk_for(&api, &config)?;
            let polling = ConnectPolling::builder()
                .timeout(Duration::from_secs(timeout))
                .build();
            ensure_server_connected(&sdk, &server, &polling).await?;
            println!("{server} is connected");
            Ok(())
        }
        Command::Mcp { server } => {
            let sdk = sdk_for(&api, &config)?;
            let (params, public_url) = make_mcp_connection_params(&sdk, &config, &server).await?;
            println!("{}", serde_json::to_string_pretty(&params)?);
            if let Some(url) = public_url {
                println!("Public URL: {url}");
            }
            Ok(())
        }
    }
}
