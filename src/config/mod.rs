//! Environment-aware SDK configuration
//!
//! A [`BarndoorConfig`] is an owned snapshot built from process environment
//! variables (optionally seeded from a `.env` file) and, when available, the
//! user's access token. The token matters because API and MCP base URLs are
//! templates containing an `{organization_id}` placeholder that is filled in
//! from the token's claims.
//!
//! Snapshots are never mutated by the SDK; [`BarndoorConfig::with_token`]
//! returns a new one.
//!
//! # Environment variables
//!
//! | Variable | Purpose |
//! |----------|---------|
//! | `MODE` / `BARNDOOR_ENV` | `local`, `development` or `production` (default) |
//! | `AUTH_DOMAIN` / `AUTH0_DOMAIN` | Authorization server host |
//! | `AGENT_CLIENT_ID` / `AUTH_CLIENT_ID` | OAuth client id |
//! | `AGENT_CLIENT_SECRET` / `AUTH_CLIENT_SECRET` | OAuth client secret |
//! | `API_AUDIENCE` | Token audience |
//! | `BARNDOOR_API` | API base URL template |
//! | `BARNDOOR_URL` | MCP base URL template |
//! | `PROMPT_FOR_LOGIN` / `SKIP_LOGIN_LOCAL` | Login behaviour flags |

mod claims;

use std::fmt;
use std::path::{Path, PathBuf};

use typed_builder::TypedBuilder;

pub use claims::{
    Claims, ClaimsError, decode_unverified_claims, organization_from_claims,
    organization_from_token,
};

#[cfg(test)]
pub(crate) use claims::tests::jwt as test_jwt;

/// Production authorization server
pub const DEFAULT_AUTH_DOMAIN: &str = "auth.barndoor.ai";

/// Audience requested for access tokens
pub const DEFAULT_API_AUDIENCE: &str = "https://barndoor.ai/";

/// Placeholder substituted with the organization from the token
pub const ORGANIZATION_PLACEHOLDER: &str = "{organization_id}";

const LOCAL_AUTH_DOMAIN: &str = "localhost:3001";
const LOCAL_BASE_URL: &str = "http://localhost:8000";
const DEVELOPMENT_BASE_TEMPLATE: &str = "https://{organization_id}.mcp.barndoordev.com";
const PRODUCTION_BASE_TEMPLATE: &str = "https://{organization_id}.mcp.barndoor.ai";

/// Deployment the SDK talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// Developer machine (`local`, `localdev`)
    Local,
    /// Shared development deployment (`development`, `dev`)
    Development,
    /// Production (anything else)
    #[default]
    Production,
}

impl Environment {
    /// Parse a mode name; unknown names mean production
    #[must_use]
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "local" | "localdev" => Self::Local,
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    /// Canonical name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    /// Base URL template used when no override is given
    #[must_use]
    pub fn default_base_template(self) -> &'static str {
        match self {
            Self::Local => LOCAL_BASE_URL,
            Self::Development => DEVELOPMENT_BASE_TEMPLATE,
            Self::Production => PRODUCTION_BASE_TEMPLATE,
        }
    }

    /// Authorization server used when no override is given
    #[must_use]
    pub fn default_auth_domain(self) -> &'static str {
        match self {
            Self::Local => LOCAL_AUTH_DOMAIN,
            Self::Development | Self::Production => DEFAULT_AUTH_DOMAIN,
        }
    }

    /// Environment file loaded by [`load_dotenv`]
    #[must_use]
    pub fn dotenv_file_name(self) -> &'static str {
        match self {
            Self::Local => ".env.localdev",
            Self::Development => ".env.development",
            Self::Production => ".env.production",
        }
    }

    /// Whether this is production
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Environment {
    fn from(mode: &str) -> Self {
        Self::parse(mode)
    }
}

/// Explicit configuration inputs
///
/// Every field is optional; unset fields fall back to the mode defaults when
/// a [`BarndoorConfig`] is resolved. [`ConfigOverrides::from_env`] fills them
/// from the process environment.
///
/// ```
/// use barndoor_sdk::config::{BarndoorConfig, ConfigOverrides};
///
/// let overrides = ConfigOverrides::builder()
///     .mode("development")
///     .client_id("my-agent")
///     .build();
/// let config = BarndoorConfig::resolve(&overrides, None);
/// assert_eq!(config.client_id, "my-agent");
/// ```
#[derive(Clone, Default, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ConfigOverrides"),
    builder_type(doc = "Builder for ConfigOverrides", vis = "pub"),
    build_method(doc = "Build the ConfigOverrides")
)]
pub struct ConfigOverrides {
    /// Mode name, see [`Environment::parse`]
    #[builder(default, setter(strip_option, into))]
    pub mode: Option<String>,

    /// Authorization server host
    #[builder(default, setter(strip_option, into))]
    pub auth_domain: Option<String>,

    /// OAuth client id
    #[builder(default, setter(strip_option, into))]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[builder(default, setter(strip_option, into))]
    pub client_secret: Option<String>,

    /// Token audience
    #[builder(default, setter(strip_option, into))]
    pub api_audience: Option<String>,

    /// API base URL template
    #[builder(default, setter(strip_option, into))]
    pub api_base_url: Option<String>,

    /// MCP base URL template
    #[builder(default, setter(strip_option, into))]
    pub mcp_base_url: Option<String>,

    /// Force an interactive login even with a cached token
    #[builder(default, setter(strip_option))]
    pub prompt_for_login: Option<bool>,

    /// Skip the login step in local mode
    #[builder(default, setter(strip_option))]
    pub skip_login_local: Option<bool>,
}

impl ConfigOverrides {
    /// Read overrides from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup
    ///
    /// For each setting the first non-empty variable in its alias list wins.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let mode = first(&["MODE", "BARNDOOR_ENV"]);
        let environment = mode.as_deref().map(Environment::parse).unwrap_or_default();

        // The hosted auth tenant variable is ignored for local development.
        let auth_domain = if environment == Environment::Local {
            first(&["AUTH_DOMAIN"])
        } else {
            first(&["AUTH_DOMAIN", "AUTH0_DOMAIN"])
        };

        Self {
            mode,
            auth_domain,
            client_id: first(&["AGENT_CLIENT_ID", "AUTH_CLIENT_ID"]),
            client_secret: first(&["AGENT_CLIENT_SECRET", "AUTH_CLIENT_SECRET"]),
            api_audience: first(&["API_AUDIENCE"]),
            api_base_url: first(&["BARNDOOR_API"]),
            mcp_base_url: first(&["BARNDOOR_URL"]),
            prompt_for_login: first(&["PROMPT_FOR_LOGIN"]).map(|v| parse_flag(&v)),
            skip_login_local: first(&["SKIP_LOGIN_LOCAL"]).map(|v| parse_flag(&v)),
        }
    }

    /// Mode selected by these overrides
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.mode
            .as_deref()
            .map(Environment::parse)
            .unwrap_or_default()
    }
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("mode", &self.mode)
            .field("auth_domain", &self.auth_domain)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("api_audience", &self.api_audience)
            .field("api_base_url", &self.api_base_url)
            .field("mcp_base_url", &self.mcp_base_url)
            .field("prompt_for_login", &self.prompt_for_login)
            .field("skip_login_local", &self.skip_login_local)
            .finish()
    }
}

/// `1`, `true`, `yes` and `on` (any case) are true
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Resolved SDK configuration
#[derive(Clone, PartialEq, Eq)]
pub struct BarndoorConfig {
    /// Authorization server host
    pub auth_domain: String,
    /// OAuth client id (may be empty)
    pub client_id: String,
    /// OAuth client secret (may be empty)
    pub client_secret: String,
    /// Token audience
    pub api_audience: String,
    /// API base URL; keeps the placeholder if no organization was found
    pub api_base_url: String,
    /// MCP base URL; keeps the placeholder if no organization was found
    pub mcp_base_url: String,
    /// Deployment mode
    pub environment: Environment,
    /// Force an interactive login
    pub prompt_for_login: bool,
    /// Skip login in local mode
    pub skip_login_local: bool,
    /// Organization taken from the token, if any
    pub organization_id: Option<String>,
    api_base_template: String,
    mcp_base_template: String,
}

impl BarndoorConfig {
    /// Resolve a configuration from explicit overrides and an optional token
    #[must_use]
    pub fn resolve(overrides: &ConfigOverrides, token: Option<&str>) -> Self {
        let environment = overrides.environment();
        let default_template = environment.default_base_template();

        let api_base_template = overrides
            .api_base_url
            .clone()
            .unwrap_or_else(|| default_template.to_string());
        let mcp_base_template = overrides
            .mcp_base_url
            .clone()
            .unwrap_or_else(|| default_template.to_string());

        let config = Self {
            auth_domain: overrides
                .auth_domain
                .clone()
                .unwrap_or_else(|| environment.default_auth_domain().to_string()),
            client_id: overrides.client_id.clone().unwrap_or_default(),
            client_secret: overrides.client_secret.clone().unwrap_or_default(),
            api_audience: overrides
                .api_audience
                .clone()
                .unwrap_or_else(|| DEFAULT_API_AUDIENCE.to_string()),
            api_base_url: api_base_template.clone(),
            mcp_base_url: mcp_base_template.clone(),
            environment,
            prompt_for_login: overrides.prompt_for_login.unwrap_or(false),
            skip_login_local: overrides.skip_login_local.unwrap_or(false),
            organization_id: None,
            api_base_template,
            mcp_base_template,
        };

        match token {
            Some(token) => config.with_token(token),
            None => config,
        }
    }

    /// Resolve from the process environment
    #[must_use]
    pub fn from_env(token: Option<&str>) -> Self {
        Self::resolve(&ConfigOverrides::from_env(), token)
    }

    /// New snapshot with URLs resolved for `token`'s organization
    ///
    /// If no organization can be read from the token the templates are kept
    /// as they are, placeholder included.
    #[must_use]
    pub fn with_token(&self, token: &str) -> Self {
        let organization_id = organization_from_token(token);
        let (api_base_url, mcp_base_url) = match organization_id.as_deref() {
            Some(org) => (
                substitute_organization(&self.api_base_template, org),
                substitute_organization(&self.mcp_base_template, org),
            ),
            None => {
                tracing::debug!("No organization in token; base URLs left unresolved");
                (
                    self.api_base_template.clone(),
                    self.mcp_base_template.clone(),
                )
            }
        };

        Self {
            api_base_url,
            mcp_base_url,
            organization_id,
            ..self.clone()
        }
    }

    /// API base URL template before substitution
    #[must_use]
    pub fn api_base_template(&self) -> &str {
        &self.api_base_template
    }

    /// MCP base URL template before substitution
    #[must_use]
    pub fn mcp_base_template(&self) -> &str {
        &self.mcp_base_template
    }

    /// Whether either base URL still contains the placeholder
    #[must_use]
    pub fn has_unresolved_organization(&self) -> bool {
        self.api_base_url.contains(ORGANIZATION_PLACEHOLDER)
            || self.mcp_base_url.contains(ORGANIZATION_PLACEHOLDER)
    }
}

impl Default for BarndoorConfig {
    fn default() -> Self {
        Self::resolve(&ConfigOverrides::default(), None)
    }
}

impl fmt::Debug for BarndoorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarndoorConfig")
            .field("environment", &self.environment)
            .field("auth_domain", &self.auth_domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_audience", &self.api_audience)
            .field("api_base_url", &self.api_base_url)
            .field("mcp_base_url", &self.mcp_base_url)
            .field("organization_id", &self.organization_id)
            .field("prompt_for_login", &self.prompt_for_login)
            .field("skip_login_local", &self.skip_login_local)
            .finish()
    }
}

fn substitute_organization(template: &str, organization_id: &str) -> String {
    template.replace(ORGANIZATION_PLACEHOLDER, organization_id)
}

/// Configuration from the environment without a token
#[must_use]
pub fn static_config() -> BarndoorConfig {
    BarndoorConfig::from_env(None)
}

/// Configuration from the environment, resolved for `token`
#[must_use]
pub fn dynamic_config(token: &str) -> BarndoorConfig {
    BarndoorConfig::from_env(Some(token))
}

/// `.env` file name for a mode
///
/// Mode aliases share one file per environment (`dev` reads
/// `.env.development`). Unset mode means local development, matching how
/// agents are usually run from a checkout.
#[must_use]
pub fn dotenv_file_name(mode: Option<&str>) -> &'static str {
    match mode.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mode) => Environment::parse(mode).dotenv_file_name(),
        None => Environment::Local.dotenv_file_name(),
    }
}

/// Load environment variables from a `.env` file
///
/// With `path` set only that file is considered. Otherwise the mode-specific
/// file ([`dotenv_file_name`]) in the current directory is tried first, then `.env`.
/// Existing variables are kept unless `override_existing` is set.
///
/// Returns the file that was loaded, if any.
pub fn load_dotenv(path: Option<&Path>, override_existing: bool) -> Option<PathBuf> {
    let candidates = match path {
        Some(p) => vec![p.to_path_buf()],
        None => {
            let mode = std::env::var("MODE")
                .or_else(|_| std::env::var("BARNDOOR_ENV"))
                .ok();
            vec![
                PathBuf::from(dotenv_file_name(mode.as_deref())),
                PathBuf::from(".env"),
            ]
        }
    };

    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        let loaded = if override_existing {
            dotenvy::from_path_override(&candidate)
        } else {
            dotenvy::from_path(&candidate)
        };
        match loaded {
            Ok(()) => {
                tracing::debug!(path = %candidate.display(), "Loaded environment file");
                return Some(candidate);
            }
            Err(e) => {
                tracing::warn!(path = %candidate.display(), "Failed to load environment file: {e}");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn overrides(vars: &[(&str, &str)]) -> ConfigOverrides {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ConfigOverrides::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_production_defaults() {
        let config = BarndoorConfig::resolve(&ConfigOverrides::default(), None);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.auth_domain, DEFAULT_AUTH_DOMAIN);
        assert_eq!(config.api_audience, DEFAULT_API_AUDIENCE);
        assert_eq!(config.api_base_url, "https://{organization_id}.mcp.barndoor.ai");
        assert_eq!(config.mcp_base_url, config.api_base_url);
        assert!(config.has_unresolved_organization());
        assert!(config.client_id.is_empty());
        assert!(!config.prompt_for_login);
    }

    #[test]
    fn test_token_resolves_organization() {
        let token = test_jwt(&json!({"user": {"organization_name": "acme"}}));
        let config = BarndoorConfig::resolve(&ConfigOverrides::default(), Some(&token));
        assert_eq!(config.organization_id.as_deref(), Some("acme"));
        assert_eq!(config.api_base_url, "https://acme.mcp.barndoor.ai");
        assert_eq!(config.mcp_base_url, "https://acme.mcp.barndoor.ai");
        assert!(!config.has_unresolved_organization());
    }

    #[test]
    fn test_token_without_organization_keeps_placeholder() {
        let token = test_jwt(&json!({"sub": "u1"}));
        let config = BarndoorConfig::resolve(&ConfigOverrides::default(), Some(&token));
        assert_eq!(config.organization_id, None);
        assert_eq!(config.api_base_url, "https://{organization_id}.mcp.barndoor.ai");
    }

    #[test]
    fn test_undecodable_token_keeps_placeholder() {
        let config = BarndoorConfig::resolve(&ConfigOverrides::default(), Some("garbage"));
        assert!(config.has_unresolved_organization());
    }

    #[test]
    fn test_with_token_leaves_base_snapshot_untouched() {
        let base = BarndoorConfig::default();
        let token = test_jwt(&json!({"org_id": "o1"}));
        let resolved = base.with_token(&token);
        assert_eq!(resolved.api_base_url, "https://o1.mcp.barndoor.ai");
        assert!(base.has_unresolved_organization());
        assert_eq!(resolved.api_base_template(), base.api_base_template());
    }

    #[test]
    fn test_modes() {
        let dev = BarndoorConfig::resolve(&overrides(&[("MODE", "dev")]), None);
        assert_eq!(dev.environment, Environment::Development);
        assert_eq!(dev.api_base_url, "https://{organization_id}.mcp.barndoordev.com");

        let local = BarndoorConfig::resolve(&overrides(&[("BARNDOOR_ENV", "localdev")]), None);
        assert_eq!(local.environment, Environment::Local);
        assert_eq!(local.api_base_url, "http://localhost:8000");
        assert_eq!(local.auth_domain, "localhost:3001");
        assert!(!local.has_unresolved_organization());

        let unknown = BarndoorConfig::resolve(&overrides(&[("MODE", "staging")]), None);
        assert_eq!(unknown.environment, Environment::Production);
    }

    #[test]
    fn test_mode_prefers_mode_over_barndoor_env() {
        let o = overrides(&[("MODE", "development"), ("BARNDOOR_ENV", "local")]);
        assert_eq!(o.environment(), Environment::Development);
    }

    #[test]
    fn test_local_mode_ignores_hosted_auth_domain() {
        let o = overrides(&[("MODE", "local"), ("AUTH0_DOMAIN", "tenant.auth0.com")]);
        assert_eq!(BarndoorConfig::resolve(&o, None).auth_domain, "localhost:3001");

        let o = overrides(&[("MODE", "production"), ("AUTH0_DOMAIN", "tenant.auth0.com")]);
        assert_eq!(BarndoorConfig::resolve(&o, None).auth_domain, "tenant.auth0.com");
    }

    #[test]
    fn test_alias_priority() {
        let o = overrides(&[
            ("AGENT_CLIENT_ID", "agent"),
            ("AUTH_CLIENT_ID", "auth"),
            ("AUTH_CLIENT_SECRET", "s3cret"),
        ]);
        assert_eq!(o.client_id.as_deref(), Some("agent"));
        assert_eq!(o.client_secret.as_deref(), Some("s3cret"));

        let o = overrides(&[("AGENT_CLIENT_ID", ""), ("AUTH_CLIENT_ID", "auth")]);
        assert_eq!(o.client_id.as_deref(), Some("auth"));
    }

    #[test]
    fn test_url_overrides_are_templates() {
        let o = overrides(&[
            ("BARNDOOR_API", "https://api.example.com/{organization_id}"),
            ("BARNDOOR_URL", "https://mcp.example.com"),
        ]);
        let token = test_jwt(&json!({"organization_id": "o9"}));
        let config = BarndoorConfig::resolve(&o, Some(&token));
        assert_eq!(config.api_base_url, "https://api.example.com/o9");
        assert_eq!(config.mcp_base_url, "https://mcp.example.com");
    }

    #[test]
    fn test_boolean_flags() {
        for truthy in ["1", "true", "YES", "On"] {
            let o = overrides(&[("PROMPT_FOR_LOGIN", truthy)]);
            assert_eq!(o.prompt_for_login, Some(true), "{truthy}");
        }
        for falsy in ["0", "false", "no", "maybe"] {
            let o = overrides(&[("SKIP_LOGIN_LOCAL", falsy)]);
            assert_eq!(o.skip_login_local, Some(false), "{falsy}");
        }
        assert_eq!(overrides(&[]).prompt_for_login, None);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let o = ConfigOverrides::builder().client_secret("hunter2").build();
        assert!(!format!("{o:?}").contains("hunter2"));
        let config = BarndoorConfig::resolve(&o, None);
        assert_eq!(config.client_secret, "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_dotenv_file_name() {
        assert_eq!(dotenv_file_name(None), ".env.localdev");
        assert_eq!(dotenv_file_name(Some("production")), ".env.production");
        assert_eq!(dotenv_file_name(Some("  ")), ".env.localdev");
        assert_eq!(dotenv_file_name(Some("dev")), ".env.development");
        assert_eq!(dotenv_file_name(Some("development")), ".env.development");
        assert_eq!(dotenv_file_name(Some("local")), ".env.localdev");
        assert_eq!(dotenv_file_name(Some("prod")), ".env.production");
        assert_eq!(dotenv_file_name(Some("PRODUCTION")), ".env.production");
    }

    #[test]
    fn test_load_dotenv_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join(".env.nothing");
        assert_eq!(load_dotenv(Some(&missing), false), None);
    }

    #[test]
    fn test_load_dotenv_explicit_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(".env.test");
        std::fs::write(&path, "BARNDOOR_SDK_DOTENV_TEST_KEY=loaded\n").unwrap();
        assert_eq!(load_dotenv(Some(&path), false), Some(path));
        assert_eq!(
            std::env::var("BARNDOOR_SDK_DOTENV_TEST_KEY").as_deref(),
            Ok("loaded")
        );
    }
}
