//! Client configuration options

use std::path::PathBuf;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::auth::DEFAULT_VALIDATION_TIMEOUT;
use crate::config::Environment;

/// Default timeout for registry requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for [`BarndoorSdk`](crate::BarndoorSdk)
///
/// # Example
///
/// ```
/// use barndoor_sdk::SdkOptions;
/// use barndoor_sdk::config::Environment;
/// use std::time::Duration;
///
/// let options = SdkOptions::builder()
///     .environment(Environment::Development)
///     .request_timeout(Duration::from_secs(10))
///     .build();
/// assert!(!options.should_validate_token());
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for SdkOptions"),
    builder_type(doc = "Builder for SdkOptions", vis = "pub"),
    build_method(doc = "Build the SdkOptions")
)]
pub struct SdkOptions {
    /// Deployment the client talks to
    #[builder(default)]
    pub environment: Environment,

    /// Validate the token before the first registry call
    ///
    /// Unset means "only in production"; other deployments may not expose
    /// the introspection endpoint.
    #[builder(default, setter(strip_option))]
    pub validate_token: Option<bool>,

    /// Timeout for registry requests
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,

    /// TCP connect timeout
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: Duration,

    /// Timeout for token introspection
    #[builder(default = DEFAULT_VALIDATION_TIMEOUT)]
    pub validation_timeout: Duration,

    /// Token file to fall back to when no token is passed
    #[builder(default, setter(strip_option, into))]
    pub token_path: Option<PathBuf>,
}

impl Default for SdkOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SdkOptions {
    /// Whether the token is checked before registry calls
    #[must_use]
    pub fn should_validate_token(&self) -> bool {
        self.validate_token
            .unwrap_or_else(|| self.environment.is_production())
    }
}
