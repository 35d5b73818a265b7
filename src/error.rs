//! Error types for the Barndoor SDK

use std::time::Duration;

use thiserror::Error;

use crate::auth::{CallbackError, OAuthError, TokenError};

/// Main error type for the Barndoor SDK
#[derive(Error, Debug)]
pub enum BarndoorError {
    /// The API could not be reached (DNS, refused connection, timeout)
    #[error("Failed to connect to {url}: {source}")]
    Connection {
        /// URL that failed
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status code
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// URL that was requested
        url: String,
        /// Response body (truncated)
        body: String,
    },

    /// The API answered with a body that could not be decoded
    #[error("Invalid response from {url}: {message}")]
    Decode {
        /// URL that was requested
        url: String,
        /// Decoder message
        message: String,
    },

    /// No server matched the given slug, provider or id
    #[error("Server '{0}' not found")]
    NotFound(String),

    /// No token was supplied and none is cached
    #[error("Barndoor user token not provided and none found in store. Run `barndoor login`.")]
    NotAuthenticated,

    /// The token was rejected by the introspection endpoint
    #[error("Token validation failed")]
    InvalidToken,

    /// The registry has no OAuth credentials for the server
    #[error(
        "Server is missing OAuth configuration (client_id / client_secret). Ask an admin to configure credentials before initiating a connection."
    )]
    MissingOAuthConfiguration,

    /// A server connection did not reach `connected` in time
    #[error("OAuth connection for '{server}' was not completed within {}s", .waited.as_secs())]
    ConnectionTimeout {
        /// Server slug or id
        server: String,
        /// How long we polled
        waited: Duration,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// OAuth login or exchange error
    #[error(transparent)]
    Auth(#[from] OAuthError),

    /// Token storage error
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Loopback callback error
    #[error(transparent)]
    Callback(#[from] CallbackError),
}

/// Result type alias for Barndoor SDK operations
pub type Result<T> = std::result::Result<T, BarndoorError>;

impl BarndoorError {
    /// Create a connection error
    pub fn connection(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Connection {
            url: url.into(),
            source,
        }
    }

    /// Create an HTTP status error
    pub fn http(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound(identifier.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for transport-level failures (unreachable, timed out)
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// HTTP status code, if the server answered with one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = BarndoorError::http(404, "https://acme.mcp.barndoor.ai/servers/x", "missing");
        assert_eq!(
            err.to_string(),
            "HTTP 404 from https://acme.mcp.barndoor.ai/servers/x: missing"
        );
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_connection());
    }

    #[test]
    fn test_not_found_display() {
        let err = BarndoorError::not_found("salesforce");
        assert_eq!(err.to_string(), "Server 'salesforce' not found");
    }

    #[test]
    fn test_connection_timeout_display() {
        let err = BarndoorError::ConnectionTimeout {
            server: "notion".to_string(),
            waited: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("within 60s"));
    }

    #[test]
    fn test_wraps_token_error() {
        let err: BarndoorError = TokenError::NoHomeDirectory.into();
        assert!(matches!(err, BarndoorError::Token(_)));
    }
}
