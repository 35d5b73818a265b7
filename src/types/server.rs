//! Server registry DTOs
//!
//! These mirror the API's JSON and are only deserialized, never computed
//! locally. Unknown fields are kept in `extra` so newer API versions do not
//! break older clients.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::identifiers::{ConnectionId, ServerId};

/// Transport name MCP clients expect for Barndoor endpoints
pub const STREAMABLE_HTTP_TRANSPORT: &str = "streamable-http";

// ============================================================================
// Connection Status
// ============================================================================

/// The user's connection state for one server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionStatus {
    /// Server can be connected but is not
    #[default]
    Available,
    /// OAuth flow started, not finished
    Pending,
    /// Ready to use
    Connected,
    /// A status this SDK does not know about
    Other(String),
}

impl ConnectionStatus {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Available => "available",
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::Other(s) => s,
        }
    }

    /// Whether the server is ready to use
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl From<String> for ConnectionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "available" => Self::Available,
            "pending" => Self::Pending,
            "connected" => Self::Connected,
            _ => Self::Other(s),
        }
    }
}

impl From<ConnectionStatus> for String {
    fn from(status: ConnectionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Servers
// ============================================================================

/// Entry of `GET /servers`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSummary {
    /// Registry id
    pub id: ServerId,
    /// Display name
    pub name: String,
    /// URL-safe name, used in MCP paths
    pub slug: String,
    /// Upstream provider (e.g. `salesforce`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// The user's connection state
    #[serde(default)]
    pub connection_status: ConnectionStatus,
    /// Fields not modelled here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ServerSummary {
    /// Slug equal to `identifier`, or provider equal ignoring case
    #[must_use]
    pub fn matches(&self, identifier: &str) -> bool {
        self.slug == identifier
            || self
                .provider
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(identifier))
    }
}

/// Body of `GET /servers/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDetail {
    /// Registry id
    pub id: ServerId,
    /// Display name
    pub name: String,
    /// URL-safe name
    pub slug: String,
    /// Upstream provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// The user's connection state
    #[serde(default)]
    pub connection_status: ConnectionStatus,
    /// Upstream MCP URL, when the registry exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Fields not modelled here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Body of `POST /servers/{id}/connect`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInit {
    /// Id of the connection request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    /// Where the user must go to authorize the connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    /// OAuth state of the upstream flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Fields not modelled here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Body of `GET /servers/{id}/connection`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConnectionStatusResponse {
    pub(crate) status: ConnectionStatus,
}

// ============================================================================
// MCP Connection Parameters
// ============================================================================

/// What an agent framework needs to reach a server over MCP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpConnectionParams {
    /// Endpoint URL
    pub url: String,
    /// Always [`STREAMABLE_HTTP_TRANSPORT`]
    pub transport: String,
    /// Headers to send, `Authorization` included
    pub headers: BTreeMap<String, String>,
}

impl McpConnectionParams {
    /// Streamable-HTTP params with a bearer token
    pub fn streamable_http(url: impl Into<String>, token: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        Self {
            url: url.into(),
            transport: STREAMABLE_HTTP_TRANSPORT.to_string(),
            headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_known_and_unknown() {
        let s: ConnectionStatus = serde_json::from_value(json!("connected")).unwrap();
        assert!(s.is_connected());
        let s: ConnectionStatus = serde_json::from_value(json!("error")).unwrap();
        assert_eq!(s, ConnectionStatus::Other("error".into()));
        assert_eq!(serde_json::to_value(&s).unwrap(), json!("error"));
    }

    #[test]
    fn test_summary_tolerates_extra_fields() {
        let s: ServerSummary = serde_json::from_value(json!({
            "id": "srv-1",
            "name": "Salesforce",
            "slug": "salesforce",
            "provider": "Salesforce",
            "connection_status": "available",
            "created_at": "2025-01-01"
        }))
        .unwrap();
        assert_eq!(s.id.as_str(), "srv-1");
        assert_eq!(s.connection_status, ConnectionStatus::Available);
        assert_eq!(s.extra["created_at"], "2025-01-01");
    }

    #[test]
    fn test_summary_without_provider_or_status() {
        let s: ServerSummary =
            serde_json::from_value(json!({"id": "x", "name": "X", "slug": "x"})).unwrap();
        assert_eq!(s.provider, None);
        assert_eq!(s.connection_status, ConnectionStatus::Available);
    }

    #[test]
    fn test_matches_slug_or_provider() {
        let s: ServerSummary = serde_json::from_value(json!({
            "id": "1", "name": "Notion", "slug": "notion-ws", "provider": "Notion"
        }))
        .unwrap();
        assert!(s.matches("notion-ws"));
        assert!(s.matches("NOTION"));
        assert!(!s.matches("Notion-WS"));
        assert!(!s.matches("github"));
    }

    #[test]
    fn test_connection_init_partial_body() {
        let init: ConnectionInit =
            serde_json::from_value(json!({"auth_url": "https://oauth.test"})).unwrap();
        assert_eq!(init.auth_url.as_deref(), Some("https://oauth.test"));
        assert!(init.connection_id.is_none());
    }

    #[test]
    fn test_mcp_params() {
        let p = McpConnectionParams::streamable_http("https://acme.mcp.barndoor.ai/mcp/sf", "t");
        assert_eq!(p.transport, "streamable-http");
        assert_eq!(p.headers["Authorization"], "Bearer t");
    }
}
