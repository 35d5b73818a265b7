//! Unverified JWT claim reading
//!
//! The token was obtained through our own exchange or a validated cache, so
//! the signature is not checked here; only the payload is decoded to find
//! which organization the user belongs to.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use thiserror::Error;

/// Decoded JWT payload
pub type Claims = serde_json::Map<String, Value>;

/// Reasons a token payload could not be read
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// Not three dot-separated segments
    #[error("token is not a JWT")]
    Malformed,

    /// Payload segment is not base64url
    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Payload is not a JSON object
    #[error("token payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

/// One way of finding the organization in a claim set
type Extractor = fn(&Claims) -> Option<String>;

/// Claim shapes, in priority order. Earlier entries win.
const ORGANIZATION_EXTRACTORS: &[(&str, Extractor)] = &[
    ("flat", flat_organization),
    ("user", user_organization),
    ("org", org_organization),
];

const FLAT_KEYS: &[&str] = &["organization_name", "organization_id", "org_name", "org_id"];
const USER_KEYS: &[&str] = &["organization_name", "organization_id"];
const ORG_KEYS: &[&str] = &["name", "id"];

/// Decode the payload of a JWT without verifying its signature
///
/// # Errors
///
/// Returns an error if the token is not a `header.payload.signature` triple,
/// or the payload is not a base64url-encoded JSON object.
pub fn decode_unverified_claims(token: &str) -> Result<Claims, ClaimsError> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Find the organization identifier in a claim set
#[must_use]
pub fn organization_from_claims(claims: &Claims) -> Option<String> {
    ORGANIZATION_EXTRACTORS.iter().find_map(|(shape, extract)| {
        let found = extract(claims);
        if let Some(ref org) = found {
            tracing::debug!(shape, organization = %org, "Organization found in token claims");
        }
        found
    })
}

/// Decode a token and find its organization; `None` if either step fails
#[must_use]
pub fn organization_from_token(token: &str) -> Option<String> {
    match decode_unverified_claims(token) {
        Ok(claims) => organization_from_claims(&claims),
        Err(e) => {
            tracing::debug!("Ignoring undecodable token claims: {e}");
            None
        }
    }
}

fn first_string(object: &Claims, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn flat_organization(claims: &Claims) -> Option<String> {
    first_string(claims, FLAT_KEYS)
}

fn user_organization(claims: &Claims) -> Option<String> {
    claims
        .get("user")
        .and_then(Value::as_object)
        .and_then(|user| first_string(user, USER_KEYS))
}

fn org_organization(claims: &Claims) -> Option<String> {
    match claims.get("org")? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Object(org) => first_string(org, ORG_KEYS),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Unsigned JWT carrying `claims`
    pub(crate) fn jwt(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    fn org(claims: Value) -> Option<String> {
        organization_from_token(&jwt(&claims))
    }

    #[test]
    fn test_decode_claims() {
        let claims = decode_unverified_claims(&jwt(&json!({"sub": "u1"}))).unwrap();
        assert_eq!(claims["sub"], "u1");
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"u"}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(decode_unverified_claims(&token).unwrap()["sub"], "u");
    }

    #[test]
    fn test_decode_rejects_non_jwt() {
        assert!(matches!(
            decode_unverified_claims("opaque-token"),
            Err(ClaimsError::Malformed)
        ));
        assert!(matches!(
            decode_unverified_claims("a.b.c.d"),
            Err(ClaimsError::Malformed)
        ));
        assert!(matches!(
            decode_unverified_claims("a.!!!.c"),
            Err(ClaimsError::Base64(_))
        ));
        let not_object = format!("h.{}.s", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(matches!(
            decode_unverified_claims(&not_object),
            Err(ClaimsError::Json(_))
        ));
    }

    #[test]
    fn test_user_organization_name() {
        assert_eq!(
            org(json!({"user": {"organization_name": "acme"}})).as_deref(),
            Some("acme")
        );
    }

    #[test]
    fn test_flat_key_beats_user() {
        let claims = json!({
            "organization_id": "flat-org",
            "user": {"organization_name": "user-org"},
            "org": {"name": "org-object"}
        });
        assert_eq!(org(claims).as_deref(), Some("flat-org"));
    }

    #[test]
    fn test_user_beats_org_object() {
        let claims = json!({
            "user": {"organization_id": "user-org"},
            "org": {"name": "org-object"}
        });
        assert_eq!(org(claims).as_deref(), Some("user-org"));
    }

    #[test]
    fn test_org_object_and_string() {
        assert_eq!(
            org(json!({"org": {"id": "org-123"}})).as_deref(),
            Some("org-123")
        );
        assert_eq!(
            org(json!({"org": {"name": "named", "id": "org-123"}})).as_deref(),
            Some("named")
        );
        assert_eq!(org(json!({"org": "test-org"})).as_deref(), Some("test-org"));
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let claims = json!({
            "organization_name": "",
            "user": {"organization_name": "  "},
            "org": {"name": "fallback"}
        });
        assert_eq!(org(claims).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_no_organization() {
        assert_eq!(org(json!({"sub": "u1", "user": {"email": "a@b.c"}})), None);
        assert_eq!(org(json!({"org": 42})), None);
        assert_eq!(organization_from_token("not-a-jwt"), None);
    }
}
