//! Utility functions for the Barndoor SDK
//!
//! String helpers used when response bodies and tokens end up in error
//! messages or log lines. All of them respect UTF-8 boundaries, so a body
//! containing emoji or non-ASCII text never panics on truncation.

/// Maximum number of body bytes kept in error messages.
pub const MAX_ERROR_BODY_BYTES: usize = 512;

/// Number of token characters shown by [`mask_token`].
const TOKEN_PREFIX_CHARS: usize = 12;

/// Safely truncate a string at a UTF-8 character boundary.
///
/// Returns a slice of at most `max_bytes` bytes, ensuring the result
/// is valid UTF-8 by finding the last valid character boundary.
///
/// # Example
/// ```
/// use barndoor_sdk::utils::safe_truncate;
///
/// // Emoji is 4 bytes - truncating at byte 10 would cut it in half
/// let text = "Status: 🔍 Active";
/// let result = safe_truncate(text, 10);
/// assert_eq!(result, "Status: "); // Stops before the emoji
/// ```
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    &s[..boundary]
}

/// Truncate a string for display with ellipsis.
///
/// Returns a new String that is at most `max_bytes` long (plus ellipsis),
/// with "..." appended if truncation occurred.
///
/// # Example
/// ```
/// use barndoor_sdk::utils::truncate_for_display;
///
/// let text = "This is a long message";
/// let result = truncate_for_display(text, 10);
/// assert_eq!(result, "This is a ...");
/// ```
#[must_use]
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    let truncated = safe_truncate(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

/// Shorten a response body before it goes into an error message.
#[must_use]
pub fn truncate_body(body: &str) -> String {
    truncate_for_display(body.trim(), MAX_ERROR_BODY_BYTES)
}

/// Render a bearer token for humans without revealing it.
///
/// Keeps a short prefix so two tokens can be told apart in CLI output.
///
/// # Example
/// ```
/// use barndoor_sdk::utils::mask_token;
///
/// assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9.payload.sig"), "eyJhbGciOiJI...");
/// assert_eq!(mask_token("short"), "*****");
/// ```
#[must_use]
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= TOKEN_PREFIX_CHARS {
        return "*".repeat(token.chars().count());
    }
    let prefix: String = token.chars().take(TOKEN_PREFIX_CHARS).collect();
    format!("{prefix}...")
}

/// Percent-encode everything except RFC 3986 unreserved characters.
///
/// Safe for query values and single path segments alike.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("srv-notion_1.x~"), "srv-notion_1.x~");
        assert_eq!(percent_encode("openid profile"), "openid%20profile");
        assert_eq!(percent_encode("a/../b?c#d"), "a%2F..%2Fb%3Fc%23d");
        assert_eq!(
            percent_encode("http://localhost:52765/callback"),
            "http%3A%2F%2Flocalhost%3A52765%2Fcallback"
        );
        assert_eq!(percent_encode("café"), "caf%C3%A9");
    }

    #[test]
    fn test_safe_truncate_ascii() {
        let text = "Hello, World!";
        assert_eq!(safe_truncate(text, 7), "Hello, ");
        assert_eq!(safe_truncate(text, 100), text);
        assert_eq!(safe_truncate(text, 0), "");
    }

    #[test]
    fn test_safe_truncate_multibyte() {
        // 'é' is 2 bytes in UTF-8
        let text = "Café";
        assert_eq!(safe_truncate(text, 4), "Caf");
        assert_eq!(safe_truncate(text, 5), "Café");
    }

    #[test]
    fn test_truncate_for_display_emoji() {
        let text = "Hello 🌍 World";
        assert_eq!(truncate_for_display(text, 7), "Hello ...");
        assert_eq!(truncate_for_display(text, 100), text);
    }

    #[test]
    fn test_truncate_body_limits_length() {
        let body = "x".repeat(MAX_ERROR_BODY_BYTES * 2);
        let out = truncate_body(&body);
        assert_eq!(out.len(), MAX_ERROR_BODY_BYTES + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_body_trims_whitespace() {
        assert_eq!(truncate_body("  {\"error\":\"x\"}\n"), "{\"error\":\"x\"}");
    }

    #[test]
    fn test_mask_token_hides_tail() {
        let token = "eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJ0ZXN0In0.sig";
        let masked = mask_token(token);
        assert_eq!(masked, "eyJ0eXAiOiJK...");
        assert!(!masked.contains("sig"));
    }

    #[test]
    fn test_mask_token_short_and_empty() {
        assert_eq!(mask_token("abc"), "***");
        assert_eq!(mask_token(""), "");
    }
}
