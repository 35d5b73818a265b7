//! One-shot loopback listener that captures the OAuth redirect
//!
//! [`start_local_callback_server`] binds `localhost:<port>` and hands back the
//! redirect URI together with a [`PendingCallback`]. The first request to
//! `/callback` settles the login attempt; the socket is closed as soon as the
//! pending callback resolves, times out, or is dropped.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

/// Port registered with the provider for the loopback redirect
pub const DEFAULT_CALLBACK_PORT: u16 = 52765;

/// Path the provider redirects to
pub const CALLBACK_PATH: &str = "/callback";

/// Upper bound on the request head we are willing to buffer
const MAX_REQUEST_BYTES: usize = 8192;

/// How long a single connection may take to send its request line
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept()` so fd exhaustion does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

const SUCCESS_HTML: &str = "<!DOCTYPE html><html><head><title>Barndoor login</title></head>\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4rem;\">\
<h1>Login successful</h1><p>You can close this window and return to your terminal.</p>\
</body></html>";

/// Errors produced while waiting for the OAuth redirect
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The callback port could not be bound (usually: already in use)
    #[error("Could not bind callback listener on localhost:{port}: {source}")]
    Bind {
        /// Requested port
        port: u16,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The redirect lacked a required query parameter
    #[error("Callback is missing the '{0}' parameter")]
    MissingParameter(&'static str),

    /// The provider redirected back with an error instead of a code
    #[error("Authorization failed: {error}{}", .description.as_deref().map(|d| format!(" - {d}")).unwrap_or_default())]
    Provider {
        /// OAuth error code (e.g. `access_denied`)
        error: String,
        /// Optional human readable description
        description: Option<String>,
    },

    /// The returned state does not match the one we sent
    #[error("Callback state mismatch")]
    StateMismatch,

    /// No redirect arrived in time
    #[error("No OAuth callback received within {}s", .0.as_secs())]
    Timeout(Duration),

    /// The listener task ended without producing a result
    #[error("Callback listener stopped unexpectedly")]
    Closed,
}

/// Authorization code and state captured from the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    /// Authorization code
    pub code: String,
    /// State parameter echoed by the provider
    pub state: String,
}

/// Handle to an in-flight callback capture
///
/// Owns the listener task. Dropping it aborts the task, which closes the
/// socket; [`PendingCallback::cancel`] does the same and waits until the port
/// is released.
#[derive(Debug)]
pub struct PendingCallback {
    port: u16,
    handle: JoinHandle<Result<CallbackResult, CallbackError>>,
}

impl PendingCallback {
    /// Port the listener is bound to
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the redirect, giving up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns `CallbackError::Timeout` if nothing arrives in time, or the
    /// error the redirect itself carried.
    pub async fn wait(mut self, timeout: Duration) -> Result<CallbackResult, CallbackError> {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!("Callback listener task failed: {e}");
                Err(CallbackError::Closed)
            }
            Err(_) => {
                tracing::debug!(port = self.port, "Callback wait timed out");
                self.shutdown().await;
                Err(CallbackError::Timeout(timeout))
            }
        }
    }

    /// Abandon the login attempt and release the port
    pub async fn cancel(mut self) {
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Bind the loopback listener and return `(redirect_uri, pending)`
///
/// Port `0` picks a free ephemeral port; the redirect URI reflects the port
/// actually bound. A second login on the same port fails fast with
/// `CallbackError::Bind`.
///
/// # Errors
///
/// Returns `CallbackError::Bind` if `127.0.0.1:<port>` cannot be bound.
pub async fn start_local_callback_server(
    port: u16,
) -> Result<(String, PendingCallback), CallbackError> {
    let listener_v4 = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|source| CallbackError::Bind { port, source })?;
    let port = listener_v4
        .local_addr()
        .map_err(|source| CallbackError::Bind { port, source })?
        .port();

    // Browsers may resolve `localhost` to ::1 first; listen there too when possible.
    let listener_v6 = match TcpListener::bind(("::1", port)).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::debug!(port, "IPv6 loopback not bound: {e}");
            None
        }
    };

    let redirect_uri = format!("http://localhost:{port}{CALLBACK_PATH}");
    tracing::info!(%redirect_uri, "OAuth callback listener ready");

    let handle = tokio::spawn(serve_until_callback(listener_v4, listener_v6));
    Ok((redirect_uri, PendingCallback { port, handle }))
}

/// Accept connections until one of them settles the callback.
///
/// Connections are handled concurrently so an idle browser preconnect cannot
/// hold up the real redirect. Both listeners and all connection tasks are
/// dropped when this returns.
async fn serve_until_callback(
    listener_v4: TcpListener,
    listener_v6: Option<TcpListener>,
) -> Result<CallbackResult, CallbackError> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = accept_any(&listener_v4, listener_v6.as_ref()) => {
                match accepted_socket(accepted) {
                    Some(socket) => {
                        connections.spawn(handle_connection(socket));
                    }
                    None => tokio::time::sleep(ACCEPT_BACKOFF).await,
                }
            }
            Some(joined) = connections.join_next() => {
                match joined {
                    Ok(Some(outcome)) => return outcome,
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Callback connection task failed: {e}"),
                }
            }
        }
    }
}

/// A failed `accept()` (peer reset, fd exhaustion) only loses that connection
fn accepted_socket(accepted: io::Result<(TcpStream, SocketAddr)>) -> Option<TcpStream> {
    match accepted {
        Ok((socket, peer)) => {
            tracing::debug!(%peer, "Callback connection accepted");
            Some(socket)
        }
        Err(e) => {
            tracing::warn!("Callback accept failed, still listening: {e}");
            None
        }
    }
}

async fn accept_any(
    v4: &TcpListener,
    v6: Option<&TcpListener>,
) -> io::Result<(TcpStream, SocketAddr)> {
    match v6 {
        Some(v6) => tokio::select! {
            result = v4.accept() => result,
            result = v6.accept() => result,
        },
        None => v4.accept().await,
    }
}

/// What a single request means for the login attempt
#[derive(Debug)]
enum Route {
    /// A redirect to the callback path; settles the attempt
    Callback(Result<CallbackResult, CallbackError>),
    /// Anything else (favicon, probes); answered with 404
    NotFound,
}

/// Serve one connection. `Some` when it settled the callback.
async fn handle_connection(mut socket: TcpStream) -> Option<Result<CallbackResult, CallbackError>> {
    let head = match tokio::time::timeout(READ_TIMEOUT, read_request_head(&mut socket)).await {
        Ok(Ok(head)) if !head.is_empty() => head,
        Ok(Ok(_)) => return None,
        Ok(Err(e)) => {
            tracing::debug!("Callback read failed: {e}");
            return None;
        }
        Err(_) => {
            tracing::debug!("Callback connection sent nothing; dropping it");
            return None;
        }
    };

    let route = match request_target(&head).and_then(route_target) {
        Ok(route) => route,
        Err(reason) => {
            tracing::debug!("Ignoring malformed callback request: {reason}");
            write_response(&mut socket, "400 Bad Request", &failure_page(&reason)).await;
            return None;
        }
    };

    match route {
        Route::NotFound => {
            write_response(&mut socket, "404 Not Found", "").await;
            None
        }
        Route::Callback(Ok(result)) => {
            write_response(&mut socket, "200 OK", SUCCESS_HTML).await;
            tracing::info!("OAuth callback received");
            Some(Ok(result))
        }
        Route::Callback(Err(error)) => {
            write_response(&mut socket, "400 Bad Request", &failure_page(&error.to_string())).await;
            tracing::warn!("OAuth callback rejected: {error}");
            Some(Err(error))
        }
    }
}

async fn read_request_head(socket: &mut TcpStream) -> io::Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

async fn write_response(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        tracing::debug!("Could not write callback response: {e}");
    }
    let _ = socket.shutdown().await;
}

/// Extract the request target from a GET request line
fn request_target(head: &str) -> Result<&str, String> {
    let line = head
        .lines()
        .next()
        .ok_or_else(|| "empty request".to_string())?;
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" {
        return Err(format!("unsupported method '{method}'"));
    }
    if !target.starts_with('/') {
        return Err("invalid request target".to_string());
    }
    Ok(target)
}

fn parse_callback_url(target: &str) -> Result<Url, String> {
    Url::parse(&format!("http://localhost{target}")).map_err(|e| format!("invalid request target: {e}"))
}

fn route_target(target: &str) -> Result<Route, String> {
    let url = parse_callback_url(target)?;
    if url.path() != CALLBACK_PATH {
        return Ok(Route::NotFound);
    }
    Ok(Route::Callback(callback_outcome(&url)))
}

/// Interpret the query string of a callback URL
fn callback_outcome(url: &Url) -> Result<CallbackResult, CallbackError> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(CallbackError::Provider {
            error,
            description: error_description,
        });
    }

    let code = code
        .filter(|c| !c.is_empty())
        .ok_or(CallbackError::MissingParameter("code"))?;
    let state = state
        .filter(|s| !s.is_empty())
        .ok_or(CallbackError::MissingParameter("state"))?;

    Ok(CallbackResult { code, state })
}

fn failure_page(reason: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Barndoor login</title></head>\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4rem;\">\
<h1>Login failed</h1><p>{}</p><p>You can close this window and try again.</p>\
</body></html>",
        escape_html(reason)
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(target: &str) -> Result<CallbackResult, CallbackError> {
        callback_outcome(&parse_callback_url(target).unwrap())
    }

    #[test]
    fn test_callback_outcome_extracts_code_and_state() {
        let result = outcome("/callback?code=ABC123&state=xyz").unwrap();
        assert_eq!(
            result,
            CallbackResult {
                code: "ABC123".to_string(),
                state: "xyz".to_string(),
            }
        );
    }

    #[test]
    fn test_callback_outcome_decodes_percent_encoding() {
        let result = outcome("/callback?code=a%2Fb%2Bc&state=s%20t").unwrap();
        assert_eq!(result.code, "a/b+c");
        assert_eq!(result.state, "s t");
    }

    #[test]
    fn test_callback_outcome_missing_code() {
        let err = outcome("/callback?state=xyz").unwrap_err();
        assert!(matches!(err, CallbackError::MissingParameter("code")));
    }

    #[test]
    fn test_callback_outcome_missing_state() {
        let err = outcome("/callback?code=abc").unwrap_err();
        assert!(matches!(err, CallbackError::MissingParameter("state")));
    }

    #[test]
    fn test_callback_outcome_provider_error() {
        let err = outcome("/callback?error=access_denied&error_description=nope&state=xyz")
            .unwrap_err();
        match err {
            CallbackError::Provider { error, description } => {
                assert_eq!(error, "access_denied");
                assert_eq!(description.as_deref(), Some("nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failed_accept_is_skipped() {
        let reset = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert!(accepted_socket(Err(reset)).is_none());
    }

    #[tokio::test]
    async fn test_aborted_connections_do_not_end_the_attempt() {
        let (redirect_uri, pending) = start_local_callback_server(0).await.unwrap();
        let addr = ("127.0.0.1", pending.port());

        for _ in 0..3 {
            drop(TcpStream::connect(addr).await.unwrap());
        }

        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket
            .write_all(b"GET /callback?code=c1&state=s1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let result = pending.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.code, "c1");
        assert!(redirect_uri.ends_with(CALLBACK_PATH));
    }

    #[test]
    fn test_route_other_paths_are_not_found() {
        assert!(matches!(route_target("/favicon.ico"), Ok(Route::NotFound)));
        assert!(matches!(
            route_target("/callback/extra?code=a&state=b"),
            Ok(Route::NotFound)
        ));
        assert!(matches!(
            route_target("/callback?code=a&state=b"),
            Ok(Route::Callback(Ok(_)))
        ));
    }

    #[test]
    fn test_request_target_requires_get() {
        assert_eq!(
            request_target("GET /callback?code=a HTTP/1.1\r\nHost: x\r\n\r\n").unwrap(),
            "/callback?code=a"
        );
        assert!(request_target("POST /callback HTTP/1.1\r\n\r\n").is_err());
        assert!(request_target("").is_err());
        assert!(request_target("GET http://evil/ HTTP/1.1").is_err());
    }

    #[test]
    fn test_failure_page_escapes_html() {
        let page = failure_page("<script>alert('x')</script>");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = CallbackError::Provider {
            error: "access_denied".to_string(),
            description: Some("User cancelled".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Authorization failed: access_denied - User cancelled"
        );
        let err = CallbackError::Provider {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "Authorization failed: access_denied");
    }
}
