// crates/consent-sync-providers/src/http.rs
// ============================================================================
// Module: Shared HTTP Plumbing
// Description: Client construction and bounded response reads.
// Purpose: Give every outbound client the same timeout and size limits.
// Dependencies: reqwest
// ============================================================================

//! ## Overview
//! Both API clients build their [`Client`] here and execute requests through
//! [`execute`], which reads at most `max_bytes` of the body. Redirects are
//! never followed; a redirect status is returned to the caller as-is.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// User agent sent on outbound requests.
pub const DEFAULT_USER_AGENT: &str = "consent-sync/0.1";
/// Default response size limit.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Raw reply from a remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body, bounded by the caller's limit.
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true for statuses worth retrying later (429 and 5xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.status == 429 || self.status >= 500
    }

    /// Returns the body as lossy UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a blocking client with a total timeout and redirects disabled.
///
/// # Errors
///
/// Returns a message when the client cannot be built.
pub fn build_http_client(timeout_ms: u64, user_agent: &str) -> Result<Client, String> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .user_agent(user_agent.to_string())
        .redirect(Policy::none())
        .build()
        .map_err(|err| format!("http client build failed: {err}"))
}

/// Sends a request and reads its body within `max_bytes`.
///
/// # Errors
///
/// Returns a message for transport failures and oversized or truncated bodies.
pub fn execute(request: RequestBuilder, max_bytes: usize) -> Result<HttpReply, String> {
    let mut response = request.send().map_err(|err| format!("http request failed: {err}"))?;
    let status = response.status().as_u16();
    let body = read_response_limited(&mut response, max_bytes)?;
    Ok(HttpReply {
        status,
        body,
    })
}

/// Reads the response body while enforcing a byte limit.
fn read_response_limited(response: &mut Response, max_bytes: usize) -> Result<Vec<u8>, String> {
    let expected_len = response.content_length();
    let max_bytes_u64 =
        u64::try_from(max_bytes).map_err(|_| "response size limit exceeds u64".to_string())?;
    if let Some(expected) = expected_len
        && expected > max_bytes_u64
    {
        return Err("http response exceeds size limit".to_string());
    }
    let mut buf = Vec::new();
    let mut handle = response.take(max_bytes_u64.saturating_add(1));
    handle.read_to_end(&mut buf).map_err(|err| format!("failed to read response: {err}"))?;
    if buf.len() > max_bytes {
        return Err("http response exceeds size limit".to_string());
    }
    Ok(buf)
}
