// crates/consent-sync-providers/tests/common/mod.rs
// ============================================================================
// Module: Provider Test Helpers
// Description: Scripted local HTTP server for provider client tests.
// Purpose: Record outbound requests and replay canned responses.
// Dependencies: tiny_http
// ============================================================================

//! ## Overview
//! [`StubServer`] binds an ephemeral loopback port, answers each request
//! with the next queued [`StubReply`], and records what it received. Calling
//! [`StubServer::finish`] joins the server thread and returns the requests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::io::Read;
use std::thread;
use std::time::Duration;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

/// Canned response.
#[derive(Debug, Clone)]
pub struct StubReply {
    /// HTTP status.
    pub status: u16,
    /// JSON body text.
    pub body: String,
}

impl StubReply {
    /// Builds a reply.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Request observed by the stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Path and query.
    pub url: String,
    /// Headers keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
    /// Request body text.
    pub body: String,
}

impl RecordedRequest {
    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Local server answering from a reply queue.
pub struct StubServer {
    /// Base URL (`http://127.0.0.1:port`).
    pub base_url: String,
    /// Server thread.
    handle: thread::JoinHandle<Vec<RecordedRequest>>,
}

impl StubServer {
    /// Starts a server that answers `replies` in order, then stops.
    pub fn start(replies: Vec<StubReply>) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let base_url = format!("http://{addr}");
        let handle = thread::spawn(move || {
            let mut queue: VecDeque<StubReply> = replies.into();
            let mut seen = Vec::new();
            while let Some(reply) = queue.pop_front() {
                let Ok(Some(mut request)) = server.recv_timeout(Duration::from_secs(5)) else {
                    break;
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let headers = request
                    .headers()
                    .iter()
                    .map(|header| {
                        (
                            header.field.as_str().as_str().to_ascii_lowercase(),
                            header.value.as_str().to_string(),
                        )
                    })
                    .collect();
                seen.push(RecordedRequest {
                    method: request.method().as_str().to_string(),
                    url: request.url().to_string(),
                    headers,
                    body,
                });
                let content_type =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                let response = Response::from_string(reply.body)
                    .with_status_code(reply.status)
                    .with_header(content_type);
                let _ = request.respond(response);
            }
            seen
        });
        Self {
            base_url,
            handle,
        }
    }

    /// Waits for the server thread and returns the recorded requests.
    pub fn finish(self) -> Vec<RecordedRequest> {
        self.handle.join().unwrap()
    }
}
