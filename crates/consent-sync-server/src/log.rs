// crates/consent-sync-server/src/log.rs
// ============================================================================
// Module: Operational Log Sinks
// Description: JSON-lines sinks for sync outcomes and HTTP access events.
// Purpose: Give operators enough context to reconcile failures by hand.
// Dependencies: consent-sync-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Sinks write one JSON object per line. The same sink types carry both the
//! runtime's [`SyncLogEvent`] entries and the server's [`HttpAuditEvent`]
//! entries. A sink never fails its caller: serialization or write errors
//! drop the entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use consent_sync_core::NoopSyncLogSink;
use consent_sync_core::SyncLogEvent;
use consent_sync_core::SyncLogSink;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Access log entry for one HTTP request.
#[derive(Debug, Clone, Serialize)]
pub struct HttpAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Route label.
    pub route: &'static str,
    /// Response status code.
    pub status: u16,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Shop named by the request, when known.
    pub shop: Option<String>,
    /// Short failure label for non-2xx responses.
    pub error_kind: Option<&'static str>,
}

impl HttpAuditEvent {
    /// Creates an access event for a route.
    #[must_use]
    pub const fn new(timestamp_ms: i64, route: &'static str, request_bytes: usize) -> Self {
        Self {
            event: "http_request",
            timestamp_ms,
            route,
            status: 200,
            request_bytes,
            peer_ip: None,
            shop: None,
            error_kind: None,
        }
    }
}

/// Sink for HTTP access events.
pub trait HttpAuditSink: Send + Sync {
    /// Records an access event.
    fn record_http(&self, event: &HttpAuditEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that writes JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrLogSink;

impl SyncLogSink for StderrLogSink {
    fn record(&self, event: &SyncLogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl HttpAuditSink for StderrLogSink {
    fn record_http(&self, event: &HttpAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileLogSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileLogSink {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized entry and flushes.
    fn append(&self, event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl SyncLogSink for FileLogSink {
    fn record(&self, event: &SyncLogEvent) {
        self.append(event);
    }
}

impl HttpAuditSink for FileLogSink {
    fn record_http(&self, event: &HttpAuditEvent) {
        self.append(event);
    }
}

impl HttpAuditSink for NoopSyncLogSink {
    fn record_http(&self, _event: &HttpAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
