// crates/consent-sync-server/src/lib.rs
// ============================================================================
// Module: Consent Sync Server
// Description: HTTP surface and process wiring for consent reconciliation.
// Purpose: Expose storefront and webhook endpoints over the engine.
// Dependencies: axum, consent-sync-config, consent-sync-core,
//               consent-sync-providers, consent-sync-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! - [`bootstrap`]: builds the engine, store, clients, and sinks from config.
//! - [`server`]: axum routes for the storefront widget and webhooks.
//! - [`webhook`]: signature checks and webhook payload decoding.
//! - [`storefront`]: storefront request decoding.
//! - [`log`]: JSON-lines sinks for sync outcomes and access events.
//!
//! Inbound requests are untrusted: bodies are size-bounded, webhooks are
//! authenticated before decoding, and unknown shops are rejected.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bootstrap;
pub mod log;
pub mod server;
pub mod storefront;
pub mod webhook;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bootstrap::ConsentEngine;
pub use bootstrap::LogSinks;
pub use bootstrap::RandomSessionIds;
pub use bootstrap::build_engine;
pub use log::FileLogSink;
pub use log::HttpAuditEvent;
pub use log::HttpAuditSink;
pub use log::StderrLogSink;
pub use server::AppState;
pub use server::ServerError;
pub use server::ServerSettings;
pub use server::router;
pub use server::serve;
pub use server::serve_listener;
pub use webhook::WebhookError;
pub use webhook::WebhookTopic;
pub use webhook::sign_body;
pub use webhook::verify_signature;
