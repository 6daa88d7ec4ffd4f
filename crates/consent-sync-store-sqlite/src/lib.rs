// crates/consent-sync-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Consent Store
// Description: Durable ConsentStore backend using SQLite.
// Purpose: Persist consent rows, checkout sessions, and the audit log.
// Dependencies: consent-sync-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`ConsentStore`] so that consent
//! state, suppression fences, and checkout sessions survive restarts and are
//! shared by every process pointed at the same database file.
//!
//! [`ConsentStore`]: consent_sync_core::ConsentStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteConsentStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
