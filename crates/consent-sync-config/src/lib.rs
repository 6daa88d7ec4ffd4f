// crates/consent-sync-config/src/lib.rs
// ============================================================================
// Module: Consent Sync Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for consent-sync.toml semantics.
// Dependencies: consent-sync-core, consent-sync-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `consent-sync-config` defines the configuration model for the consent
//! sync service. Loading is strict and fails closed: unknown keys, oversized
//! files and out-of-range values are rejected with field-qualified messages.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
