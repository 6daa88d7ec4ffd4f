// crates/consent-sync-providers/src/lib.rs
// ============================================================================
// Module: Consent Sync Providers
// Description: Outbound API clients and static lookup tables.
// Purpose: Implement the platform, email, and region seams of consent-sync-core.
// Dependencies: consent-sync-core, reqwest, serde, serde_json, toml, url
// ============================================================================

//! ## Overview
//! This crate ships the adapters the reconciliation runtime reaches through
//! its interfaces:
//! - [`AdminApiPlatform`]: commerce platform GraphQL admin API client.
//! - [`JsonApiEmailProvider`]: email provider JSON:API client.
//! - [`GeoIpTable`]: CIDR to region table used as a region locator.
//! - [`load_policy_table`]: policy rows read from TOML.
//!
//! Clients are blocking, never follow redirects, and bound response sizes.
//! Remote payloads are untrusted and are decoded defensively.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod admin_api;
pub mod geoip;
pub mod http;
pub mod json_api;
pub mod policy_table;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use admin_api::AdminApiConfig;
pub use admin_api::AdminApiPlatform;
pub use geoip::GeoIpError;
pub use geoip::GeoIpTable;
pub use http::DEFAULT_USER_AGENT;
pub use json_api::JsonApiConfig;
pub use json_api::JsonApiEmailProvider;
pub use policy_table::PolicyTable;
pub use policy_table::PolicyTableError;
pub use policy_table::load_policy_table;
pub use policy_table::parse_policy_table;
