// crates/consent-sync-core/src/lib.rs
// ============================================================================
// Module: Consent Sync Core Library
// Description: Public API surface for the consent reconciliation core.
// Purpose: Expose core types, interfaces, and runtime services.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Consent sync keeps one authoritative email-marketing consent state per
//! customer and shop, reconciles it against checkout activity and platform
//! webhooks, and pushes the result to the commerce platform and the email
//! provider. The core is transport-agnostic: stores, platform clients, and
//! email providers plug in through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::Clock;
pub use interfaces::CommercePlatform;
pub use interfaces::ConsentMutation;
pub use interfaces::ConsentStore;
pub use interfaces::CustomerResolution;
pub use interfaces::EmailProvider;
pub use interfaces::EmailProviderError;
pub use interfaces::LookupDetail;
pub use interfaces::NoopSyncLogSink;
pub use interfaces::NullRegionLocator;
pub use interfaces::PlatformError;
pub use interfaces::ProfileAttributes;
pub use interfaces::ProfileLookup;
pub use interfaces::ProviderConsent;
pub use interfaces::ProviderProfile;
pub use interfaces::ProviderSubscription;
pub use interfaces::RegionLocator;
pub use interfaces::SessionIdGenerator;
pub use interfaces::StoreError;
pub use interfaces::SyncLogEvent;
pub use interfaces::SyncLogLevel;
pub use interfaces::SyncLogSink;
pub use runtime::EmailListConfig;
pub use runtime::EngineConfig;
pub use runtime::EngineError;
pub use runtime::EngineParts;
pub use runtime::InMemoryConsentStore;
pub use runtime::ManualClock;
pub use runtime::PolicyResolver;
pub use runtime::PolicyRule;
pub use runtime::ReconcileReport;
pub use runtime::ReconciliationEngine;
pub use runtime::SessionGrant;
pub use runtime::SharedConsentStore;
pub use runtime::SystemClock;
pub use runtime::ToggleReport;
