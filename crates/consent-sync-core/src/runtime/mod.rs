// crates/consent-sync-core/src/runtime/mod.rs
// ============================================================================
// Module: Consent Sync Runtime
// Description: Reconciliation engine, synchronizers, and in-memory helpers.
// Purpose: Turn normalized consent signals into stored state and upstream pushes.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules hold the policy resolver, the suppression fence, both
//! upstream synchronizers, and the reconciliation engine that ties them
//! together. Every surface (HTTP, CLI bulk sync) calls into the same engine so
//! ordering and echo suppression behave identically everywhere.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod clock;
pub mod commerce_sync;
pub mod email_sync;
pub mod engine;
pub mod fence;
pub mod policy;
pub mod profile_lookup;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::ManualClock;
pub use clock::SystemClock;
pub use commerce_sync::CommercePush;
pub use commerce_sync::CommerceSynchronizer;
pub use commerce_sync::PushOutcome;
pub use email_sync::EmailListConfig;
pub use email_sync::EmailListSynchronizer;
pub use email_sync::EmailSync;
pub use email_sync::EmailSyncOutcome;
pub use email_sync::EmailSyncReport;
pub use engine::EngineConfig;
pub use engine::EngineError;
pub use engine::EngineParts;
pub use engine::ReconcileReport;
pub use engine::ReconciliationEngine;
pub use engine::SessionGrant;
pub use engine::ToggleReport;
pub use fence::DEFAULT_FENCE_TTL;
pub use fence::FenceVerdict;
pub use fence::MAX_FENCE_TTL;
pub use fence::MIN_FENCE_TTL;
pub use fence::SuppressionFence;
pub use policy::DEFAULT_POLICY_REGION;
pub use policy::PolicyDecision;
pub use policy::PolicyMatch;
pub use policy::PolicyResolver;
pub use policy::PolicyRule;
pub use profile_lookup::FixedProfileLookup;
pub use profile_lookup::TieredProfileLookup;
pub use store::InMemoryConsentStore;
pub use store::SharedConsentStore;
