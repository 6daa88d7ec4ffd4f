// crates/consent-sync-core/src/core/mod.rs
// ============================================================================
// Module: Consent Sync Core Types
// Description: Canonical consent records, identifiers, and signal types.
// Purpose: Provide stable, serializable types shared by stores and surfaces.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Core types describe stored consent, checkout sessions, audit events, and the
//! normalized signals the engine consumes. They are the canonical source of
//! truth for the HTTP surface, the `SQLite` store, and the CLI.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod consent;
pub mod identifiers;
pub mod identity;
pub mod records;
pub mod signals;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use consent::ConfirmationStrength;
pub use consent::ConsentEventKind;
pub use consent::ConsentEvidence;
pub use consent::ConsentStatus;
pub use consent::CustomerSegment;
pub use consent::EventEffect;
pub use consent::PresentationMode;
pub use consent::SuppressionOverride;
pub use identifiers::CheckoutToken;
pub use identifiers::CustomerId;
pub use identifiers::CustomerIdentity;
pub use identifiers::CustomerKey;
pub use identifiers::EmailAddress;
pub use identifiers::EventId;
pub use identifiers::OrderId;
pub use identifiers::RegionCode;
pub use identifiers::SessionId;
pub use identifiers::ShopDomain;
pub use identity::IdentityPlan;
pub use identity::plan_identity;
pub use records::CheckoutSession;
pub use records::ConsentEvent;
pub use records::CustomerConsentRecord;
pub use records::CustomerDraft;
pub use records::EventInsert;
pub use records::FenceMarker;
pub use records::NewConsentEvent;
pub use records::OrderLink;
pub use records::PruneReport;
pub use records::SessionOpen;
pub use records::StatusWrite;
pub use records::WriteOutcome;
pub use signals::ConsentSignal;
pub use signals::OrderSignal;
pub use signals::PolicyRequest;
pub use signals::ProfileSignal;
pub use signals::ProfileTraits;
pub use signals::Signal;
pub use signals::ToggleSignal;
pub use time::Timestamp;
pub use time::TimestampError;
