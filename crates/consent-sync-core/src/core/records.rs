// crates/consent-sync-core/src/core/records.rs
// ============================================================================
// Module: Consent Sync Records
// Description: Customer consent rows, checkout sessions, and audit events.
// Purpose: Define persisted consent state and the rule for writing it.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`CustomerConsentRecord`] is the single current consent state for one
//! customer in one shop. It changes only through
//! [`CustomerConsentRecord::apply`], which enforces event-time ordering:
//! a write older than the stored state is stale, and a write at the same
//! instant loses to a stored write from a higher-precedence source.
//! Every stored implementation must route writes through `apply` so the rule
//! holds identically for each backend.
//!
//! [`ConsentEvent`] rows are append-only. [`CheckoutSession`] rows are
//! immutable after an order is linked.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::consent::ConsentEventKind;
use crate::core::consent::ConsentStatus;
use crate::core::consent::EventEffect;
use crate::core::consent::PresentationMode;
use crate::core::identifiers::CheckoutToken;
use crate::core::identifiers::CustomerId;
use crate::core::identifiers::CustomerKey;
use crate::core::identifiers::EmailAddress;
use crate::core::identifiers::EventId;
use crate::core::identifiers::OrderId;
use crate::core::identifiers::RegionCode;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::ShopDomain;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Suppression Fence
// ============================================================================

/// Short-lived marker placed before pushing consent to the platform.
///
/// While armed, a platform webhook reporting `expected` is treated as the echo
/// of our own push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FenceMarker {
    /// Instant after which the fence no longer applies.
    pub until: Timestamp,
    /// Status the echo is expected to carry.
    pub expected: ConsentStatus,
}

impl FenceMarker {
    /// Returns true when the fence is still armed at `now`.
    #[must_use]
    pub fn is_armed(&self, now: Timestamp) -> bool {
        now <= self.until
    }
}

// ============================================================================
// SECTION: Customer Consent
// ============================================================================

/// Current consent state for one customer in one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerConsentRecord {
    /// Store-assigned row key.
    pub key: CustomerKey,
    /// Owning shop.
    pub shop: ShopDomain,
    /// Platform customer id, once known.
    pub customer_id: Option<CustomerId>,
    /// Normalized email, once known.
    pub email: Option<EmailAddress>,
    /// Current consent status.
    pub status: ConsentStatus,
    /// Event time of the signal that established `status`.
    pub last_consent_at: Option<Timestamp>,
    /// Kind of the signal that established `status`.
    pub last_source: Option<ConsentEventKind>,
    /// Last known region for the customer.
    pub region: Option<RegionCode>,
    /// Echo-suppression fence, when armed.
    pub fence: Option<FenceMarker>,
}

/// Initial values for a new customer row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDraft {
    /// Owning shop.
    pub shop: ShopDomain,
    /// Identity keys for the row.
    pub customer_id: Option<CustomerId>,
    /// Identity email for the row.
    pub email: Option<EmailAddress>,
    /// Seed status.
    pub status: ConsentStatus,
    /// Event time of the seed, when it came from an explicit signal.
    pub last_consent_at: Option<Timestamp>,
    /// Signal kind of the seed, when it came from an explicit signal.
    pub last_source: Option<ConsentEventKind>,
    /// Region, when known.
    pub region: Option<RegionCode>,
}

/// Candidate consent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWrite {
    /// Target row.
    pub key: CustomerKey,
    /// Candidate status.
    pub status: ConsentStatus,
    /// Event time of the signal carrying the candidate.
    pub occurred_at: Timestamp,
    /// Signal kind carrying the candidate.
    pub source: ConsentEventKind,
    /// Region observed with the signal, if any.
    pub region: Option<RegionCode>,
}

/// Result of applying a [`StatusWrite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Status changed.
    Applied {
        /// Status before the write.
        previous: ConsentStatus,
    },
    /// Status already matched the candidate.
    Unchanged,
    /// Candidate was older than the stored state and was dropped.
    Stale {
        /// Stored status that was kept.
        stored: ConsentStatus,
    },
}

impl WriteOutcome {
    /// Returns the audit effect for this outcome.
    #[must_use]
    pub const fn effect(self) -> EventEffect {
        match self {
            Self::Applied {
                ..
            } => EventEffect::Applied,
            Self::Unchanged => EventEffect::Unchanged,
            Self::Stale {
                ..
            } => EventEffect::Stale,
        }
    }

    /// Returns true when the stored status changed.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl CustomerConsentRecord {
    /// Applies a candidate write in place and reports what happened.
    ///
    /// The candidate is stale when it is older than `last_consent_at`, or when
    /// it shares that instant but comes from a lower-precedence source. A
    /// non-stale candidate matching the stored status leaves the status alone
    /// but advances `last_consent_at`, so that later-arriving older signals
    /// still compare against the newest confirmation.
    pub fn apply(&mut self, write: &StatusWrite) -> WriteOutcome {
        if self.is_stale(write) {
            return WriteOutcome::Stale {
                stored: self.status,
            };
        }
        if let Some(region) = &write.region {
            self.region = Some(region.clone());
        }
        let newer = self.last_consent_at.is_none_or(|stored| write.occurred_at > stored);
        if self.status == write.status {
            if newer {
                self.last_consent_at = Some(write.occurred_at);
                self.last_source = Some(write.source);
            }
            return WriteOutcome::Unchanged;
        }
        let previous = self.status;
        self.status = write.status;
        self.last_consent_at = Some(write.occurred_at);
        self.last_source = Some(write.source);
        WriteOutcome::Applied {
            previous,
        }
    }

    /// Returns true when `write` loses against the stored state.
    fn is_stale(&self, write: &StatusWrite) -> bool {
        let Some(stored_at) = self.last_consent_at else {
            return false;
        };
        if write.occurred_at < stored_at {
            return true;
        }
        if write.occurred_at == stored_at {
            let stored_rank = self.last_source.map_or(0, ConsentEventKind::precedence);
            return write.source.precedence() < stored_rank;
        }
        false
    }
}

// ============================================================================
// SECTION: Consent Events
// ============================================================================

/// Persisted audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentEvent {
    /// Store-assigned identifier.
    pub id: EventId,
    /// Owning shop.
    pub shop: ShopDomain,
    /// Signal kind.
    pub kind: ConsentEventKind,
    /// Status carried or decided, when the kind has one.
    pub outcome: Option<ConsentStatus>,
    /// Effect on the stored state.
    pub effect: EventEffect,
    /// Free-form provenance (display text, mode, region, segment, reasons).
    pub note: Value,
    /// Linked checkout session.
    pub session_id: Option<SessionId>,
    /// Linked customer row; back-filled for anonymous checkout events.
    pub customer_key: Option<CustomerKey>,
    /// Event time.
    pub occurred_at: Timestamp,
    /// Time the event was written.
    pub recorded_at: Timestamp,
}

/// Audit event ready to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConsentEvent {
    /// Owning shop.
    pub shop: ShopDomain,
    /// Signal kind.
    pub kind: ConsentEventKind,
    /// Status carried or decided.
    pub outcome: Option<ConsentStatus>,
    /// Effect on the stored state.
    pub effect: EventEffect,
    /// Free-form provenance.
    pub note: Value,
    /// Linked checkout session.
    pub session_id: Option<SessionId>,
    /// Linked customer row.
    pub customer_key: Option<CustomerKey>,
    /// Event time.
    pub occurred_at: Timestamp,
    /// Time the event is written.
    pub recorded_at: Timestamp,
}

impl NewConsentEvent {
    /// Returns true when this event participates in toggle deduplication.
    ///
    /// Toggles are idempotent per (session, kind, event time).
    #[must_use]
    pub fn is_session_toggle(&self) -> bool {
        self.kind == ConsentEventKind::CheckoutToggle && self.session_id.is_some()
    }

    /// Converts into a persisted event with the assigned identifier.
    #[must_use]
    pub fn into_event(self, id: EventId) -> ConsentEvent {
        ConsentEvent {
            id,
            shop: self.shop,
            kind: self.kind,
            outcome: self.outcome,
            effect: self.effect,
            note: self.note,
            session_id: self.session_id,
            customer_key: self.customer_key,
            occurred_at: self.occurred_at,
            recorded_at: self.recorded_at,
        }
    }
}

/// Result of appending an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventInsert {
    /// A new event row was written.
    Inserted(EventId),
    /// An identical toggle already existed; nothing was written.
    Duplicate(EventId),
}

impl EventInsert {
    /// Returns the event identifier regardless of insertion.
    #[must_use]
    pub const fn id(self) -> EventId {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => id,
        }
    }
}

// ============================================================================
// SECTION: Checkout Sessions
// ============================================================================

/// Checkout session opened when the storefront asks for policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session identifier handed to the storefront.
    pub id: SessionId,
    /// Owning shop.
    pub shop: ShopDomain,
    /// Checkout token joining the session to its eventual order.
    pub checkout_token: CheckoutToken,
    /// Presentation mode shown to the customer.
    pub presentation: PresentationMode,
    /// Region used to pick the presentation mode.
    pub region: Option<RegionCode>,
    /// Consent text displayed next to the checkbox.
    pub display_text: Option<String>,
    /// Order linked at completion.
    pub order_id: Option<OrderId>,
    /// Provisional status from the latest toggle; never stored as consent.
    pub intended: Option<ConsentStatus>,
    /// Resolved subscribe decision, set once the order confirms it.
    pub resolved_subscribe: Option<bool>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last refresh time.
    pub updated_at: Timestamp,
}

impl CheckoutSession {
    /// Returns true once an order has been linked.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.order_id.is_some()
    }
}

/// Request to open or refresh a session for a checkout token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOpen {
    /// Identifier to use if a new session is created.
    pub candidate_id: SessionId,
    /// Owning shop.
    pub shop: ShopDomain,
    /// Checkout token.
    pub checkout_token: CheckoutToken,
    /// Resolved presentation mode.
    pub presentation: PresentationMode,
    /// Region used for resolution.
    pub region: Option<RegionCode>,
    /// Consent text displayed.
    pub display_text: Option<String>,
    /// Current time.
    pub now: Timestamp,
}

/// Result of linking an order to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLink {
    /// Order linked now.
    Linked(CheckoutSession),
    /// Session was already linked to this same order (webhook replay).
    AlreadyLinked(CheckoutSession),
    /// Session is linked to a different order, or the order is linked elsewhere.
    Conflict(String),
}

/// Counts reported by a session prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Sessions removed.
    pub sessions: usize,
    /// Unattributed events removed with them.
    pub events: usize,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
