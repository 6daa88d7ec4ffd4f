// crates/consent-sync-core/src/interfaces/mod.rs
// ============================================================================
// Module: Consent Sync Interfaces
// Description: Backend-agnostic seams for storage, platforms, and logging.
// Purpose: Define the contract surfaces used by the reconciliation runtime.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the reconciliation runtime reaches storage, the
//! commerce platform, the email provider, geographic lookup, wall-clock time,
//! and the operational log without embedding any backend. The HTTP clients and
//! the `SQLite` store live in sibling crates and implement these traits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use serde::Serialize;
use thiserror::Error;

use crate::core::CheckoutSession;
use crate::core::CheckoutToken;
use crate::core::ConfirmationStrength;
use crate::core::ConsentEvent;
use crate::core::ConsentEventKind;
use crate::core::ConsentStatus;
use crate::core::CustomerConsentRecord;
use crate::core::CustomerDraft;
use crate::core::CustomerId;
use crate::core::CustomerIdentity;
use crate::core::CustomerKey;
use crate::core::CustomerSegment;
use crate::core::EmailAddress;
use crate::core::EventInsert;
use crate::core::FenceMarker;
use crate::core::IdentityPlan;
use crate::core::NewConsentEvent;
use crate::core::OrderId;
use crate::core::OrderLink;
use crate::core::ProfileTraits;
use crate::core::PruneReport;
use crate::core::RegionCode;
use crate::core::SessionId;
use crate::core::SessionOpen;
use crate::core::ShopDomain;
use crate::core::StatusWrite;
use crate::core::Timestamp;
use crate::core::WriteOutcome;

// ============================================================================
// SECTION: Consent Store
// ============================================================================

/// Consent store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("consent store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("consent store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("consent store version mismatch: {0}")]
    VersionMismatch(String),
    /// Request references missing or invalid data.
    #[error("consent store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("consent store error: {0}")]
    Store(String),
}

/// Result of resolving a customer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerResolution {
    /// Resolved row after the plan ran, if any.
    pub record: Option<CustomerConsentRecord>,
    /// Plan executed to reach the row.
    pub plan: IdentityPlan,
}

/// Durable consent state, checkout sessions, and the audit log.
///
/// Every method is atomic with respect to concurrent callers. Status changes
/// go through [`ConsentStore::write_status`], which must apply
/// [`CustomerConsentRecord::apply`] to the freshly read row inside the same
/// transaction.
pub trait ConsentStore {
    /// Resolves an identity to at most one row, folding rows when needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when lookup or folding fails.
    fn resolve_customer(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
    ) -> Result<CustomerResolution, StoreError>;

    /// Creates a new row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails or conflicts.
    fn create_customer(&self, draft: &CustomerDraft) -> Result<CustomerConsentRecord, StoreError>;

    /// Loads a row by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_customer(&self, key: CustomerKey) -> Result<Option<CustomerConsentRecord>, StoreError>;

    /// Applies a candidate status write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the row does not exist.
    fn write_status(&self, write: &StatusWrite) -> Result<WriteOutcome, StoreError>;

    /// Sets or clears the echo-suppression fence on a row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn set_fence(&self, key: CustomerKey, fence: Option<FenceMarker>) -> Result<(), StoreError>;

    /// Appends an audit event. Session toggles are deduplicated on
    /// (session, kind, event time).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn append_event(&self, event: &NewConsentEvent) -> Result<EventInsert, StoreError>;

    /// Lists events linked to a customer in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn events_for_customer(&self, key: CustomerKey) -> Result<Vec<ConsentEvent>, StoreError>;

    /// Lists events linked to a session in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn events_for_session(&self, session_id: &SessionId) -> Result<Vec<ConsentEvent>, StoreError>;

    /// Links every unattributed event of a session to a customer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn link_session_events(
        &self,
        session_id: &SessionId,
        key: CustomerKey,
    ) -> Result<usize, StoreError>;

    /// Opens a session for a checkout token, or refreshes the open one.
    ///
    /// A completed session is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the upsert fails.
    fn open_session(&self, open: &SessionOpen) -> Result<CheckoutSession, StoreError>;

    /// Loads a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_session(&self, session_id: &SessionId) -> Result<Option<CheckoutSession>, StoreError>;

    /// Loads a session by checkout token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_session_by_token(
        &self,
        shop: &ShopDomain,
        token: &CheckoutToken,
    ) -> Result<Option<CheckoutSession>, StoreError>;

    /// Records the provisional intent of an open session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the session is missing or completed.
    fn record_intent(
        &self,
        session_id: &SessionId,
        status: ConsentStatus,
        display_text: Option<&str>,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Links an order to a session and stores the resolved subscribe decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn complete_session(
        &self,
        session_id: &SessionId,
        order_id: &OrderId,
        subscribe: bool,
        at: Timestamp,
    ) -> Result<OrderLink, StoreError>;

    /// Deletes sessions never linked to an order and last touched before
    /// `cutoff`, along with their unattributed events.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn prune_stale_sessions(&self, cutoff: Timestamp) -> Result<PruneReport, StoreError>;
}

// ============================================================================
// SECTION: Commerce Platform
// ============================================================================

/// Commerce platform errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Network or server failure; may succeed on a later attempt.
    #[error("platform transport error: {0}")]
    Transport(String),
    /// The consent mutation was rejected because the customer's email
    /// conflicts with platform state.
    #[error("platform email conflict: {0}")]
    EmailConflict(String),
    /// Platform rejected the request.
    #[error("platform rejected request: {0}")]
    Rejected(String),
    /// Customer does not exist on the platform.
    #[error("platform customer not found: {0}")]
    MissingCustomer(String),
    /// Response could not be interpreted.
    #[error("platform invalid response: {0}")]
    InvalidResponse(String),
    /// No credentials are configured for the shop.
    #[error("platform shop not configured: {0}")]
    UnknownShop(String),
}

/// Consent mutation pushed to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsentMutation {
    /// Status to push.
    pub status: ConsentStatus,
    /// Opt-in level to push.
    pub confirmation: ConfirmationStrength,
    /// Consent time to push.
    pub occurred_at: Timestamp,
}

/// Commerce platform admin API.
pub trait CommercePlatform {
    /// Returns the customer's total order count, or `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the query fails.
    fn customer_order_count(
        &self,
        shop: &ShopDomain,
        customer: CustomerId,
    ) -> Result<Option<u64>, PlatformError>;

    /// Updates the customer's email marketing consent.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::EmailConflict`] when the platform rejects the
    /// mutation over the customer's email; other variants otherwise.
    fn update_marketing_consent(
        &self,
        shop: &ShopDomain,
        customer: CustomerId,
        mutation: &ConsentMutation,
    ) -> Result<(), PlatformError>;

    /// Sets the customer's email address.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the update fails.
    fn set_customer_email(
        &self,
        shop: &ShopDomain,
        customer: CustomerId,
        email: &EmailAddress,
    ) -> Result<(), PlatformError>;
}

// ============================================================================
// SECTION: Email Provider
// ============================================================================

/// Email provider errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmailProviderError {
    /// Network or server failure.
    #[error("email provider transport error: {0}")]
    Transport(String),
    /// Provider rejected the request.
    #[error("email provider rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },
    /// Provider does not support a requested field on this account.
    #[error("email provider unsupported field: {0}")]
    UnsupportedField(String),
    /// Response could not be interpreted.
    #[error("email provider invalid response: {0}")]
    InvalidResponse(String),
}

/// Amount of detail requested in a profile lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupDetail {
    /// Include subscription and suppression state.
    WithSubscriptions,
    /// Identity fields only.
    Basic,
}

/// Provider-side marketing consent for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderConsent {
    /// Profile is subscribed.
    Subscribed,
    /// Profile unsubscribed.
    Unsubscribed,
    /// Profile never subscribed.
    NeverSubscribed,
}

/// Provider-side subscription state, when the lookup included it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderSubscription {
    /// Marketing consent.
    pub consent: ProviderConsent,
    /// Provider suppressed the profile (bounce, complaint, manual).
    pub suppressed: bool,
}

/// Email provider profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Provider profile identifier.
    pub id: String,
    /// Subscription state, when known.
    pub subscription: Option<ProviderSubscription>,
}

/// Attributes written to a provider profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileAttributes {
    /// Names.
    pub traits: ProfileTraits,
    /// Region.
    pub region: Option<RegionCode>,
    /// Customer segment.
    pub segment: Option<CustomerSegment>,
}

/// Email marketing provider API.
pub trait EmailProvider {
    /// Looks up a profile by email.
    ///
    /// # Errors
    ///
    /// Returns [`EmailProviderError::UnsupportedField`] when
    /// [`LookupDetail::WithSubscriptions`] is not available on the account.
    fn find_profile(
        &self,
        email: &EmailAddress,
        detail: LookupDetail,
    ) -> Result<Option<ProviderProfile>, EmailProviderError>;

    /// Creates a profile.
    ///
    /// # Errors
    ///
    /// Returns [`EmailProviderError`] when creation fails.
    fn create_profile(
        &self,
        email: &EmailAddress,
        attributes: &ProfileAttributes,
    ) -> Result<ProviderProfile, EmailProviderError>;

    /// Updates profile attributes.
    ///
    /// # Errors
    ///
    /// Returns [`EmailProviderError`] when the update fails.
    fn update_profile(
        &self,
        profile_id: &str,
        attributes: &ProfileAttributes,
    ) -> Result<(), EmailProviderError>;

    /// Subscribes an email to a list.
    ///
    /// # Errors
    ///
    /// Returns [`EmailProviderError`] when the request fails.
    fn subscribe(&self, list_id: &str, email: &EmailAddress) -> Result<(), EmailProviderError>;

    /// Unsubscribes an email from a list.
    ///
    /// # Errors
    ///
    /// Returns [`EmailProviderError`] when the request fails.
    fn unsubscribe(&self, list_id: &str, email: &EmailAddress) -> Result<(), EmailProviderError>;
}

/// Strategy for looking up a provider profile.
pub trait ProfileLookup {
    /// Looks up a profile by email.
    ///
    /// # Errors
    ///
    /// Returns [`EmailProviderError`] when lookup fails.
    fn lookup(&self, email: &EmailAddress) -> Result<Option<ProviderProfile>, EmailProviderError>;
}

// ============================================================================
// SECTION: Host Services
// ============================================================================

/// Maps a client address to a region.
pub trait RegionLocator {
    /// Returns the region for `ip`, or `None` when unknown.
    fn locate(&self, ip: IpAddr) -> Option<RegionCode>;
}

/// Locator that never resolves a region.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRegionLocator;

impl RegionLocator for NullRegionLocator {
    fn locate(&self, _ip: IpAddr) -> Option<RegionCode> {
        None
    }
}

/// Wall-clock source.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Mints checkout session identifiers.
pub trait SessionIdGenerator {
    /// Returns a fresh, unguessable session identifier.
    fn next_session_id(&self) -> SessionId;
}

// ============================================================================
// SECTION: Operational Log
// ============================================================================

/// Operational log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogLevel {
    /// Normal progress.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failed step.
    Error,
}

/// Structured operational log entry emitted by the runtime.
#[derive(Debug, Clone, Serialize)]
pub struct SyncLogEvent {
    /// Event type identifier.
    pub event: &'static str,
    /// Event time.
    pub timestamp_ms: i64,
    /// Severity.
    pub level: SyncLogLevel,
    /// Pipeline stage (`policy`, `reconcile`, `identity`, `commerce_push`, `email_sync`).
    pub stage: &'static str,
    /// Outcome label.
    pub outcome: String,
    /// Owning shop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop: Option<String>,
    /// Signal kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<&'static str>,
    /// Customer row key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_key: Option<i64>,
    /// Platform customer id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<u64>,
    /// Customer email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Detail message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncLogEvent {
    /// Creates a log entry for a stage outcome.
    #[must_use]
    pub fn new(
        at: Timestamp,
        level: SyncLogLevel,
        stage: &'static str,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            event: "consent_sync",
            timestamp_ms: at.as_unix_millis(),
            level,
            stage,
            outcome: outcome.into(),
            shop: None,
            signal: None,
            customer_key: None,
            customer_id: None,
            email: None,
            message: None,
        }
    }

    /// Attaches the shop.
    #[must_use]
    pub fn shop(mut self, shop: &ShopDomain) -> Self {
        self.shop = Some(shop.to_string());
        self
    }

    /// Attaches the signal kind.
    #[must_use]
    pub const fn signal(mut self, kind: ConsentEventKind) -> Self {
        self.signal = Some(kind.as_str());
        self
    }

    /// Attaches the customer row key.
    #[must_use]
    pub const fn customer_key(mut self, key: Option<CustomerKey>) -> Self {
        self.customer_key = match key {
            Some(key) => Some(key.get()),
            None => None,
        };
        self
    }

    /// Attaches the identity fields.
    #[must_use]
    pub fn identity(mut self, identity: &CustomerIdentity) -> Self {
        self.customer_id = identity.customer_id.map(CustomerId::get);
        self.email = identity.email.as_ref().map(ToString::to_string);
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Sink for operational log entries.
pub trait SyncLogSink: Send + Sync {
    /// Records a log entry. Sinks never fail the caller.
    fn record(&self, event: &SyncLogEvent);
}

/// Sink that discards entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSyncLogSink;

impl SyncLogSink for NoopSyncLogSink {
    fn record(&self, _event: &SyncLogEvent) {}
}
