// crates/consent-sync-core/src/core/consent.rs
// ============================================================================
// Module: Consent Sync Consent Vocabulary
// Description: Consent states, presentation modes, and signal kinds.
// Purpose: Define the closed vocabularies shared by storage and reconciliation.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! These enums are the stable wire and storage forms of consent. Each type has
//! an `as_str` form used by the stores and a lenient `parse` used at the
//! boundaries. Platform marketing states that have no direct equivalent
//! (`pending`, `invalid`, `redacted`) collapse to
//! [`ConsentStatus::NotSubscribed`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Consent Status
// ============================================================================

/// Stored marketing consent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    /// Customer agreed to marketing email.
    Subscribed,
    /// Customer explicitly withdrew consent.
    Unsubscribed,
    /// Customer never agreed.
    NotSubscribed,
}

impl ConsentStatus {
    /// Returns the canonical storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "SUBSCRIBED",
            Self::Unsubscribed => "UNSUBSCRIBED",
            Self::NotSubscribed => "NOT_SUBSCRIBED",
        }
    }

    /// Parses the canonical storage form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SUBSCRIBED" => Some(Self::Subscribed),
            "UNSUBSCRIBED" => Some(Self::Unsubscribed),
            "NOT_SUBSCRIBED" => Some(Self::NotSubscribed),
            _ => None,
        }
    }

    /// Maps a platform marketing state (any case) onto a stored status.
    ///
    /// `confirmed_opt_in` is treated as subscribed; `pending`, `invalid`, and
    /// `redacted` are treated as not subscribed. Unknown states return `None`.
    #[must_use]
    pub fn from_platform_state(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "subscribed" | "confirmed_opt_in" => Some(Self::Subscribed),
            "unsubscribed" => Some(Self::Unsubscribed),
            "not_subscribed" | "pending" | "invalid" | "redacted" => Some(Self::NotSubscribed),
            _ => None,
        }
    }

    /// Returns true for [`ConsentStatus::Subscribed`].
    #[must_use]
    pub const fn is_subscribed(self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Checkout Presentation
// ============================================================================

/// How the consent checkbox is shown at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresentationMode {
    /// Unchecked checkbox; ticking it subscribes.
    OptIn,
    /// Pre-checked checkbox; unticking it declines.
    OptOut,
    /// No checkbox; placing the order subscribes.
    NoCheckbox,
}

impl PresentationMode {
    /// Returns the canonical storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OptIn => "OPT_IN",
            Self::OptOut => "OPT_OUT",
            Self::NoCheckbox => "NO_CHECKBOX",
        }
    }

    /// Parses the storage form, also accepting lowercase and hyphenated spellings.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "OPT_IN" => Some(Self::OptIn),
            "OPT_OUT" => Some(Self::OptOut),
            "NO_CHECKBOX" => Some(Self::NoCheckbox),
            _ => None,
        }
    }

    /// Consent implied by completing checkout without touching the checkbox.
    #[must_use]
    pub const fn default_status(self) -> ConsentStatus {
        match self {
            Self::OptIn => ConsentStatus::NotSubscribed,
            Self::OptOut | Self::NoCheckbox => ConsentStatus::Subscribed,
        }
    }
}

impl fmt::Display for PresentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strength of the opt-in confirmation required or recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationStrength {
    /// Single opt-in.
    Single,
    /// Double opt-in, confirmed by the customer.
    Confirmed,
}

impl ConfirmationStrength {
    /// Returns the canonical storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Confirmed => "CONFIRMED",
        }
    }

    /// Parses a storage form or a platform opt-in level (`single_opt_in`,
    /// `confirmed_opt_in`).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SINGLE" | "SINGLE_OPT_IN" => Some(Self::Single),
            "CONFIRMED" | "CONFIRMED_OPT_IN" | "DOUBLE" => Some(Self::Confirmed),
            _ => None,
        }
    }

    /// Returns the platform opt-in level sent with consent mutations.
    #[must_use]
    pub const fn opt_in_level(self) -> &'static str {
        match self {
            Self::Single => "SINGLE_OPT_IN",
            Self::Confirmed => "CONFIRMED_OPT_IN",
        }
    }
}

impl fmt::Display for ConfirmationStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer segment used to specialize checkout policy.
///
/// An unknown segment is represented by `Option::None`, never by a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    /// No prior orders.
    FirstTime,
    /// At least one prior order.
    Returning,
}

impl CustomerSegment {
    /// Derives the segment from a count of orders placed before the current one.
    #[must_use]
    pub const fn from_prior_orders(prior_orders: u64) -> Self {
        if prior_orders == 0 { Self::FirstTime } else { Self::Returning }
    }

    /// Returns the canonical storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstTime => "first_time",
            Self::Returning => "returning",
        }
    }

    /// Parses the storage form, accepting a few common spellings.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_time" | "firsttime" | "new" => Some(Self::FirstTime),
            "returning" | "repeat" => Some(Self::Returning),
            _ => None,
        }
    }
}

impl fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Evidence of how strongly a customer expressed consent.
///
/// Used to decide whether a provider-side suppression may be overridden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentEvidence {
    /// Customer ticked an unchecked opt-in checkbox.
    pub explicit_checkbox: bool,
    /// Consent was confirmed through a double opt-in flow.
    pub confirmed_opt_in: bool,
}

/// Policy for re-subscribing profiles the email provider has suppressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionOverride {
    /// Never override a suppression.
    #[default]
    Never,
    /// Override only when the customer ticked an explicit checkbox.
    ExplicitCheckbox,
    /// Override on an explicit checkbox or a confirmed opt-in.
    ExplicitOrConfirmed,
}

impl SuppressionOverride {
    /// Returns true when `evidence` is strong enough to override a suppression.
    #[must_use]
    pub const fn permits(self, evidence: ConsentEvidence) -> bool {
        match self {
            Self::Never => false,
            Self::ExplicitCheckbox => evidence.explicit_checkbox,
            Self::ExplicitOrConfirmed => evidence.explicit_checkbox || evidence.confirmed_opt_in,
        }
    }
}

// ============================================================================
// SECTION: Signal Kinds
// ============================================================================

/// Kind of consent event recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentEventKind {
    /// Storefront checkbox interaction.
    CheckoutToggle,
    /// Order placed for a checkout session.
    CheckoutCompleted,
    /// Platform marketing-consent webhook.
    PlatformConsentWebhook,
    /// Platform customer profile update.
    ProfileFieldUpdate,
    /// Operator-driven bulk import.
    BulkSync,
}

impl ConsentEventKind {
    /// Returns the canonical storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckoutToggle => "checkout-toggle",
            Self::CheckoutCompleted => "checkout-completed",
            Self::PlatformConsentWebhook => "platform-consent-webhook",
            Self::ProfileFieldUpdate => "profile-field-update",
            Self::BulkSync => "bulk-sync",
        }
    }

    /// Parses the storage form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "checkout-toggle" => Some(Self::CheckoutToggle),
            "checkout-completed" => Some(Self::CheckoutCompleted),
            "platform-consent-webhook" => Some(Self::PlatformConsentWebhook),
            "profile-field-update" => Some(Self::ProfileFieldUpdate),
            "bulk-sync" => Some(Self::BulkSync),
            _ => None,
        }
    }

    /// Tie-break rank when two signals carry the same timestamp.
    ///
    /// Platform-authoritative signals outrank locally derived ones.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::CheckoutToggle | Self::ProfileFieldUpdate => 0,
            Self::CheckoutCompleted => 1,
            Self::PlatformConsentWebhook | Self::BulkSync => 2,
        }
    }
}

impl fmt::Display for ConsentEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a consent event did to the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventEffect {
    /// Intended state recorded against a session; nothing stored yet.
    Provisional,
    /// Stored status changed.
    Applied,
    /// Stored status already matched.
    Unchanged,
    /// Signal was older than the stored state and was dropped.
    Stale,
    /// Signal was an echo of our own push and was dropped.
    Suppressed,
    /// Initial status written for a newly created row.
    Seeded,
    /// Metadata only; no status decision was made.
    Recorded,
    /// Order arrived for a checkout with no session.
    NoSession,
    /// Signal could not be attributed or was otherwise invalid.
    Rejected,
}

impl EventEffect {
    /// Returns the canonical storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provisional => "provisional",
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Stale => "stale",
            Self::Suppressed => "suppressed",
            Self::Seeded => "seeded",
            Self::Recorded => "recorded",
            Self::NoSession => "no_session",
            Self::Rejected => "rejected",
        }
    }

    /// Parses the storage form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "provisional" => Some(Self::Provisional),
            "applied" => Some(Self::Applied),
            "unchanged" => Some(Self::Unchanged),
            "stale" => Some(Self::Stale),
            "suppressed" => Some(Self::Suppressed),
            "seeded" => Some(Self::Seeded),
            "recorded" => Some(Self::Recorded),
            "no_session" => Some(Self::NoSession),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for EventEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ConsentEvidence;
    use super::ConsentStatus;
    use super::CustomerSegment;
    use super::PresentationMode;
    use super::SuppressionOverride;

    #[test]
    fn platform_states_collapse() {
        assert_eq!(
            ConsentStatus::from_platform_state("SUBSCRIBED"),
            Some(ConsentStatus::Subscribed)
        );
        assert_eq!(
            ConsentStatus::from_platform_state("confirmed_opt_in"),
            Some(ConsentStatus::Subscribed)
        );
        for raw in ["pending", "invalid", "redacted", "not_subscribed"] {
            assert_eq!(
                ConsentStatus::from_platform_state(raw),
                Some(ConsentStatus::NotSubscribed),
                "{raw}"
            );
        }
        assert_eq!(ConsentStatus::from_platform_state("bogus"), None);
    }

    #[test]
    fn untouched_checkbox_defaults_follow_mode() {
        assert_eq!(PresentationMode::OptIn.default_status(), ConsentStatus::NotSubscribed);
        assert_eq!(PresentationMode::OptOut.default_status(), ConsentStatus::Subscribed);
        assert_eq!(PresentationMode::NoCheckbox.default_status(), ConsentStatus::Subscribed);
    }

    #[test]
    fn zero_prior_orders_is_first_time() {
        assert_eq!(CustomerSegment::from_prior_orders(0), CustomerSegment::FirstTime);
        assert_eq!(CustomerSegment::from_prior_orders(3), CustomerSegment::Returning);
    }

    #[test]
    fn suppression_override_levels() {
        let checkbox = ConsentEvidence {
            explicit_checkbox: true,
            confirmed_opt_in: false,
        };
        let confirmed = ConsentEvidence {
            explicit_checkbox: false,
            confirmed_opt_in: true,
        };
        assert!(!SuppressionOverride::Never.permits(checkbox));
        assert!(SuppressionOverride::ExplicitCheckbox.permits(checkbox));
        assert!(!SuppressionOverride::ExplicitCheckbox.permits(confirmed));
        assert!(SuppressionOverride::ExplicitOrConfirmed.permits(confirmed));
        assert!(!SuppressionOverride::ExplicitOrConfirmed.permits(ConsentEvidence::default()));
    }
}
