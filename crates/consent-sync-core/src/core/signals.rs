// crates/consent-sync-core/src/core/signals.rs
// ============================================================================
// Module: Consent Sync Signals
// Description: Normalized inputs accepted by the reconciliation engine.
// Purpose: Decouple wire payloads from reconciliation semantics.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every consent-relevant input is normalized into one of these types before it
//! reaches the engine. The HTTP surface, the bulk importer, and tests all build
//! the same values, so reconciliation behaves identically regardless of how a
//! signal arrived.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::consent::ConfirmationStrength;
use crate::core::consent::ConsentEventKind;
use crate::core::consent::ConsentStatus;
use crate::core::identifiers::CheckoutToken;
use crate::core::identifiers::CustomerId;
use crate::core::identifiers::CustomerIdentity;
use crate::core::identifiers::OrderId;
use crate::core::identifiers::RegionCode;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::ShopDomain;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Storefront Inputs
// ============================================================================

/// Storefront request for the checkout consent policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRequest {
    /// Requesting shop.
    pub shop: ShopDomain,
    /// Checkout token for the active checkout.
    pub checkout_token: CheckoutToken,
    /// Region code reported by the storefront, if any.
    pub region_code: Option<RegionCode>,
    /// Country name reported by the storefront, if any.
    pub country_name: Option<String>,
    /// Client address used for geographic fallback.
    pub client_ip: Option<IpAddr>,
    /// Logged-in customer, if any.
    pub customer_id: Option<CustomerId>,
    /// Order count reported by the storefront, if any.
    pub order_count: Option<u64>,
    /// Consent text the storefront will display.
    pub display_text: Option<String>,
}

/// Storefront checkbox interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSignal {
    /// Session the toggle belongs to.
    pub session_id: SessionId,
    /// Intended status after the interaction.
    pub status: ConsentStatus,
    /// Consent text displayed at the time.
    pub display_text: Option<String>,
    /// Client-side event time.
    pub occurred_at: Timestamp,
}

// ============================================================================
// SECTION: Platform Inputs
// ============================================================================

/// Customer attributes forwarded to the email provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileTraits {
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
}

/// Order creation observed for a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSignal {
    /// Owning shop.
    pub shop: ShopDomain,
    /// Created order.
    pub order_id: OrderId,
    /// Checkout token the order came from.
    pub checkout_token: Option<CheckoutToken>,
    /// Ordering customer.
    pub identity: CustomerIdentity,
    /// Customer order count including this order, when reported.
    pub orders_including_current: Option<u64>,
    /// Billing or shipping region.
    pub region_code: Option<RegionCode>,
    /// Billing or shipping country name.
    pub country_name: Option<String>,
    /// Names for the email profile.
    pub traits: ProfileTraits,
    /// Order creation time.
    pub occurred_at: Timestamp,
}

/// Authoritative consent state reported by the platform or a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentSignal {
    /// Owning shop.
    pub shop: ShopDomain,
    /// Customer the state belongs to.
    pub identity: CustomerIdentity,
    /// Reported status.
    pub status: ConsentStatus,
    /// Reported opt-in level, when present.
    pub confirmation: Option<ConfirmationStrength>,
    /// Region associated with the customer, when present.
    pub region_code: Option<RegionCode>,
    /// Names for the email profile.
    #[serde(default)]
    pub traits: ProfileTraits,
    /// Time the platform recorded the change.
    pub occurred_at: Timestamp,
}

/// Customer profile change reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSignal {
    /// Owning shop.
    pub shop: ShopDomain,
    /// Updated customer.
    pub identity: CustomerIdentity,
    /// Explicit marketing state in the payload, if any.
    pub explicit_status: Option<ConsentStatus>,
    /// Default region for the customer.
    pub region_code: Option<RegionCode>,
    /// Update time.
    pub occurred_at: Timestamp,
}

/// Any signal the engine reconciles into stored consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Order created for a checkout session.
    CheckoutCompleted(OrderSignal),
    /// Platform marketing-consent webhook.
    PlatformConsent(ConsentSignal),
    /// Platform profile update.
    ProfileUpdate(ProfileSignal),
    /// Operator bulk import row.
    BulkSync(ConsentSignal),
}

impl Signal {
    /// Returns the audit kind for this signal.
    #[must_use]
    pub const fn kind(&self) -> ConsentEventKind {
        match self {
            Self::CheckoutCompleted(_) => ConsentEventKind::CheckoutCompleted,
            Self::PlatformConsent(_) => ConsentEventKind::PlatformConsentWebhook,
            Self::ProfileUpdate(_) => ConsentEventKind::ProfileFieldUpdate,
            Self::BulkSync(_) => ConsentEventKind::BulkSync,
        }
    }

    /// Returns the owning shop.
    #[must_use]
    pub const fn shop(&self) -> &ShopDomain {
        match self {
            Self::CheckoutCompleted(order) => &order.shop,
            Self::PlatformConsent(consent) | Self::BulkSync(consent) => &consent.shop,
            Self::ProfileUpdate(profile) => &profile.shop,
        }
    }
}
