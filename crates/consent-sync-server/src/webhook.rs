// crates/consent-sync-server/src/webhook.rs
// ============================================================================
// Module: Webhook Decoding
// Description: Signature checks and payload decoding for platform webhooks.
// Purpose: Turn authenticated webhook deliveries into reconciliation signals.
// Dependencies: consent-sync-core, base64, hmac, serde, serde_json, sha2
// ============================================================================

//! ## Overview
//! Deliveries are authenticated with HMAC-SHA256 over the raw body, keyed by
//! the shop's webhook secret and carried base64-encoded in
//! [`HMAC_HEADER`]. The shop comes from [`SHOP_HEADER`].
//!
//! Payloads are decoded leniently: unknown fields are ignored, customer ids
//! may be numeric or global ids, and a missing event time falls back to the
//! receipt time. A present but malformed time is rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use consent_sync_core::CheckoutToken;
use consent_sync_core::ConfirmationStrength;
use consent_sync_core::ConsentSignal;
use consent_sync_core::ConsentStatus;
use consent_sync_core::CustomerId;
use consent_sync_core::CustomerIdentity;
use consent_sync_core::EmailAddress;
use consent_sync_core::OrderId;
use consent_sync_core::OrderSignal;
use consent_sync_core::ProfileSignal;
use consent_sync_core::ProfileTraits;
use consent_sync_core::RegionCode;
use consent_sync_core::ShopDomain;
use consent_sync_core::Signal;
use consent_sync_core::Timestamp;
use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the base64 HMAC of the body.
pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
/// Header naming the sending shop.
pub const SHOP_HEADER: &str = "x-shopify-shop-domain";

/// HMAC-SHA256 keyed with a webhook secret.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Webhook rejection reasons.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// A required header is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    /// The shop is not configured.
    #[error("unknown shop: {0}")]
    UnknownShop(String),
    /// The signature does not match the body.
    #[error("webhook signature mismatch")]
    BadSignature,
    /// The body could not be decoded.
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl WebhookError {
    /// Returns a short label for access logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) => "missing_header",
            Self::UnknownShop(_) => "unknown_shop",
            Self::BadSignature => "bad_signature",
            Self::InvalidPayload(_) => "invalid_payload",
        }
    }
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// Returns true when `signature` is the base64 HMAC of `body` under `secret`.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the base64 HMAC of `body` under `secret`.
#[must_use]
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            STANDARD.encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Webhook topics accepted by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTopic {
    /// Order created.
    OrdersCreate,
    /// Customer profile updated.
    CustomersUpdate,
    /// Customer email marketing consent updated.
    MarketingConsentUpdate,
}

impl WebhookTopic {
    /// Returns the route label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OrdersCreate => "webhook_orders_create",
            Self::CustomersUpdate => "webhook_customers_update",
            Self::MarketingConsentUpdate => "webhook_marketing_consent_update",
        }
    }
}

/// Customer block embedded in order and customer payloads.
#[derive(Debug, Default, Deserialize)]
struct CustomerPayload {
    /// Numeric or global id.
    #[serde(default)]
    id: Option<Value>,
    /// Customer email.
    #[serde(default)]
    email: Option<String>,
    /// Given name.
    #[serde(default)]
    first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    last_name: Option<String>,
    /// Lifetime order count, when the payload carries it.
    #[serde(default)]
    orders_count: Option<Value>,
    /// Email marketing consent block.
    #[serde(default)]
    email_marketing_consent: Option<ConsentPayload>,
    /// Default address.
    #[serde(default)]
    default_address: Option<AddressPayload>,
    /// Last update time.
    #[serde(default)]
    updated_at: Option<String>,
}

/// Email marketing consent block.
#[derive(Debug, Default, Deserialize)]
struct ConsentPayload {
    /// Marketing state (`subscribed`, `unsubscribed`, ...).
    #[serde(default)]
    state: Option<String>,
    /// Opt-in level (`single_opt_in`, `confirmed_opt_in`, ...).
    #[serde(default)]
    opt_in_level: Option<String>,
    /// Time the consent changed.
    #[serde(default)]
    consent_updated_at: Option<String>,
}

/// Address block.
#[derive(Debug, Default, Deserialize)]
struct AddressPayload {
    /// ISO country code.
    #[serde(default)]
    country_code: Option<String>,
    /// Country name.
    #[serde(default)]
    country: Option<String>,
}

/// Order created payload.
#[derive(Debug, Deserialize)]
struct OrderPayload {
    /// Order id.
    id: Value,
    /// Checkout token the order came from.
    #[serde(default)]
    checkout_token: Option<String>,
    /// Order email.
    #[serde(default)]
    email: Option<String>,
    /// Order creation time.
    #[serde(default)]
    created_at: Option<String>,
    /// Ordering customer.
    #[serde(default)]
    customer: Option<CustomerPayload>,
    /// Billing address.
    #[serde(default)]
    billing_address: Option<AddressPayload>,
    /// Shipping address.
    #[serde(default)]
    shipping_address: Option<AddressPayload>,
}

/// Marketing consent update payload.
#[derive(Debug, Deserialize)]
struct MarketingConsentPayload {
    /// Customer id.
    #[serde(default)]
    customer_id: Option<Value>,
    /// Customer email.
    #[serde(default)]
    email_address: Option<String>,
    /// Consent block.
    #[serde(default)]
    email_marketing_consent: Option<ConsentPayload>,
}

/// Decodes a webhook body into a reconciliation signal.
///
/// # Errors
///
/// Returns [`WebhookError::InvalidPayload`] when the body is not valid JSON
/// for the topic or carries a malformed time.
pub fn decode_signal(
    topic: WebhookTopic,
    shop: &ShopDomain,
    body: &[u8],
    received_at: Timestamp,
) -> Result<Signal, WebhookError> {
    match topic {
        WebhookTopic::OrdersCreate => decode_order(shop, body, received_at),
        WebhookTopic::CustomersUpdate => decode_customer_update(shop, body, received_at),
        WebhookTopic::MarketingConsentUpdate => decode_consent_update(shop, body, received_at),
    }
}

/// Decodes an order created payload.
fn decode_order(
    shop: &ShopDomain,
    body: &[u8],
    received_at: Timestamp,
) -> Result<Signal, WebhookError> {
    let payload: OrderPayload = parse_json(body)?;
    let order_id = id_text(&payload.id)
        .ok_or_else(|| WebhookError::InvalidPayload("order id missing".to_string()))?;
    let customer = payload.customer.unwrap_or_default();
    let email =
        customer.email.as_deref().or(payload.email.as_deref()).and_then(EmailAddress::parse);
    let identity = CustomerIdentity::new(customer.id.as_ref().and_then(customer_id), email);
    let address = payload.billing_address.or(payload.shipping_address).unwrap_or_default();
    Ok(Signal::CheckoutCompleted(OrderSignal {
        shop: shop.clone(),
        order_id: OrderId::new(order_id),
        checkout_token: payload
            .checkout_token
            .filter(|token| !token.trim().is_empty())
            .map(CheckoutToken::new),
        identity,
        orders_including_current: customer.orders_count.as_ref().and_then(count),
        region_code: address.country_code.as_deref().and_then(RegionCode::parse),
        country_name: address.country.filter(|name| !name.trim().is_empty()),
        traits: ProfileTraits {
            first_name: customer.first_name,
            last_name: customer.last_name,
        },
        occurred_at: timestamp(payload.created_at.as_deref(), received_at)?,
    }))
}

/// Decodes a customer update payload.
fn decode_customer_update(
    shop: &ShopDomain,
    body: &[u8],
    received_at: Timestamp,
) -> Result<Signal, WebhookError> {
    let payload: CustomerPayload = parse_json(body)?;
    let identity = CustomerIdentity::new(
        payload.id.as_ref().and_then(customer_id),
        payload.email.as_deref().and_then(EmailAddress::parse),
    );
    if identity.is_empty() {
        return Err(WebhookError::InvalidPayload("customer identity missing".to_string()));
    }
    let explicit_status = payload
        .email_marketing_consent
        .as_ref()
        .and_then(|consent| consent.state.as_deref())
        .and_then(ConsentStatus::from_platform_state);
    let region_code = payload
        .default_address
        .as_ref()
        .and_then(|address| address.country_code.as_deref())
        .and_then(RegionCode::parse);
    Ok(Signal::ProfileUpdate(ProfileSignal {
        shop: shop.clone(),
        identity,
        explicit_status,
        region_code,
        occurred_at: timestamp(payload.updated_at.as_deref(), received_at)?,
    }))
}

/// Decodes a marketing consent update payload.
fn decode_consent_update(
    shop: &ShopDomain,
    body: &[u8],
    received_at: Timestamp,
) -> Result<Signal, WebhookError> {
    let payload: MarketingConsentPayload = parse_json(body)?;
    let identity = CustomerIdentity::new(
        payload.customer_id.as_ref().and_then(customer_id),
        payload.email_address.as_deref().and_then(EmailAddress::parse),
    );
    if identity.is_empty() {
        return Err(WebhookError::InvalidPayload("customer identity missing".to_string()));
    }
    let consent = payload
        .email_marketing_consent
        .ok_or_else(|| WebhookError::InvalidPayload("consent block missing".to_string()))?;
    let status = consent
        .state
        .as_deref()
        .and_then(ConsentStatus::from_platform_state)
        .ok_or_else(|| WebhookError::InvalidPayload("unknown marketing state".to_string()))?;
    Ok(Signal::PlatformConsent(ConsentSignal {
        shop: shop.clone(),
        identity,
        status,
        confirmation: consent.opt_in_level.as_deref().and_then(ConfirmationStrength::parse),
        region_code: None,
        traits: ProfileTraits::default(),
        occurred_at: timestamp(consent.consent_updated_at.as_deref(), received_at)?,
    }))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a JSON body.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, WebhookError> {
    serde_json::from_slice(body).map_err(|err| WebhookError::InvalidPayload(err.to_string()))
}

/// Reads a numeric or string identifier as text.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}

/// Reads a customer id from a number, decimal string, or global id.
fn customer_id(value: &Value) -> Option<CustomerId> {
    match value {
        Value::Number(number) => number.as_u64().filter(|id| *id > 0).map(CustomerId::new),
        Value::String(text) => CustomerId::parse(text),
        _ => None,
    }
}

/// Reads a count from a number or decimal string.
fn count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Parses an optional RFC 3339 time, falling back to the receipt time.
fn timestamp(raw: Option<&str>, received_at: Timestamp) -> Result<Timestamp, WebhookError> {
    match raw.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => Timestamp::parse_rfc3339(text)
            .map_err(|err| WebhookError::InvalidPayload(err.to_string())),
        None => Ok(received_at),
    }
}
