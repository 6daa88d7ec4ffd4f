// crates/consent-sync-server/src/storefront.rs
// ============================================================================
// Module: Storefront Payloads
// Description: Request decoding for the checkout widget endpoints.
// Purpose: Validate untrusted storefront input before it reaches the engine.
// Dependencies: consent-sync-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The checkout widget calls two endpoints: one to fetch the consent policy
//! and open a session, one to report checkbox toggles. Both bodies are JSON.
//! Client addresses come from the first `X-Forwarded-For` entry when present,
//! otherwise from the TCP peer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::SocketAddr;

use axum::http::HeaderMap;
use consent_sync_core::CheckoutToken;
use consent_sync_core::ConsentStatus;
use consent_sync_core::CustomerId;
use consent_sync_core::PolicyRequest;
use consent_sync_core::RegionCode;
use consent_sync_core::SessionId;
use consent_sync_core::ShopDomain;
use consent_sync_core::Timestamp;
use consent_sync_core::ToggleSignal;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum stored length of consent display text.
pub const MAX_DISPLAY_TEXT_CHARS: usize = 4_096;
/// Maximum accepted length of checkout tokens and session ids.
pub const MAX_TOKEN_CHARS: usize = 256;

// ============================================================================
// SECTION: Policy Request
// ============================================================================

/// Body of `POST /storefront/consent-policy`.
#[derive(Debug, Deserialize)]
pub struct PolicyPayload {
    /// Requesting shop domain.
    pub shop: String,
    /// Opaque per-checkout token.
    pub checkout_token: String,
    /// Region code the storefront already knows.
    #[serde(default)]
    pub region_code: Option<String>,
    /// Country name the storefront already knows.
    #[serde(default)]
    pub country_name: Option<String>,
    /// Logged-in customer id (numeric or global id).
    #[serde(default)]
    pub customer_id: Option<Value>,
    /// Order count the storefront reports for the customer.
    #[serde(default)]
    pub order_count: Option<u64>,
    /// Consent text the widget will display.
    #[serde(default)]
    pub display_text: Option<String>,
}

impl PolicyPayload {
    /// Converts the payload into an engine request.
    ///
    /// # Errors
    ///
    /// Returns a message when a required field is empty or oversized.
    pub fn into_request(self, client_ip: Option<IpAddr>) -> Result<PolicyRequest, String> {
        let shop = ShopDomain::new(&self.shop);
        if shop.is_empty() {
            return Err("shop is required".to_string());
        }
        let token = bounded_token("checkout_token", &self.checkout_token)?;
        let customer_id = match self.customer_id {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => {
                number.as_u64().filter(|id| *id > 0).map(CustomerId::new)
            }
            Some(Value::String(text)) => CustomerId::parse(&text),
            Some(_) => return Err("customer_id must be a number or string".to_string()),
        };
        Ok(PolicyRequest {
            shop,
            checkout_token: CheckoutToken::new(token),
            region_code: self.region_code.as_deref().and_then(RegionCode::parse),
            country_name: self.country_name.filter(|name| !name.trim().is_empty()),
            client_ip,
            customer_id,
            order_count: self.order_count,
            display_text: display_text(self.display_text),
        })
    }
}

// ============================================================================
// SECTION: Toggle Event
// ============================================================================

/// Body of `POST /storefront/consent-events`.
#[derive(Debug, Deserialize)]
pub struct TogglePayload {
    /// Session id returned by the policy endpoint.
    pub session_id: String,
    /// Resulting tri-state after the interaction.
    pub status: String,
    /// Consent text displayed at the time.
    #[serde(default)]
    pub display_text: Option<String>,
    /// Client event time (RFC 3339); the receipt time when absent.
    #[serde(default)]
    pub occurred_at: Option<String>,
}

impl TogglePayload {
    /// Converts the payload into a toggle signal.
    ///
    /// # Errors
    ///
    /// Returns a message when the session id, status, or time is invalid.
    pub fn into_signal(self, received_at: Timestamp) -> Result<ToggleSignal, String> {
        let session_id = bounded_token("session_id", &self.session_id)?;
        let status = ConsentStatus::parse(&self.status.trim().to_ascii_uppercase())
            .ok_or_else(|| format!("unknown status: {}", self.status.trim()))?;
        let occurred_at = match self.occurred_at.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                Timestamp::parse_rfc3339(text).map_err(|err| err.to_string())?
            }
            _ => received_at,
        };
        Ok(ToggleSignal {
            session_id: SessionId::new(session_id),
            status,
            display_text: display_text(self.display_text),
            occurred_at,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the client address from proxy headers or the TCP peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    forwarded.or_else(|| peer.map(|addr| addr.ip()))
}

/// Trims a token and checks it is non-empty and bounded.
fn bounded_token<'a>(field: &str, raw: &'a str) -> Result<&'a str, String> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(format!("{field} is required"));
    }
    if token.chars().count() > MAX_TOKEN_CHARS {
        return Err(format!("{field} is too long"));
    }
    Ok(token)
}

/// Drops blank display text and truncates oversized text.
fn display_text(raw: Option<String>) -> Option<String> {
    let text = raw?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_DISPLAY_TEXT_CHARS).collect())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::net::IpAddr;
    use std::net::SocketAddr;

    use axum::http::HeaderMap;
    use axum::http::HeaderValue;
    use consent_sync_core::ConsentStatus;
    use consent_sync_core::CustomerId;
    use consent_sync_core::Timestamp;

    use super::PolicyPayload;
    use super::TogglePayload;
    use super::client_ip;

    /// Verifies the forwarded header wins over the peer address.
    #[test]
    fn client_ip_prefers_forwarded_header() {
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), Some(peer.ip()));
        headers.insert("x-forwarded-for", HeaderValue::from_static("81.2.69.160, 10.0.0.1"));
        let expected: IpAddr = "81.2.69.160".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), Some(expected));
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        assert_eq!(client_ip(&headers, Some(peer)), Some(peer.ip()));
    }

    /// Verifies customer ids accept numbers and global ids.
    #[test]
    fn policy_payload_reads_customer_ids() {
        let payload: PolicyPayload = serde_json::from_str(
            r#"{"shop":"Demo.myshopify.com","checkout_token":" tok ",
                "customer_id":"gid://shopify/Customer/42","region_code":"de"}"#,
        )
        .unwrap();
        let request = payload.into_request(None).unwrap();
        assert_eq!(request.shop.as_str(), "demo.myshopify.com");
        assert_eq!(request.checkout_token.as_str(), "tok");
        assert_eq!(request.customer_id, Some(CustomerId::new(42)));
        assert_eq!(request.region_code.unwrap().as_str(), "DE");

        let payload: PolicyPayload =
            serde_json::from_str(r#"{"shop":"demo","checkout_token":"","customer_id":7}"#)
                .unwrap();
        assert_eq!(payload.into_request(None).unwrap_err(), "checkout_token is required");
    }

    /// Verifies toggle status parsing and time fallback.
    #[test]
    fn toggle_payload_defaults_time() {
        let received = Timestamp::from_unix_millis(1_000);
        let payload: TogglePayload =
            serde_json::from_str(r#"{"session_id":"s1","status":"subscribed"}"#).unwrap();
        let signal = payload.into_signal(received).unwrap();
        assert_eq!(signal.status, ConsentStatus::Subscribed);
        assert_eq!(signal.occurred_at, received);

        let payload: TogglePayload = serde_json::from_str(
            r#"{"session_id":"s1","status":"NOT_SUBSCRIBED","occurred_at":"not a time"}"#,
        )
        .unwrap();
        assert!(payload.into_signal(received).is_err());

        let payload: TogglePayload =
            serde_json::from_str(r#"{"session_id":"s1","status":"maybe"}"#).unwrap();
        assert_eq!(payload.into_signal(received).unwrap_err(), "unknown status: maybe");
    }
}
