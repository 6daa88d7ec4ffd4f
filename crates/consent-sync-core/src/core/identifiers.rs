// crates/consent-sync-core/src/core/identifiers.rs
// ============================================================================
// Module: Consent Sync Identifiers
// Description: Strongly typed identifiers for shops, customers, and sessions.
// Purpose: Normalize external identifiers once at the boundary.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers arrive from storefront scripts, platform webhooks, and bulk
//! imports in slightly different shapes. The constructors here normalize them
//! (lowercased emails and shop domains, uppercased region codes, numeric
//! customer ids extracted from `gid://` references) so the store sees a single
//! canonical form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: String Identifiers
// ============================================================================

/// Shop identifier (the shop's platform domain, lowercased).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Creates a shop domain, trimming and lowercasing the input.
    #[must_use]
    pub fn new(domain: impl AsRef<str>) -> Self {
        Self(domain.as_ref().trim().to_ascii_lowercase())
    }

    /// Returns the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the domain is empty after normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ShopDomain {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Normalized email address.
///
/// # Invariants
/// - Lowercase, trimmed, and contains a non-empty local part and domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses and normalizes an email address.
    ///
    /// Returns `None` for empty or obviously malformed input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        let (local, domain) = normalized.split_once('@')?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return None;
        }
        if normalized.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(normalized))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Checkout session identifier minted at policy resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new session identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Platform checkout token; the join key between storefront and order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutToken(String);

impl CheckoutToken {
    /// Creates a new checkout token.
    #[must_use]
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(token.as_ref().trim().to_string())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckoutToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Platform order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Creates a new order identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Region code (ISO country code or subdivision such as `US-CA`), uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    /// Parses a region code.
    ///
    /// Accepts 2 to 8 ASCII letters, digits, or hyphens. Returns `None` otherwise.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let valid_len = (2 ..= 8).contains(&trimmed.len());
        let valid_chars = trimmed.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if !valid_len || !valid_chars || trimmed.starts_with('-') {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Numeric Identifiers
// ============================================================================

/// Prefix used by platform global identifiers for customers.
const CUSTOMER_GID_PREFIX: &str = "gid://shopify/Customer/";

/// Platform customer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(u64);

impl CustomerId {
    /// Creates a customer identifier from its numeric form.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Parses a numeric id or a `gid://shopify/Customer/<n>` reference.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix(CUSTOMER_GID_PREFIX).unwrap_or(trimmed);
        digits.parse::<u64>().ok().filter(|value| *value > 0).map(Self)
    }

    /// Returns the raw numeric identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the platform global identifier for this customer.
    #[must_use]
    pub fn to_gid(self) -> String {
        format!("{CUSTOMER_GID_PREFIX}{}", self.0)
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Store-assigned key for a customer consent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerKey(i64);

impl CustomerKey {
    /// Creates a key from its raw store value.
    #[must_use]
    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    /// Returns the raw store value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Store-assigned consent event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(i64);

impl EventId {
    /// Creates an event id from its raw store value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw store value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Customer Identity
// ============================================================================

/// Partial customer identity carried by a signal.
///
/// Either field may be absent; a signal with neither is a data error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    /// Platform customer id, when known.
    pub customer_id: Option<CustomerId>,
    /// Normalized email, when known.
    pub email: Option<EmailAddress>,
}

impl CustomerIdentity {
    /// Creates an identity from optional parts.
    #[must_use]
    pub const fn new(customer_id: Option<CustomerId>, email: Option<EmailAddress>) -> Self {
        Self {
            customer_id,
            email,
        }
    }

    /// Returns true when neither identifier is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.email.is_none()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
