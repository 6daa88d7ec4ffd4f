// crates/consent-sync-providers/src/admin_api.rs
// ============================================================================
// Module: Admin API Commerce Platform
// Description: GraphQL admin API client for the commerce platform.
// Purpose: Read order counts and write marketing consent per shop.
// Dependencies: consent-sync-core, reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! [`AdminApiPlatform`] implements [`CommercePlatform`] over the platform's
//! GraphQL admin endpoint, one access token per shop. Failures are classified
//! for the synchronizer:
//! - 429, 5xx, throttling and network errors are [`PlatformError::Transport`];
//! - consent mutation user errors that name the email are
//!   [`PlatformError::EmailConflict`], so the caller can fix the email and
//!   retry once;
//! - every other user error or 4xx is [`PlatformError::Rejected`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use consent_sync_core::CommercePlatform;
use consent_sync_core::ConsentMutation;
use consent_sync_core::CustomerId;
use consent_sync_core::EmailAddress;
use consent_sync_core::PlatformError;
use consent_sync_core::ShopDomain;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use url::Url;

use crate::http::DEFAULT_MAX_RESPONSE_BYTES;
use crate::http::DEFAULT_USER_AGENT;
use crate::http::build_http_client;
use crate::http::execute;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Longest response excerpt kept in error messages.
const ERROR_BODY_LIMIT: usize = 256;
/// Header carrying the shop access token.
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Query for the customer's lifetime order count.
const ORDER_COUNT_QUERY: &str = "query CustomerOrderCount($id: ID!) { \
    customer(id: $id) { numberOfOrders } }";

/// Mutation updating email marketing consent.
const CONSENT_MUTATION: &str = "mutation UpdateEmailConsent(\
    $input: CustomerEmailMarketingConsentUpdateInput!) { \
    customerEmailMarketingConsentUpdate(input: $input) { \
    userErrors { field message } } }";

/// Mutation setting the customer's email.
const SET_EMAIL_MUTATION: &str = "mutation SetCustomerEmail($input: CustomerInput!) { \
    customerUpdate(input: $input) { userErrors { field message } } }";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Admin API client configuration.
///
/// # Invariants
/// - `base_url_override`, when set, is an origin (`scheme://host:port`) used
///   instead of `https://{shop}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdminApiConfig {
    /// Admin API version segment (for example `2025-01`).
    pub api_version: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Origin replacing the shop domain, for local testing.
    pub base_url_override: Option<String>,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
}

impl Default for AdminApiConfig {
    fn default() -> Self {
        Self {
            api_version: "2025-01".to_string(),
            timeout_ms: 10_000,
            base_url_override: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Commerce platform client backed by the GraphQL admin API.
pub struct AdminApiPlatform {
    /// Client configuration.
    config: AdminApiConfig,
    /// Access tokens keyed by shop domain.
    tokens: BTreeMap<String, String>,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl AdminApiPlatform {
    /// Creates a client for the given shops and their access tokens.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Rejected`] when the override URL is invalid
    /// or the HTTP client cannot be built.
    pub fn new(
        config: AdminApiConfig,
        shops: impl IntoIterator<Item = (ShopDomain, String)>,
    ) -> Result<Self, PlatformError> {
        if let Some(base) = &config.base_url_override {
            Url::parse(base)
                .map_err(|err| PlatformError::Rejected(format!("invalid base url: {err}")))?;
        }
        let client = build_http_client(config.timeout_ms, &config.user_agent)
            .map_err(PlatformError::Rejected)?;
        let tokens =
            shops.into_iter().map(|(shop, token)| (shop.as_str().to_string(), token)).collect();
        Ok(Self {
            config,
            tokens,
            client,
        })
    }

    /// Returns true when credentials exist for `shop`.
    #[must_use]
    pub fn knows_shop(&self, shop: &ShopDomain) -> bool {
        self.tokens.contains_key(shop.as_str())
    }

    /// Returns the GraphQL endpoint for a shop.
    fn endpoint(&self, shop: &ShopDomain) -> Result<Url, PlatformError> {
        let base = match &self.config.base_url_override {
            Some(base) => Url::parse(base),
            None => Url::parse(&format!("https://{shop}")),
        }
        .map_err(|err| PlatformError::UnknownShop(format!("{shop}: {err}")))?;
        if self.config.base_url_override.is_none() && base.host_str() != Some(shop.as_str()) {
            return Err(PlatformError::UnknownShop(format!("invalid shop domain: {shop}")));
        }
        let path = format!("admin/api/{}/graphql.json", self.config.api_version);
        base.join(&path).map_err(|err| PlatformError::Rejected(format!("endpoint: {err}")))
    }

    /// Executes a GraphQL document and returns its `data` object.
    fn graphql(
        &self,
        shop: &ShopDomain,
        query: &str,
        variables: Value,
    ) -> Result<Value, PlatformError> {
        let token = self
            .tokens
            .get(shop.as_str())
            .ok_or_else(|| PlatformError::UnknownShop(shop.to_string()))?;
        let url = self.endpoint(shop)?;
        let body = serde_json::to_vec(&json!({ "query": query, "variables": variables }))
            .map_err(|err| PlatformError::Rejected(format!("request encoding: {err}")))?;
        let request = self
            .client
            .post(url.as_str())
            .header(ACCESS_TOKEN_HEADER, token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body);
        let reply =
            execute(request, self.config.max_response_bytes).map_err(PlatformError::Transport)?;
        if reply.is_transient() {
            return Err(PlatformError::Transport(format!("status {}", reply.status)));
        }
        if !reply.is_success() {
            return Err(PlatformError::Rejected(format!(
                "status {}: {}",
                reply.status,
                truncate(&reply.text())
            )));
        }
        let payload: Value = serde_json::from_slice(&reply.body)
            .map_err(|err| PlatformError::InvalidResponse(format!("json: {err}")))?;
        if let Some(errors) = payload.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            return Err(classify_top_level_errors(errors));
        }
        payload
            .get("data")
            .cloned()
            .filter(|data| !data.is_null())
            .ok_or_else(|| PlatformError::InvalidResponse("response missing data".to_string()))
    }
}

impl CommercePlatform for AdminApiPlatform {
    fn customer_order_count(
        &self,
        shop: &ShopDomain,
        customer: CustomerId,
    ) -> Result<Option<u64>, PlatformError> {
        let gid = customer.to_gid();
        let data = self.graphql(shop, ORDER_COUNT_QUERY, json!({ "id": gid }))?;
        let record = data.get("customer").filter(|value| !value.is_null());
        let Some(record) = record else {
            return Err(PlatformError::MissingCustomer(gid));
        };
        Ok(record.get("numberOfOrders").and_then(parse_count))
    }

    fn update_marketing_consent(
        &self,
        shop: &ShopDomain,
        customer: CustomerId,
        mutation: &ConsentMutation,
    ) -> Result<(), PlatformError> {
        let updated_at = mutation
            .occurred_at
            .to_rfc3339()
            .map_err(|err| PlatformError::Rejected(format!("consent time: {err}")))?;
        let variables = json!({
            "input": {
                "customerId": customer.to_gid(),
                "emailMarketingConsent": {
                    "marketingState": mutation.status.as_str(),
                    "marketingOptInLevel": mutation.confirmation.opt_in_level(),
                    "consentUpdatedAt": updated_at,
                },
            },
        });
        let data = self.graphql(shop, CONSENT_MUTATION, variables)?;
        let errors = user_errors(&data, "customerEmailMarketingConsentUpdate")?;
        if errors.is_empty() {
            return Ok(());
        }
        let message = join_user_errors(&errors);
        if errors.iter().any(UserError::concerns_email) {
            return Err(PlatformError::EmailConflict(message));
        }
        Err(PlatformError::Rejected(message))
    }

    fn set_customer_email(
        &self,
        shop: &ShopDomain,
        customer: CustomerId,
        email: &EmailAddress,
    ) -> Result<(), PlatformError> {
        let variables = json!({
            "input": {
                "id": customer.to_gid(),
                "email": email.as_str(),
            },
        });
        let data = self.graphql(shop, SET_EMAIL_MUTATION, variables)?;
        let errors = user_errors(&data, "customerUpdate")?;
        if errors.is_empty() {
            return Ok(());
        }
        Err(PlatformError::Rejected(join_user_errors(&errors)))
    }
}

// ============================================================================
// SECTION: Response Decoding
// ============================================================================

/// Mutation user error.
#[derive(Debug, Clone, Deserialize)]
struct UserError {
    /// Input path of the offending field.
    #[serde(default)]
    field: Option<Vec<String>>,
    /// Human-readable message.
    #[serde(default)]
    message: String,
}

impl UserError {
    /// Returns true when the error names the customer's email.
    fn concerns_email(&self) -> bool {
        let in_field = self
            .field
            .as_ref()
            .is_some_and(|path| path.iter().any(|part| part.eq_ignore_ascii_case("email")));
        in_field || self.message.to_ascii_lowercase().contains("email")
    }
}

/// Extracts `userErrors` from a mutation payload.
fn user_errors(data: &Value, mutation: &str) -> Result<Vec<UserError>, PlatformError> {
    let payload = data
        .get(mutation)
        .filter(|value| !value.is_null())
        .ok_or_else(|| PlatformError::InvalidResponse(format!("{mutation} payload missing")))?;
    match payload.get("userErrors") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(errors) => serde_json::from_value(errors.clone())
            .map_err(|err| PlatformError::InvalidResponse(format!("userErrors: {err}"))),
    }
}

/// Joins user error messages for logs.
fn join_user_errors(errors: &[UserError]) -> String {
    errors.iter().map(|error| error.message.as_str()).collect::<Vec<_>>().join("; ")
}

/// Classifies top-level GraphQL errors.
fn classify_top_level_errors(errors: &[Value]) -> PlatformError {
    let throttled = errors.iter().any(|error| {
        error.pointer("/extensions/code").and_then(Value::as_str) == Some("THROTTLED")
    });
    let message = errors
        .iter()
        .filter_map(|error| error.get("message").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("; ");
    if throttled {
        PlatformError::Transport(format!("throttled: {message}"))
    } else {
        PlatformError::Rejected(message)
    }
}

/// Reads a count that may be encoded as a number or a decimal string.
fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Shortens a response body for error messages.
fn truncate(text: &str) -> String {
    if text.len() <= ERROR_BODY_LIMIT {
        return text.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[.. end])
}
