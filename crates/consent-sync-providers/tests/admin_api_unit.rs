// crates/consent-sync-providers/tests/admin_api_unit.rs
// ============================================================================
// Module: Admin API Client Tests
// Description: Request shape and error classification for the platform client.
// Purpose: Pin the GraphQL calls and the retry/reject split.
// Dependencies: consent-sync-providers, tiny_http
// ============================================================================

//! ## Overview
//! Drives [`AdminApiPlatform`] against a scripted local server: request
//! headers and variables, order counts, consent mutation user errors, and
//! transport versus rejection classification.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]
#![allow(dead_code, reason = "Common module may have unused helpers.")]

mod common;

use consent_sync_core::CommercePlatform;
use consent_sync_core::ConfirmationStrength;
use consent_sync_core::ConsentMutation;
use consent_sync_core::ConsentStatus;
use consent_sync_core::CustomerId;
use consent_sync_core::EmailAddress;
use consent_sync_core::PlatformError;
use consent_sync_core::ShopDomain;
use consent_sync_core::Timestamp;
use consent_sync_providers::AdminApiConfig;
use consent_sync_providers::AdminApiPlatform;

use crate::common::StubReply;
use crate::common::StubServer;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Shop used throughout.
fn shop() -> ShopDomain {
    ShopDomain::new("demo.myshopify.com")
}

/// Builds a client pointed at the stub server.
fn platform(server: &StubServer) -> AdminApiPlatform {
    let config = AdminApiConfig {
        base_url_override: Some(server.base_url.clone()),
        timeout_ms: 5_000,
        ..AdminApiConfig::default()
    };
    AdminApiPlatform::new(config, [(shop(), "shpat_test".to_string())]).unwrap()
}

/// Consent mutation used by the write tests.
fn mutation() -> ConsentMutation {
    ConsentMutation {
        status: ConsentStatus::Subscribed,
        confirmation: ConfirmationStrength::Confirmed,
        occurred_at: Timestamp::from_unix_millis(1_700_000_000_000),
    }
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Verifies the order count query shape and numeric decoding.
#[test]
fn order_count_reads_number_of_orders() {
    let server = StubServer::start(vec![StubReply::new(
        200,
        r#"{"data":{"customer":{"numberOfOrders":"3"}}}"#,
    )]);
    let client = platform(&server);
    let count = client.customer_order_count(&shop(), CustomerId::new(42)).unwrap();
    assert_eq!(count, Some(3));

    let requests = server.finish();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.url, "/admin/api/2025-01/graphql.json");
    assert_eq!(
        request.headers.get("x-shopify-access-token").map(String::as_str),
        Some("shpat_test")
    );
    let body = request.json();
    assert_eq!(body["variables"]["id"], "gid://shopify/Customer/42");
    assert!(body["query"].as_str().unwrap().contains("numberOfOrders"));
}

/// Verifies a null customer is reported as missing.
#[test]
fn order_count_for_missing_customer_is_an_error() {
    let server = StubServer::start(vec![StubReply::new(200, r#"{"data":{"customer":null}}"#)]);
    let client = platform(&server);
    let err = client.customer_order_count(&shop(), CustomerId::new(7)).unwrap_err();
    assert!(matches!(err, PlatformError::MissingCustomer(_)));
    server.finish();
}

/// Verifies an unconfigured shop never reaches the network.
#[test]
fn unknown_shop_is_rejected_locally() {
    let server = StubServer::start(Vec::new());
    let client = platform(&server);
    let other = ShopDomain::new("other.myshopify.com");
    assert!(!client.knows_shop(&other));
    let err = client.customer_order_count(&other, CustomerId::new(1)).unwrap_err();
    assert!(matches!(err, PlatformError::UnknownShop(_)));
    assert!(server.finish().is_empty());
}

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Verifies the consent mutation carries state, opt-in level and consent time.
#[test]
fn consent_mutation_sends_state_level_and_time() {
    let server = StubServer::start(vec![StubReply::new(
        200,
        r#"{"data":{"customerEmailMarketingConsentUpdate":{"userErrors":[]}}}"#,
    )]);
    let client = platform(&server);
    client.update_marketing_consent(&shop(), CustomerId::new(42), &mutation()).unwrap();

    let requests = server.finish();
    let body = requests[0].json();
    let input = &body["variables"]["input"];
    assert_eq!(input["customerId"], "gid://shopify/Customer/42");
    let consent = &input["emailMarketingConsent"];
    assert_eq!(consent["marketingState"], "SUBSCRIBED");
    assert_eq!(consent["marketingOptInLevel"], "CONFIRMED_OPT_IN");
    assert!(consent["consentUpdatedAt"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
}

/// Verifies user errors naming the email become an email conflict.
#[test]
fn email_user_error_is_an_email_conflict() {
    let server = StubServer::start(vec![StubReply::new(
        200,
        r#"{"data":{"customerEmailMarketingConsentUpdate":{"userErrors":[
            {"field":["input","email"],"message":"Email has already been taken"}]}}}"#,
    )]);
    let client = platform(&server);
    let err = client.update_marketing_consent(&shop(), CustomerId::new(42), &mutation());
    assert!(matches!(err, Err(PlatformError::EmailConflict(_))));
    server.finish();
}

/// Verifies other user errors are rejections.
#[test]
fn other_user_error_is_rejected() {
    let server = StubServer::start(vec![StubReply::new(
        200,
        r#"{"data":{"customerEmailMarketingConsentUpdate":{"userErrors":[
            {"field":["input","customerId"],"message":"Customer is locked"}]}}}"#,
    )]);
    let client = platform(&server);
    let err = client.update_marketing_consent(&shop(), CustomerId::new(42), &mutation());
    assert_eq!(err, Err(PlatformError::Rejected("Customer is locked".to_string())));
    server.finish();
}

/// Verifies the email update mutation payload.
#[test]
fn set_customer_email_sends_email() {
    let server = StubServer::start(vec![StubReply::new(
        200,
        r#"{"data":{"customerUpdate":{"userErrors":[]}}}"#,
    )]);
    let client = platform(&server);
    let email = EmailAddress::parse("New@Example.com").unwrap();
    client.set_customer_email(&shop(), CustomerId::new(42), &email).unwrap();
    let requests = server.finish();
    let body = requests[0].json();
    assert_eq!(body["variables"]["input"]["email"], email.as_str());
    assert_eq!(body["variables"]["input"]["id"], "gid://shopify/Customer/42");
}

// ============================================================================
// SECTION: Failure Classification
// ============================================================================

/// Verifies 5xx and 429 are transport failures.
#[test]
fn server_errors_and_rate_limits_are_transport() {
    let server = StubServer::start(vec![
        StubReply::new(503, "{}"),
        StubReply::new(429, "{}"),
    ]);
    let client = platform(&server);
    let first = client.customer_order_count(&shop(), CustomerId::new(1)).unwrap_err();
    let second = client.customer_order_count(&shop(), CustomerId::new(1)).unwrap_err();
    assert!(matches!(first, PlatformError::Transport(_)));
    assert!(matches!(second, PlatformError::Transport(_)));
    server.finish();
}

/// Verifies throttled GraphQL errors are transport and others are rejections.
#[test]
fn top_level_errors_are_classified() {
    let server = StubServer::start(vec![
        StubReply::new(
            200,
            r#"{"errors":[{"message":"Throttled","extensions":{"code":"THROTTLED"}}]}"#,
        ),
        StubReply::new(200, r#"{"errors":[{"message":"Access denied"}]}"#),
    ]);
    let client = platform(&server);
    let first = client.customer_order_count(&shop(), CustomerId::new(1)).unwrap_err();
    let second = client.customer_order_count(&shop(), CustomerId::new(1)).unwrap_err();
    assert!(matches!(first, PlatformError::Transport(_)));
    assert_eq!(second, PlatformError::Rejected("Access denied".to_string()));
    server.finish();
}

/// Verifies 4xx responses are rejections.
#[test]
fn client_errors_are_rejected() {
    let server = StubServer::start(vec![StubReply::new(401, r#"{"errors":"bad token"}"#)]);
    let client = platform(&server);
    let err = client.customer_order_count(&shop(), CustomerId::new(1)).unwrap_err();
    assert!(matches!(err, PlatformError::Rejected(message) if message.starts_with("status 401")));
    server.finish();
}

/// Verifies a non-JSON success body is an invalid response.
#[test]
fn malformed_body_is_invalid_response() {
    let server = StubServer::start(vec![StubReply::new(200, "not json")]);
    let client = platform(&server);
    let err = client.customer_order_count(&shop(), CustomerId::new(1)).unwrap_err();
    assert!(matches!(err, PlatformError::InvalidResponse(_)));
    server.finish();
}
