// crates/consent-sync-core/tests/checkout_flow.rs
// ============================================================================
// Module: Checkout Flow Tests
// Description: Storefront sessions, checkbox toggles, and order completion.
// Purpose: Validate how checkout intent becomes stored consent.
// Dependencies: consent-sync-core
// ============================================================================
//! ## Overview
//! Drives the engine through policy lookup, toggles, and order webhooks and
//! checks stored consent, audit events, and synchronizer calls.

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

use std::time::Duration;

use common::DOUBLE_LIST;
use common::Harness;
use common::SINGLE_LIST;
use common::at;
use common::default_config;
use common::identity;
use common::order;
use common::policy_request;
use consent_sync_core::CheckoutToken;
use consent_sync_core::ConfirmationStrength;
use consent_sync_core::ConsentEventKind;
use consent_sync_core::ConsentStatus;
use consent_sync_core::ConsentStore;
use consent_sync_core::CustomerId;
use consent_sync_core::CustomerIdentity;
use consent_sync_core::CustomerSegment;
use consent_sync_core::EventEffect;
use consent_sync_core::PlatformError;
use consent_sync_core::PolicyRule;
use consent_sync_core::PresentationMode;
use consent_sync_core::RegionCode;
use consent_sync_core::SessionId;
use consent_sync_core::Signal;
use consent_sync_core::ToggleReport;
use consent_sync_core::ToggleSignal;
use consent_sync_core::runtime::EmailSyncOutcome;
use consent_sync_core::runtime::PolicyMatch;
use consent_sync_core::runtime::PushOutcome;

fn toggle(session: &str, status: ConsentStatus, offset: i64) -> ToggleSignal {
    ToggleSignal {
        session_id: SessionId::new(session),
        status,
        display_text: None,
        occurred_at: at(offset),
    }
}

/// Verifies the policy grant reflects the region row and the session is reused.
#[test]
fn policy_grant_opens_and_refreshes_session() {
    let harness = Harness::new();
    let grant = harness.engine.open_session(&policy_request("tok-1", "DE")).unwrap();
    assert_eq!(grant.presentation, PresentationMode::OptIn);
    assert_eq!(grant.confirmation, ConfirmationStrength::Confirmed);
    assert_eq!(grant.matched, PolicyMatch::RegionCode);
    assert_eq!(grant.session_id, SessionId::new("sess-1"));

    let again = harness.engine.open_session(&policy_request("tok-1", "DE")).unwrap();
    assert_eq!(again.session_id, grant.session_id);

    let unknown = harness.engine.open_session(&policy_request("tok-2", "ZZ")).unwrap();
    assert_eq!(unknown.matched, PolicyMatch::Default);
    assert_eq!(unknown.presentation, PresentationMode::OptOut);
    assert_eq!(unknown.region.as_ref().map(|region| region.as_str()), Some("GB"));
}

/// Verifies an explicit opt-in becomes subscribed and is pushed everywhere.
#[test]
fn opt_in_toggle_subscribes_on_order() {
    let harness = Harness::new();
    harness.engine.open_session(&policy_request("tok-1", "DE")).unwrap();
    let first = harness.engine.record_toggle(&toggle("sess-1", ConsentStatus::Subscribed, 1_000));
    assert_eq!(
        first.unwrap(),
        ToggleReport::Recorded {
            duplicate: false
        }
    );
    let replay = harness.engine.record_toggle(&toggle("sess-1", ConsentStatus::Subscribed, 1_000));
    assert_eq!(
        replay.unwrap(),
        ToggleReport::Recorded {
            duplicate: true
        }
    );

    let signal = order("1001", Some("tok-1"), identity(7, "a@example.com"), 5_000);
    let report = harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();
    assert_eq!(report.effect, EventEffect::Applied);
    assert_eq!(report.commerce, Some(PushOutcome::Pushed));
    let email = report.email.expect("email sync ran");
    assert_eq!(
        email.outcome,
        EmailSyncOutcome::Subscribed {
            list: DOUBLE_LIST.to_string()
        }
    );

    let record = harness.record(7);
    assert_eq!(record.status, ConsentStatus::Subscribed);
    assert_eq!(record.last_source, Some(ConsentEventKind::CheckoutCompleted));
    assert_eq!(record.fence.map(|fence| fence.expected), Some(ConsentStatus::Subscribed));
    assert_eq!(harness.platform.consent_pushes(), vec![(7, ConsentStatus::Subscribed)]);

    let events = harness.store.events_for_customer(record.key).unwrap();
    assert_eq!(events.len(), 2, "toggle is backfilled onto the customer");
    assert!(events.iter().any(|event| event.kind == ConsentEventKind::CheckoutToggle));
}

/// Verifies an untouched opt-out checkbox subscribes on the single list.
#[test]
fn untouched_opt_out_defaults_to_subscribed() {
    let harness = Harness::new();
    harness.engine.open_session(&policy_request("tok-1", "US")).unwrap();
    let signal = order("1001", Some("tok-1"), identity(7, "a@example.com"), 5_000);
    let report = harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();
    assert_eq!(report.status, Some(ConsentStatus::Subscribed));
    assert_eq!(
        report.email.map(|email| email.outcome),
        Some(EmailSyncOutcome::Subscribed {
            list: SINGLE_LIST.to_string()
        })
    );
}

/// Verifies an untouched opt-in checkbox leaves the customer not subscribed.
#[test]
fn untouched_opt_in_stays_not_subscribed() {
    let harness = Harness::new();
    harness.engine.open_session(&policy_request("tok-1", "DE")).unwrap();
    let signal = order("1001", Some("tok-1"), identity(7, "a@example.com"), 5_000);
    let report = harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();
    assert_eq!(report.effect, EventEffect::Unchanged);
    assert!(report.commerce.is_none());
    assert!(report.email.is_none());
    assert_eq!(harness.record(7).status, ConsentStatus::NotSubscribed);
    assert!(harness.platform.consent_pushes().is_empty());
    assert!(harness.email.list_calls().is_empty());
}

/// Verifies the toggle with the latest event time wins regardless of arrival.
#[test]
fn latest_toggle_by_event_time_wins() {
    let harness = Harness::new();
    harness.engine.open_session(&policy_request("tok-1", "DE")).unwrap();
    harness.engine.record_toggle(&toggle("sess-1", ConsentStatus::Subscribed, 3_000)).unwrap();
    harness.engine.record_toggle(&toggle("sess-1", ConsentStatus::NotSubscribed, 2_000)).unwrap();
    let session = harness.store.load_session(&SessionId::new("sess-1")).unwrap().unwrap();
    assert_eq!(session.intended, Some(ConsentStatus::Subscribed));

    let signal = order("1001", Some("tok-1"), identity(7, "a@example.com"), 5_000);
    harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();
    assert_eq!(harness.record(7).status, ConsentStatus::Subscribed);
}

/// Verifies toggles after completion and for unknown sessions are ignored.
#[test]
fn late_and_unknown_toggles_are_ignored() {
    let harness = Harness::new();
    harness.engine.open_session(&policy_request("tok-1", "US")).unwrap();
    let signal = order("1001", Some("tok-1"), identity(7, "a@example.com"), 5_000);
    harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();

    let late = harness.engine.record_toggle(&toggle("sess-1", ConsentStatus::NotSubscribed, 6_000));
    assert_eq!(late.unwrap(), ToggleReport::SessionClosed);
    assert_eq!(harness.record(7).status, ConsentStatus::Subscribed);
    let events = harness.store.events_for_session(&SessionId::new("sess-1")).unwrap();
    assert!(events.iter().any(|event| event.effect == EventEffect::Rejected));

    let unknown = harness.engine.record_toggle(&toggle("missing", ConsentStatus::Subscribed, 1));
    assert_eq!(unknown.unwrap(), ToggleReport::UnknownSession);
}

/// Verifies a replayed order webhook changes nothing and pushes nothing.
#[test]
fn replayed_order_is_idempotent() {
    let harness = Harness::new();
    harness.engine.open_session(&policy_request("tok-1", "US")).unwrap();
    let signal = order("1001", Some("tok-1"), identity(7, "a@example.com"), 5_000);
    let first = harness.engine.reconcile(&Signal::CheckoutCompleted(signal.clone())).unwrap();
    assert_eq!(first.effect, EventEffect::Applied);
    let replay = harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();
    assert_eq!(replay.effect, EventEffect::Unchanged);
    assert!(replay.commerce.is_none());
    assert_eq!(harness.platform.consent_pushes().len(), 1);
}

/// Verifies orders without a session, a matching session, or identity are rejected.
#[test]
fn unmatched_orders_leave_consent_alone() {
    let harness = Harness::new();
    let orphan = order("1001", Some("nope"), identity(7, "a@example.com"), 5_000);
    let report = harness.engine.reconcile(&Signal::CheckoutCompleted(orphan)).unwrap();
    assert_eq!(report.effect, EventEffect::NoSession);
    assert!(report.customer_key.is_none());

    harness.engine.open_session(&policy_request("tok-1", "US")).unwrap();
    let first = order("1001", Some("tok-1"), identity(7, "a@example.com"), 5_000);
    harness.engine.reconcile(&Signal::CheckoutCompleted(first)).unwrap();
    let other = order("2002", Some("tok-1"), identity(7, "a@example.com"), 6_000);
    let report = harness.engine.reconcile(&Signal::CheckoutCompleted(other)).unwrap();
    assert_eq!(report.effect, EventEffect::Rejected);

    harness.engine.open_session(&policy_request("tok-2", "US")).unwrap();
    let anonymous = order("3003", Some("tok-2"), CustomerIdentity::default(), 7_000);
    let report = harness.engine.reconcile(&Signal::CheckoutCompleted(anonymous)).unwrap();
    assert_eq!(report.effect, EventEffect::Rejected);
}

/// Verifies pruning removes abandoned sessions and their orphan toggles only.
#[test]
fn prune_removes_abandoned_sessions() {
    let harness = Harness::new();
    harness.engine.open_session(&policy_request("tok-1", "DE")).unwrap();
    harness.engine.record_toggle(&toggle("sess-1", ConsentStatus::Subscribed, 1_000)).unwrap();
    harness.engine.open_session(&policy_request("tok-2", "US")).unwrap();
    let signal = order("1001", Some("tok-2"), identity(7, "a@example.com"), 5_000);
    harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();

    harness.clock.advance(Duration::from_secs(25 * 3_600));
    let report = harness.engine.prune_sessions(Duration::from_secs(24 * 3_600)).unwrap();
    assert_eq!(report.sessions, 1);
    assert_eq!(report.events, 1);
    assert!(harness.store.load_session(&SessionId::new("sess-1")).unwrap().is_none());
    assert!(harness.store.load_session(&SessionId::new("sess-2")).unwrap().is_some());
}

/// Verifies a failed order-count lookup resolves the wildcard row and is logged.
#[test]
fn order_count_failure_falls_back_to_wildcard_rule() {
    let rule = |segment, presentation, confirmation| PolicyRule {
        region_code: RegionCode::parse("DE"),
        region_name: None,
        segment,
        presentation,
        confirmation,
    };
    let rules = vec![
        rule(None, PresentationMode::OptIn, ConfirmationStrength::Confirmed),
        rule(
            Some(CustomerSegment::Returning),
            PresentationMode::OptOut,
            ConfirmationStrength::Single,
        ),
    ];
    let harness = Harness::with_config(rules, default_config());
    let mut request = policy_request("tok-1", "DE");
    request.customer_id = Some(CustomerId::new(7));
    request.order_count = None;

    let returning = harness.engine.open_session(&request).unwrap();
    assert_eq!(returning.segment, Some(CustomerSegment::Returning));
    assert_eq!(returning.presentation, PresentationMode::OptOut);

    harness.platform.fail_next_order_count(PlatformError::Transport("timeout".to_string()));
    request.checkout_token = CheckoutToken::new("tok-2");
    let grant = harness.engine.open_session(&request).unwrap();
    assert_eq!(grant.segment, None);
    assert_eq!(grant.presentation, PresentationMode::OptIn);
    assert_eq!(grant.confirmation, ConfirmationStrength::Confirmed);

    harness.engine.record_toggle(&toggle("sess-2", ConsentStatus::Subscribed, 1_000)).unwrap();
    harness.platform.fail_next_order_count(PlatformError::Transport("timeout".to_string()));
    let mut signal = order("1001", Some("tok-2"), identity(7, "a@example.com"), 5_000);
    signal.orders_including_current = None;
    let report = harness.engine.reconcile(&Signal::CheckoutCompleted(signal)).unwrap();
    assert_eq!(report.effect, EventEffect::Applied);
    let unknown = harness
        .log
        .stages()
        .into_iter()
        .filter(|(stage, outcome)| stage == "segment" && outcome == "unknown")
        .count();
    assert_eq!(unknown, 2);
}
