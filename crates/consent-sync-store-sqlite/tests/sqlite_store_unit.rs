// crates/consent-sync-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Consent Store Unit Tests
// Description: Targeted tests for the SQLite consent store.
// Purpose: Validate path safety, schema versioning, identity merges, ordered
//          writes, toggle deduplication, session linking, and pruning.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` consent store invariants:
//! - Path safety checks and schema version validation
//! - Persistence across reopen
//! - Identity folding with event relinking
//! - Stale writes leave the stored row untouched
//! - Toggle deduplication per (session, kind, event time)
//! - Session completion conflicts and stale session pruning
//! - The reconciliation engine running on a durable store

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
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use consent_sync_core::CheckoutToken;
use consent_sync_core::CommercePlatform;
use consent_sync_core::ConsentEventKind;
use consent_sync_core::ConsentMutation;
use consent_sync_core::ConsentSignal;
use consent_sync_core::ConsentStatus;
use consent_sync_core::ConsentStore;
use consent_sync_core::CustomerDraft;
use consent_sync_core::CustomerId;
use consent_sync_core::CustomerIdentity;
use consent_sync_core::EmailAddress;
use consent_sync_core::EmailProvider;
use consent_sync_core::EmailProviderError;
use consent_sync_core::EngineConfig;
use consent_sync_core::EngineParts;
use consent_sync_core::EventEffect;
use consent_sync_core::EventInsert;
use consent_sync_core::IdentityPlan;
use consent_sync_core::LookupDetail;
use consent_sync_core::ManualClock;
use consent_sync_core::NewConsentEvent;
use consent_sync_core::NoopSyncLogSink;
use consent_sync_core::NullRegionLocator;
use consent_sync_core::OrderId;
use consent_sync_core::OrderLink;
use consent_sync_core::PlatformError;
use consent_sync_core::PolicyResolver;
use consent_sync_core::PresentationMode;
use consent_sync_core::ProfileAttributes;
use consent_sync_core::ProfileTraits;
use consent_sync_core::ProviderProfile;
use consent_sync_core::ReconciliationEngine;
use consent_sync_core::SessionId;
use consent_sync_core::SessionIdGenerator;
use consent_sync_core::SessionOpen;
use consent_sync_core::ShopDomain;
use consent_sync_core::Signal;
use consent_sync_core::StatusWrite;
use consent_sync_core::StoreError;
use consent_sync_core::Timestamp;
use consent_sync_core::WriteOutcome;
use consent_sync_store_sqlite::SqliteConsentStore;
use consent_sync_store_sqlite::SqliteStoreConfig;
use consent_sync_store_sqlite::SqliteStoreError;
use consent_sync_store_sqlite::SqliteStoreMode;
use consent_sync_store_sqlite::SqliteSyncMode;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const SHOP: &str = "demo.myshopify.com";

fn config_for_path(path: PathBuf) -> SqliteStoreConfig {
    SqliteStoreConfig {
        path,
        busy_timeout_ms: 1_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Full,
    }
}

fn store_for(path: &Path) -> SqliteConsentStore {
    SqliteConsentStore::new(config_for_path(path.to_path_buf())).expect("store init")
}

fn shop() -> ShopDomain {
    ShopDomain::new(SHOP)
}

fn at(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

fn draft(id: Option<u64>, email: Option<&str>) -> CustomerDraft {
    CustomerDraft {
        shop: shop(),
        customer_id: id.map(CustomerId::new),
        email: email.and_then(EmailAddress::parse),
        status: ConsentStatus::NotSubscribed,
        last_consent_at: None,
        last_source: None,
        region: None,
    }
}

fn event(
    kind: ConsentEventKind,
    session: Option<&str>,
    customer: Option<consent_sync_core::CustomerKey>,
    occurred: i64,
) -> NewConsentEvent {
    NewConsentEvent {
        shop: shop(),
        kind,
        outcome: Some(ConsentStatus::Subscribed),
        effect: EventEffect::Provisional,
        note: json!({ "source": "test" }),
        session_id: session.map(SessionId::new),
        customer_key: customer,
        occurred_at: at(occurred),
        recorded_at: at(occurred + 5),
    }
}

fn open(store: &SqliteConsentStore, id: &str, token: &str, now: i64) -> SessionId {
    store
        .open_session(&SessionOpen {
            candidate_id: SessionId::new(id),
            shop: shop(),
            checkout_token: CheckoutToken::new(token),
            presentation: PresentationMode::OptIn,
            region: None,
            display_text: Some("Email me".to_string()),
            now: at(now),
        })
        .expect("open session")
        .id
}

// ============================================================================
// SECTION: Path And Schema
// ============================================================================

/// Verifies a directory path is rejected as invalid.
#[test]
fn sqlite_store_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let Err(err) = SqliteConsentStore::new(config_for_path(temp.path().to_path_buf())) else {
        panic!("expected directory path to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

/// Verifies an overlong path component is rejected.
#[test]
fn sqlite_store_rejects_overlong_component() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a".repeat(300));
    let Err(err) = SqliteConsentStore::new(config_for_path(path)) else {
        panic!("expected overlong component to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

/// Verifies a missing parent directory is created.
#[test]
fn sqlite_store_creates_parent_directories() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("dir").join("consent.db");
    let store = store_for(&path);
    store.readiness().unwrap();
    assert!(path.exists());
}

/// Verifies an unknown schema version is refused on open.
#[test]
fn sqlite_store_rejects_schema_version_mismatch() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("consent.db");
    drop(store_for(&path));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = ?1", params![99_i64]).unwrap();
    drop(connection);
    let Err(err) = SqliteConsentStore::new(config_for_path(path)) else {
        panic!("expected version mismatch");
    };
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

/// Verifies undecodable rows surface as corruption.
#[test]
fn sqlite_store_reports_corrupt_rows() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("consent.db");
    let store = store_for(&path);
    let record = store.create_customer(&draft(Some(7), None)).unwrap();
    let connection = Connection::open(&path).unwrap();
    connection
        .execute("UPDATE customers SET status = 'MAYBE' WHERE key = ?1", params![record.key.get()])
        .unwrap();
    drop(connection);
    let err = store.load_customer(record.key).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

// ============================================================================
// SECTION: Customers
// ============================================================================

/// Verifies rows, fences, and events survive a reopen.
#[test]
fn sqlite_store_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("consent.db");
    let key = {
        let store = store_for(&path);
        let record = store.create_customer(&draft(Some(7), Some("a@example.com"))).unwrap();
        let outcome = store
            .write_status(&StatusWrite {
                key: record.key,
                status: ConsentStatus::Subscribed,
                occurred_at: at(1_000),
                source: ConsentEventKind::CheckoutCompleted,
                region: None,
            })
            .unwrap();
        assert!(outcome.is_applied());
        store
            .set_fence(
                record.key,
                Some(consent_sync_core::FenceMarker {
                    until: at(9_000),
                    expected: ConsentStatus::Subscribed,
                }),
            )
            .unwrap();
        let completed = event(ConsentEventKind::CheckoutCompleted, None, Some(record.key), 1_000);
        store.append_event(&completed).unwrap();
        record.key
    };
    let store = store_for(&path);
    let record = store.load_customer(key).unwrap().expect("row persisted");
    assert_eq!(record.status, ConsentStatus::Subscribed);
    assert_eq!(record.last_consent_at, Some(at(1_000)));
    assert_eq!(record.last_source, Some(ConsentEventKind::CheckoutCompleted));
    assert_eq!(record.fence.map(|fence| fence.until), Some(at(9_000)));
    let events = store.events_for_customer(key).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].note, json!({ "source": "test" }));
}

/// Verifies a duplicate identity cannot be created twice.
#[test]
fn sqlite_store_rejects_duplicate_identity() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    store.create_customer(&draft(Some(7), None)).unwrap();
    let err = store.create_customer(&draft(Some(7), None)).unwrap_err();
    assert_eq!(err, StoreError::Invalid("customer identity already stored".to_string()));
}

/// Verifies an email-only row folds into the id row and its events follow.
#[test]
fn sqlite_store_folds_email_row_into_id_row() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let by_id = store.create_customer(&draft(Some(7), None)).unwrap();
    let mut email_draft = draft(None, Some("a@example.com"));
    email_draft.status = ConsentStatus::Subscribed;
    email_draft.last_consent_at = Some(at(2_000));
    let by_email = store.create_customer(&email_draft).unwrap();
    store
        .append_event(&event(ConsentEventKind::CheckoutCompleted, None, Some(by_email.key), 2_000))
        .unwrap();

    let identity =
        CustomerIdentity::new(Some(CustomerId::new(7)), EmailAddress::parse("a@example.com"));
    let resolution = store.resolve_customer(&shop(), &identity).unwrap();
    assert_eq!(
        resolution.plan,
        IdentityPlan::Fold {
            survivor: by_id.key,
            absorbed: by_email.key,
        }
    );
    let merged = resolution.record.expect("survivor row");
    assert_eq!(merged.key, by_id.key);
    assert_eq!(merged.email, EmailAddress::parse("a@example.com"));
    assert_eq!(merged.status, ConsentStatus::Subscribed);
    assert!(store.load_customer(by_email.key).unwrap().is_none());
    assert_eq!(store.merged_into(by_email.key).unwrap(), Some(by_id.key));
    assert_eq!(store.merged_into(by_id.key).unwrap(), None);
    assert_eq!(store.events_for_customer(by_id.key).unwrap().len(), 1);
    assert_eq!(store.list_customers(&shop()).unwrap().len(), 1);
    assert!(store.set_fence(by_email.key, None).is_err());
}

/// Verifies a folded row stays on disk with its merge target.
#[test]
fn sqlite_store_keeps_folded_row() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("consent.db");
    let store = store_for(&path);
    let by_id = store.create_customer(&draft(Some(7), None)).unwrap();
    let by_email = store.create_customer(&draft(None, Some("a@example.com"))).unwrap();
    let identity =
        CustomerIdentity::new(Some(CustomerId::new(7)), EmailAddress::parse("a@example.com"));
    store.resolve_customer(&shop(), &identity).unwrap();
    drop(store);

    let connection = Connection::open(&path).unwrap();
    let (count, merged_into): (i64, Option<i64>) = connection
        .query_row(
            "SELECT COUNT(*), MAX(merged_into) FROM customers WHERE key = ?1",
            params![by_email.key.get()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(merged_into, Some(by_id.key.get()));
}

/// Verifies a version 1 database gains the merge column on open.
#[test]
fn sqlite_store_migrates_version_one_schema() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("consent.db");
    drop(store_for(&path));
    let connection = Connection::open(&path).unwrap();
    connection
        .execute_batch(
            "ALTER TABLE customers DROP COLUMN merged_into; UPDATE store_meta SET version = 1;",
        )
        .unwrap();
    drop(connection);

    let store = store_for(&path);
    let record = store.create_customer(&draft(Some(7), None)).unwrap();
    assert_eq!(store.merged_into(record.key).unwrap(), None);
    let connection = Connection::open(&path).unwrap();
    let version: i64 =
        connection.query_row("SELECT version FROM store_meta", [], |row| row.get(0)).unwrap();
    assert_eq!(version, 2);
}

/// Verifies an email held by another customer id is released.
#[test]
fn sqlite_store_releases_reassigned_email() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let holder = store.create_customer(&draft(Some(5), Some("a@example.com"))).unwrap();
    let identity =
        CustomerIdentity::new(Some(CustomerId::new(9)), EmailAddress::parse("a@example.com"));
    let resolution = store.resolve_customer(&shop(), &identity).unwrap();
    assert!(resolution.record.is_none());
    let released = store.load_customer(holder.key).unwrap().unwrap();
    assert_eq!(released.email, None);
    let created = store.create_customer(&draft(Some(9), Some("a@example.com"))).unwrap();
    assert_eq!(created.email, EmailAddress::parse("a@example.com"));
}

/// Verifies an older write is dropped and leaves the row untouched.
#[test]
fn sqlite_store_drops_stale_writes() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let record = store.create_customer(&draft(Some(7), None)).unwrap();
    let write = |status, millis| StatusWrite {
        key: record.key,
        status,
        occurred_at: at(millis),
        source: ConsentEventKind::PlatformConsentWebhook,
        region: None,
    };
    store.write_status(&write(ConsentStatus::Unsubscribed, 5_000)).unwrap();
    let outcome = store.write_status(&write(ConsentStatus::Subscribed, 4_000)).unwrap();
    assert_eq!(
        outcome,
        WriteOutcome::Stale {
            stored: ConsentStatus::Unsubscribed,
        }
    );
    let stored = store.load_customer(record.key).unwrap().unwrap();
    assert_eq!(stored.status, ConsentStatus::Unsubscribed);
    assert_eq!(stored.last_consent_at, Some(at(5_000)));
}

/// Verifies fence writes against a missing row fail.
#[test]
fn sqlite_store_rejects_fence_for_unknown_row() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let err = store.set_fence(consent_sync_core::CustomerKey::new(42), None).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

// ============================================================================
// SECTION: Sessions And Events
// ============================================================================

/// Verifies identical toggles are stored once.
#[test]
fn sqlite_store_deduplicates_toggles() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let session = open(&store, "sess-1", "tok-1", 1_000);
    let toggle = event(ConsentEventKind::CheckoutToggle, Some(session.as_str()), None, 1_500);
    let first = store.append_event(&toggle).unwrap();
    let second = store.append_event(&toggle).unwrap();
    assert!(matches!(first, EventInsert::Inserted(_)));
    assert_eq!(second, EventInsert::Duplicate(first.id()));
    let later = event(ConsentEventKind::CheckoutToggle, Some(session.as_str()), None, 1_600);
    assert!(matches!(store.append_event(&later).unwrap(), EventInsert::Inserted(_)));
    assert_eq!(store.events_for_session(&session).unwrap().len(), 2);
}

/// Verifies reopening a token refreshes the same session.
#[test]
fn sqlite_store_reuses_session_per_token() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let first = open(&store, "sess-1", "tok-1", 1_000);
    let second = open(&store, "sess-2", "tok-1", 2_000);
    assert_eq!(first, second);
    let session = store.load_session(&first).unwrap().unwrap();
    assert_eq!(session.updated_at, at(2_000));
    assert_eq!(session.created_at, at(1_000));
    let found = store.find_session_by_token(&shop(), &CheckoutToken::new("tok-1")).unwrap();
    assert_eq!(found.map(|session| session.id), Some(first));
}

/// Verifies order linking handles replays and conflicts.
#[test]
fn sqlite_store_links_orders_once() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let session = open(&store, "sess-1", "tok-1", 1_000);
    let other = open(&store, "sess-2", "tok-2", 1_000);
    store.record_intent(&session, ConsentStatus::Subscribed, None, at(1_100)).unwrap();
    let order = OrderId::new("1001");

    let linked = store.complete_session(&session, &order, true, at(2_000)).unwrap();
    let OrderLink::Linked(linked) = linked else {
        panic!("expected first link");
    };
    assert_eq!(linked.intended, Some(ConsentStatus::Subscribed));
    assert_eq!(linked.resolved_subscribe, Some(true));
    assert_eq!(linked.display_text.as_deref(), Some("Email me"));

    let replay = store.complete_session(&session, &order, true, at(2_100)).unwrap();
    assert!(matches!(replay, OrderLink::AlreadyLinked(_)));
    let different = store.complete_session(&session, &OrderId::new("1002"), true, at(2_200));
    assert!(matches!(different.unwrap(), OrderLink::Conflict(_)));
    let elsewhere = store.complete_session(&other, &order, false, at(2_300)).unwrap();
    assert!(matches!(elsewhere, OrderLink::Conflict(_)));

    let closed = store.record_intent(&session, ConsentStatus::NotSubscribed, None, at(2_400));
    assert!(matches!(closed.unwrap_err(), StoreError::Invalid(_)));
}

/// Verifies session events are attributed to a customer once.
#[test]
fn sqlite_store_links_session_events() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let session = open(&store, "sess-1", "tok-1", 1_000);
    let record = store.create_customer(&draft(Some(7), None)).unwrap();
    for millis in [1_100, 1_200] {
        let toggle = event(ConsentEventKind::CheckoutToggle, Some(session.as_str()), None, millis);
        store.append_event(&toggle).unwrap();
    }
    assert_eq!(store.link_session_events(&session, record.key).unwrap(), 2);
    assert_eq!(store.link_session_events(&session, record.key).unwrap(), 0);
    assert_eq!(store.events_for_customer(record.key).unwrap().len(), 2);
}

/// Verifies pruning drops stale open sessions and their unattributed events.
#[test]
fn sqlite_store_prunes_stale_sessions() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let stale = open(&store, "sess-1", "tok-1", 1_000);
    let fresh = open(&store, "sess-2", "tok-2", 9_000);
    let completed = open(&store, "sess-3", "tok-3", 1_000);
    store.complete_session(&completed, &OrderId::new("1001"), true, at(1_000)).unwrap();
    let record = store.create_customer(&draft(Some(7), None)).unwrap();
    store
        .append_event(&event(ConsentEventKind::CheckoutToggle, Some(stale.as_str()), None, 1_100))
        .unwrap();
    store
        .append_event(&event(
            ConsentEventKind::CheckoutToggle,
            Some(stale.as_str()),
            Some(record.key),
            1_200,
        ))
        .unwrap();

    let report = store.prune_stale_sessions(at(5_000)).unwrap();
    assert_eq!(report.sessions, 1);
    assert_eq!(report.events, 1);
    assert!(store.load_session(&stale).unwrap().is_none());
    assert!(store.load_session(&fresh).unwrap().is_some());
    assert!(store.load_session(&completed).unwrap().is_some());
    let kept = store.events_for_customer(record.key).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].session_id, None);
}

// ============================================================================
// SECTION: Engine Integration
// ============================================================================

/// Platform that accepts every mutation.
struct AcceptingPlatform;

impl CommercePlatform for AcceptingPlatform {
    fn customer_order_count(
        &self,
        _shop: &ShopDomain,
        _customer: CustomerId,
    ) -> Result<Option<u64>, PlatformError> {
        Ok(Some(1))
    }

    fn update_marketing_consent(
        &self,
        _shop: &ShopDomain,
        _customer: CustomerId,
        _mutation: &ConsentMutation,
    ) -> Result<(), PlatformError> {
        Ok(())
    }

    fn set_customer_email(
        &self,
        _shop: &ShopDomain,
        _customer: CustomerId,
        _email: &EmailAddress,
    ) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Email provider with no profiles.
struct EmptyEmail;

impl EmailProvider for EmptyEmail {
    fn find_profile(
        &self,
        _email: &EmailAddress,
        _detail: LookupDetail,
    ) -> Result<Option<ProviderProfile>, EmailProviderError> {
        Ok(None)
    }

    fn create_profile(
        &self,
        email: &EmailAddress,
        _attributes: &ProfileAttributes,
    ) -> Result<ProviderProfile, EmailProviderError> {
        Ok(ProviderProfile {
            id: format!("P-{email}"),
            subscription: None,
        })
    }

    fn update_profile(
        &self,
        _profile_id: &str,
        _attributes: &ProfileAttributes,
    ) -> Result<(), EmailProviderError> {
        Ok(())
    }

    fn subscribe(&self, _list_id: &str, _email: &EmailAddress) -> Result<(), EmailProviderError> {
        Ok(())
    }

    fn unsubscribe(&self, _list_id: &str, _email: &EmailAddress) -> Result<(), EmailProviderError> {
        Ok(())
    }
}

/// Fixed session ids.
struct FixedSessionIds;

impl SessionIdGenerator for FixedSessionIds {
    fn next_session_id(&self) -> SessionId {
        SessionId::new("sess-fixed")
    }
}

/// Verifies webhook ordering and echo fences hold on the durable store.
#[test]
fn sqlite_store_backs_reconciliation_engine() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("consent.db"));
    let clock = ManualClock::new(at(1_700_000_000_000));
    let engine = ReconciliationEngine::new(
        EngineParts {
            store: store.clone(),
            platform: Arc::new(AcceptingPlatform),
            email: Arc::new(EmptyEmail),
            policy: Arc::new(PolicyResolver::from_rules(Vec::new())),
            locator: Arc::new(NullRegionLocator),
            clock: Arc::new(clock.clone()),
            session_ids: Arc::new(FixedSessionIds),
            log: Arc::new(NoopSyncLogSink),
        },
        EngineConfig::default(),
    );
    let identity =
        CustomerIdentity::new(Some(CustomerId::new(7)), EmailAddress::parse("a@example.com"));
    let signal = |status, millis| {
        Signal::PlatformConsent(ConsentSignal {
            shop: shop(),
            identity: identity.clone(),
            status,
            confirmation: None,
            region_code: None,
            traits: ProfileTraits::default(),
            occurred_at: at(millis),
        })
    };

    let newer = engine.reconcile(&signal(ConsentStatus::Subscribed, 1_700_000_002_000)).unwrap();
    let older = engine.reconcile(&signal(ConsentStatus::Unsubscribed, 1_700_000_001_000)).unwrap();
    assert_ne!(newer.effect, EventEffect::Stale);
    assert_eq!(older.effect, EventEffect::Stale);
    let key = newer.customer_key.expect("row resolved");
    let record = store.load_customer(key).unwrap().unwrap();
    assert_eq!(record.status, ConsentStatus::Subscribed);
    assert_eq!(store.events_for_customer(key).unwrap().len(), 2);

    clock.advance(Duration::from_secs(1));
    let report = engine.prune_sessions(Duration::from_secs(3_600)).unwrap();
    assert_eq!(report.sessions, 0);
}
