// crates/consent-sync-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Consent Store
// Description: Durable ConsentStore backed by SQLite.
// Purpose: Persist consent rows, sessions, fences, and audit events.
// Dependencies: consent-sync-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`ConsentStore`] on a single `SQLite` connection.
//! Every trait method runs in one immediate transaction, so identity folds,
//! ordered status writes, and session linking are atomic even when several
//! processes share the database file. Status writes re-read the row and apply
//! [`CustomerConsentRecord::apply`] inside the transaction.
//! Folded customer rows are never deleted: they keep their key with
//! `merged_into` pointing at the survivor and no longer match any lookup.
//!
//! Rows read back from disk are untrusted: values that fail to parse into
//! core types are reported as corruption rather than silently dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use consent_sync_core::CheckoutSession;
use consent_sync_core::CheckoutToken;
use consent_sync_core::ConsentEvent;
use consent_sync_core::ConsentEventKind;
use consent_sync_core::ConsentStatus;
use consent_sync_core::ConsentStore;
use consent_sync_core::CustomerConsentRecord;
use consent_sync_core::CustomerDraft;
use consent_sync_core::CustomerId;
use consent_sync_core::CustomerIdentity;
use consent_sync_core::CustomerKey;
use consent_sync_core::CustomerResolution;
use consent_sync_core::EmailAddress;
use consent_sync_core::EventEffect;
use consent_sync_core::EventId;
use consent_sync_core::EventInsert;
use consent_sync_core::FenceMarker;
use consent_sync_core::IdentityPlan;
use consent_sync_core::NewConsentEvent;
use consent_sync_core::OrderId;
use consent_sync_core::OrderLink;
use consent_sync_core::PresentationMode;
use consent_sync_core::PruneReport;
use consent_sync_core::RegionCode;
use consent_sync_core::SessionId;
use consent_sync_core::SessionOpen;
use consent_sync_core::ShopDomain;
use consent_sync_core::StatusWrite;
use consent_sync_core::StoreError;
use consent_sync_core::Timestamp;
use consent_sync_core::WriteOutcome;
use consent_sync_core::plan_identity;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 2;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Columns selected for customer rows, in [`CustomerRow::read`] order.
const CUSTOMER_COLUMNS: &str = "key, shop, customer_id, email, status, last_consent_at, \
                                last_source, region, fence_until, fence_expected";
/// Columns selected for event rows, in [`EventRow::read`] order.
const EVENT_COLUMNS: &str = "id, shop, kind, outcome, effect, note_json, session_id, \
                             customer_key, occurred_at, recorded_at";
/// Columns selected for session rows, in [`SessionRow::read`] order.
const SESSION_COLUMNS: &str = "id, shop, checkout_token, presentation, region, display_text, \
                               order_id, intended, resolved_subscribe, created_at, updated_at";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` consent store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Returns a config for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout in milliseconds.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored value could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Request references missing data or violates a constraint.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error, reporting constraint violations as invalid data.
fn db(error: rusqlite::Error) -> SqliteStoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &error
        && failure.code == ErrorCode::ConstraintViolation
    {
        return SqliteStoreError::Invalid(format!("constraint violation: {error}"));
    }
    SqliteStoreError::Db(error.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed consent store.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Every public operation is one immediate transaction.
#[derive(Clone)]
pub struct SqliteConsentStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteConsentStore {
    /// Opens (and if needed creates) an `SQLite` consent store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized, or holds an unsupported schema version.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the connection is unusable.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", [], |_| Ok(())).map_err(db)
    }

    /// Lists every customer row of a shop ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or a row is corrupt.
    pub fn list_customers(
        &self,
        shop: &ShopDomain,
    ) -> Result<Vec<CustomerConsentRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE shop = ?1 AND merged_into IS NULL \
             ORDER BY key"
        );
        let mut statement = guard.prepare(&sql).map_err(db)?;
        let rows = statement.query_map(params![shop.as_str()], CustomerRow::read).map_err(db)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db)?.into_record()?);
        }
        Ok(records)
    }

    /// Returns the key a folded customer row was merged into.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn merged_into(&self, key: CustomerKey) -> Result<Option<CustomerKey>, SqliteStoreError> {
        let guard = self.lock()?;
        let sql = "SELECT merged_into FROM customers WHERE key = ?1";
        let survivor: Option<Option<i64>> =
            guard.query_row(sql, params![key.get()], |row| row.get(0)).optional().map_err(db)?;
        Ok(survivor.flatten().map(CustomerKey::new))
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }

    /// Runs `body` inside an immediate transaction and commits on success.
    fn with_transaction<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db)?;
        let value = body(&tx)?;
        tx.commit().map_err(db)?;
        Ok(value)
    }
}

impl ConsentStore for SqliteConsentStore {
    fn resolve_customer(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
    ) -> Result<CustomerResolution, StoreError> {
        Ok(self.with_transaction(|tx| resolve_in(tx, shop, identity))?)
    }

    fn create_customer(&self, draft: &CustomerDraft) -> Result<CustomerConsentRecord, StoreError> {
        Ok(self.with_transaction(|tx| {
            let customer_id = draft.customer_id.map(customer_id_to_sql).transpose()?;
            tx.execute(
                "INSERT INTO customers (shop, customer_id, email, status, last_consent_at, \
                 last_source, region) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    draft.shop.as_str(),
                    customer_id,
                    draft.email.as_ref().map(EmailAddress::as_str),
                    draft.status.as_str(),
                    draft.last_consent_at.map(Timestamp::as_unix_millis),
                    draft.last_source.map(ConsentEventKind::as_str),
                    draft.region.as_ref().map(RegionCode::as_str),
                ],
            )
            .map_err(|err| match db(err) {
                SqliteStoreError::Invalid(_) => {
                    SqliteStoreError::Invalid("customer identity already stored".to_string())
                }
                other => other,
            })?;
            let key = CustomerKey::new(tx.last_insert_rowid());
            load_customer_in(tx, key)?
                .ok_or_else(|| SqliteStoreError::Db(format!("inserted customer {key} missing")))
        })?)
    }

    fn load_customer(&self, key: CustomerKey) -> Result<Option<CustomerConsentRecord>, StoreError> {
        Ok(self.with_transaction(|tx| load_customer_in(tx, key))?)
    }

    fn write_status(&self, write: &StatusWrite) -> Result<WriteOutcome, StoreError> {
        Ok(self.with_transaction(|tx| {
            let mut record = load_customer_in(tx, write.key)?.ok_or_else(|| {
                SqliteStoreError::Invalid(format!("unknown customer key {}", write.key))
            })?;
            let outcome = record.apply(write);
            if !matches!(outcome, WriteOutcome::Stale { .. }) {
                save_customer_in(tx, &record)?;
            }
            Ok(outcome)
        })?)
    }

    fn set_fence(&self, key: CustomerKey, fence: Option<FenceMarker>) -> Result<(), StoreError> {
        Ok(self.with_transaction(|tx| {
            let changed = tx
                .execute(
                    "UPDATE customers SET fence_until = ?1, fence_expected = ?2 \
                     WHERE key = ?3 AND merged_into IS NULL",
                    params![
                        fence.map(|marker| marker.until.as_unix_millis()),
                        fence.map(|marker| marker.expected.as_str()),
                        key.get(),
                    ],
                )
                .map_err(db)?;
            if changed == 0 {
                return Err(SqliteStoreError::Invalid(format!("unknown customer key {key}")));
            }
            Ok(())
        })?)
    }

    fn append_event(&self, event: &NewConsentEvent) -> Result<EventInsert, StoreError> {
        Ok(self.with_transaction(|tx| {
            if event.is_session_toggle()
                && let Some(existing) = find_toggle_in(tx, event)?
            {
                return Ok(EventInsert::Duplicate(existing));
            }
            let note = serde_json::to_string(&event.note)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "INSERT INTO consent_events (shop, kind, outcome, effect, note_json, session_id, \
                 customer_key, occurred_at, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.shop.as_str(),
                    event.kind.as_str(),
                    event.outcome.map(ConsentStatus::as_str),
                    event.effect.as_str(),
                    note,
                    event.session_id.as_ref().map(SessionId::as_str),
                    event.customer_key.map(CustomerKey::get),
                    event.occurred_at.as_unix_millis(),
                    event.recorded_at.as_unix_millis(),
                ],
            )
            .map_err(db)?;
            Ok(EventInsert::Inserted(EventId::new(tx.last_insert_rowid())))
        })?)
    }

    fn events_for_customer(&self, key: CustomerKey) -> Result<Vec<ConsentEvent>, StoreError> {
        Ok(self.with_transaction(|tx| {
            query_events_in(tx, "customer_key = ?1", params![key.get()])
        })?)
    }

    fn events_for_session(&self, session_id: &SessionId) -> Result<Vec<ConsentEvent>, StoreError> {
        Ok(self.with_transaction(|tx| {
            query_events_in(tx, "session_id = ?1", params![session_id.as_str()])
        })?)
    }

    fn link_session_events(
        &self,
        session_id: &SessionId,
        key: CustomerKey,
    ) -> Result<usize, StoreError> {
        Ok(self.with_transaction(|tx| {
            tx.execute(
                "UPDATE consent_events SET customer_key = ?1 \
                 WHERE session_id = ?2 AND customer_key IS NULL",
                params![key.get(), session_id.as_str()],
            )
            .map_err(db)
        })?)
    }

    fn open_session(&self, open: &SessionOpen) -> Result<CheckoutSession, StoreError> {
        Ok(self.with_transaction(|tx| {
            let existing = find_session_by_token_in(tx, &open.shop, &open.checkout_token)?;
            if let Some(existing) = existing {
                if existing.is_completed() {
                    return Ok(existing);
                }
                tx.execute(
                    "UPDATE checkout_sessions SET presentation = ?1, region = ?2, \
                     display_text = COALESCE(?3, display_text), updated_at = ?4 WHERE id = ?5",
                    params![
                        open.presentation.as_str(),
                        open.region.as_ref().map(RegionCode::as_str),
                        open.display_text.as_deref(),
                        open.now.as_unix_millis(),
                        existing.id.as_str(),
                    ],
                )
                .map_err(db)?;
                return load_session_in(tx, &existing.id)?.ok_or_else(|| {
                    SqliteStoreError::Db(format!("session {} vanished", existing.id))
                });
            }
            tx.execute(
                "INSERT INTO checkout_sessions (id, shop, checkout_token, presentation, region, \
                 display_text, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    open.candidate_id.as_str(),
                    open.shop.as_str(),
                    open.checkout_token.as_str(),
                    open.presentation.as_str(),
                    open.region.as_ref().map(RegionCode::as_str),
                    open.display_text.as_deref(),
                    open.now.as_unix_millis(),
                ],
            )
            .map_err(|err| match db(err) {
                SqliteStoreError::Invalid(_) => SqliteStoreError::Invalid(format!(
                    "session id collision: {}",
                    open.candidate_id
                )),
                other => other,
            })?;
            load_session_in(tx, &open.candidate_id)?.ok_or_else(|| {
                SqliteStoreError::Db(format!("inserted session {} missing", open.candidate_id))
            })
        })?)
    }

    fn load_session(&self, session_id: &SessionId) -> Result<Option<CheckoutSession>, StoreError> {
        Ok(self.with_transaction(|tx| load_session_in(tx, session_id))?)
    }

    fn find_session_by_token(
        &self,
        shop: &ShopDomain,
        token: &CheckoutToken,
    ) -> Result<Option<CheckoutSession>, StoreError> {
        Ok(self.with_transaction(|tx| find_session_by_token_in(tx, shop, token))?)
    }

    fn record_intent(
        &self,
        session_id: &SessionId,
        status: ConsentStatus,
        display_text: Option<&str>,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        Ok(self.with_transaction(|tx| {
            let changed = tx
                .execute(
                    "UPDATE checkout_sessions SET intended = ?1, \
                     display_text = COALESCE(?2, display_text), updated_at = ?3 \
                     WHERE id = ?4 AND order_id IS NULL",
                    params![
                        status.as_str(),
                        display_text,
                        at.as_unix_millis(),
                        session_id.as_str()
                    ],
                )
                .map_err(db)?;
            if changed == 0 {
                return Err(SqliteStoreError::Invalid(format!("no open session {session_id}")));
            }
            Ok(())
        })?)
    }

    fn complete_session(
        &self,
        session_id: &SessionId,
        order_id: &OrderId,
        subscribe: bool,
        at: Timestamp,
    ) -> Result<OrderLink, StoreError> {
        Ok(self.with_transaction(|tx| {
            let session = load_session_in(tx, session_id)?.ok_or_else(|| {
                SqliteStoreError::Invalid(format!("unknown session {session_id}"))
            })?;
            match &session.order_id {
                Some(linked) if linked == order_id => return Ok(OrderLink::AlreadyLinked(session)),
                Some(linked) => {
                    return Ok(OrderLink::Conflict(format!(
                        "session {session_id} already linked to order {linked}"
                    )));
                }
                None => {}
            }
            let claimed_elsewhere: Option<String> = tx
                .query_row(
                    "SELECT id FROM checkout_sessions \
                     WHERE shop = ?1 AND order_id = ?2 AND id != ?3",
                    params![session.shop.as_str(), order_id.as_str(), session_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db)?;
            if claimed_elsewhere.is_some() {
                return Ok(OrderLink::Conflict(format!(
                    "order {order_id} linked to another session"
                )));
            }
            tx.execute(
                "UPDATE checkout_sessions SET order_id = ?1, resolved_subscribe = ?2, \
                 updated_at = ?3 WHERE id = ?4",
                params![order_id.as_str(), subscribe, at.as_unix_millis(), session_id.as_str()],
            )
            .map_err(db)?;
            let linked = load_session_in(tx, session_id)?.ok_or_else(|| {
                SqliteStoreError::Db(format!("session {session_id} vanished"))
            })?;
            Ok(OrderLink::Linked(linked))
        })?)
    }

    fn prune_stale_sessions(&self, cutoff: Timestamp) -> Result<PruneReport, StoreError> {
        Ok(self.with_transaction(|tx| {
            let cutoff = cutoff.as_unix_millis();
            let stale =
                "SELECT id FROM checkout_sessions WHERE order_id IS NULL AND updated_at < ?1";
            let events = tx
                .execute(
                    &format!(
                        "DELETE FROM consent_events WHERE customer_key IS NULL \
                         AND session_id IN ({stale})"
                    ),
                    params![cutoff],
                )
                .map_err(db)?;
            tx.execute(
                &format!(
                    "UPDATE consent_events SET session_id = NULL WHERE session_id IN ({stale})"
                ),
                params![cutoff],
            )
            .map_err(db)?;
            let sessions = tx
                .execute(
                    "DELETE FROM checkout_sessions WHERE order_id IS NULL AND updated_at < ?1",
                    params![cutoff],
                )
                .map_err(db)?;
            Ok(PruneReport {
                sessions,
                events,
            })
        })?)
    }
}

// ============================================================================
// SECTION: Customer Rows
// ============================================================================

/// Raw customer row as stored.
struct CustomerRow {
    /// Row key.
    key: i64,
    /// Shop domain.
    shop: String,
    /// Platform customer id.
    customer_id: Option<i64>,
    /// Email.
    email: Option<String>,
    /// Status label.
    status: String,
    /// Event time in unix millis.
    last_consent_at: Option<i64>,
    /// Source kind label.
    last_source: Option<String>,
    /// Region code.
    region: Option<String>,
    /// Fence expiry in unix millis.
    fence_until: Option<i64>,
    /// Fence expected status label.
    fence_expected: Option<String>,
}

impl CustomerRow {
    /// Reads a row selected with [`CUSTOMER_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            shop: row.get(1)?,
            customer_id: row.get(2)?,
            email: row.get(3)?,
            status: row.get(4)?,
            last_consent_at: row.get(5)?,
            last_source: row.get(6)?,
            region: row.get(7)?,
            fence_until: row.get(8)?,
            fence_expected: row.get(9)?,
        })
    }

    /// Decodes into a core record.
    fn into_record(self) -> Result<CustomerConsentRecord, SqliteStoreError> {
        let key = self.key;
        let corrupt = |field: &str| SqliteStoreError::Corrupt(format!("customer {key}: {field}"));
        let customer_id = match self.customer_id {
            Some(raw) => Some(
                u64::try_from(raw)
                    .ok()
                    .filter(|id| *id > 0)
                    .map(CustomerId::new)
                    .ok_or_else(|| corrupt("customer_id"))?,
            ),
            None => None,
        };
        let email = match self.email {
            Some(raw) => Some(EmailAddress::parse(&raw).ok_or_else(|| corrupt("email"))?),
            None => None,
        };
        let status = ConsentStatus::parse(&self.status).ok_or_else(|| corrupt("status"))?;
        let last_source = match self.last_source {
            Some(raw) => {
                Some(ConsentEventKind::parse(&raw).ok_or_else(|| corrupt("last_source"))?)
            }
            None => None,
        };
        let region = match self.region {
            Some(raw) => Some(RegionCode::parse(&raw).ok_or_else(|| corrupt("region"))?),
            None => None,
        };
        let fence = match (self.fence_until, self.fence_expected) {
            (Some(until), Some(expected)) => Some(FenceMarker {
                until: Timestamp::from_unix_millis(until),
                expected: ConsentStatus::parse(&expected).ok_or_else(|| corrupt("fence"))?,
            }),
            (None, None) => None,
            _ => return Err(corrupt("fence")),
        };
        Ok(CustomerConsentRecord {
            key: CustomerKey::new(self.key),
            shop: ShopDomain::new(self.shop),
            customer_id,
            email,
            status,
            last_consent_at: self.last_consent_at.map(Timestamp::from_unix_millis),
            last_source,
            region,
            fence,
        })
    }
}

/// Converts a customer id to its column value.
fn customer_id_to_sql(id: CustomerId) -> Result<i64, SqliteStoreError> {
    i64::try_from(id.get())
        .map_err(|_| SqliteStoreError::Invalid(format!("customer id out of range: {id}")))
}

/// Loads one customer row matching `clause`.
fn query_customer_in(
    tx: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Option<CustomerConsentRecord>, SqliteStoreError> {
    let sql = format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE ({clause}) AND merged_into IS NULL"
    );
    let row = tx.query_row(&sql, params, CustomerRow::read).optional().map_err(db)?;
    row.map(CustomerRow::into_record).transpose()
}

/// Loads a customer row by key.
fn load_customer_in(
    tx: &Connection,
    key: CustomerKey,
) -> Result<Option<CustomerConsentRecord>, SqliteStoreError> {
    query_customer_in(tx, "key = ?1", params![key.get()])
}

/// Writes every mutable column of a customer row.
fn save_customer_in(
    tx: &Connection,
    record: &CustomerConsentRecord,
) -> Result<(), SqliteStoreError> {
    let customer_id = record.customer_id.map(customer_id_to_sql).transpose()?;
    tx.execute(
        "UPDATE customers SET customer_id = ?1, email = ?2, status = ?3, last_consent_at = ?4, \
         last_source = ?5, region = ?6, fence_until = ?7, fence_expected = ?8 WHERE key = ?9",
        params![
            customer_id,
            record.email.as_ref().map(EmailAddress::as_str),
            record.status.as_str(),
            record.last_consent_at.map(Timestamp::as_unix_millis),
            record.last_source.map(ConsentEventKind::as_str),
            record.region.as_ref().map(RegionCode::as_str),
            record.fence.map(|marker| marker.until.as_unix_millis()),
            record.fence.map(|marker| marker.expected.as_str()),
            record.key.get(),
        ],
    )
    .map_err(db)?;
    Ok(())
}

/// Loads a row or reports the key as invalid.
fn require_customer_in(
    tx: &Connection,
    key: CustomerKey,
) -> Result<CustomerConsentRecord, SqliteStoreError> {
    load_customer_in(tx, key)?
        .ok_or_else(|| SqliteStoreError::Invalid(format!("unknown customer key {key}")))
}

/// Looks up both identity keys, plans the merge, and executes it.
fn resolve_in(
    tx: &Connection,
    shop: &ShopDomain,
    identity: &CustomerIdentity,
) -> Result<CustomerResolution, SqliteStoreError> {
    let by_id = match identity.customer_id {
        Some(id) => query_customer_in(
            tx,
            "shop = ?1 AND customer_id = ?2",
            params![shop.as_str(), customer_id_to_sql(id)?],
        )?,
        None => None,
    };
    let by_email = match &identity.email {
        Some(email) => query_customer_in(
            tx,
            "shop = ?1 AND email = ?2",
            params![shop.as_str(), email.as_str()],
        )?,
        None => None,
    };
    let plan = plan_identity(identity, by_id.as_ref(), by_email.as_ref());
    match plan {
        IdentityPlan::Missing
        | IdentityPlan::Existing {
            ..
        } => {}
        IdentityPlan::AttachEmail {
            key,
        } => {
            let mut record = require_customer_in(tx, key)?;
            record.email.clone_from(&identity.email);
            save_customer_in(tx, &record)?;
        }
        IdentityPlan::AttachCustomerId {
            key,
        } => {
            let mut record = require_customer_in(tx, key)?;
            record.customer_id = identity.customer_id;
            save_customer_in(tx, &record)?;
        }
        IdentityPlan::Fold {
            survivor,
            absorbed,
        } => {
            let mut kept = require_customer_in(tx, survivor)?;
            let retired = require_customer_in(tx, absorbed)?;
            tx.execute(
                "UPDATE consent_events SET customer_key = ?1 WHERE customer_key = ?2",
                params![survivor.get(), absorbed.get()],
            )
            .map_err(db)?;
            // Identity columns are cleared so the survivor can take them.
            tx.execute(
                "UPDATE customers SET merged_into = ?1, customer_id = NULL, email = NULL \
                 WHERE key = ?2",
                params![survivor.get(), absorbed.get()],
            )
            .map_err(db)?;
            kept.absorb(&retired);
            save_customer_in(tx, &kept)?;
        }
        IdentityPlan::ReleaseEmail {
            holder,
            target,
        } => {
            tx.execute("UPDATE customers SET email = NULL WHERE key = ?1", params![holder.get()])
                .map_err(db)?;
            if let Some(target) = target {
                let mut record = require_customer_in(tx, target)?;
                record.email.clone_from(&identity.email);
                save_customer_in(tx, &record)?;
            }
        }
    }
    let record = match plan.resolved_key() {
        Some(key) => load_customer_in(tx, key)?,
        None => None,
    };
    Ok(CustomerResolution {
        record,
        plan,
    })
}

// ============================================================================
// SECTION: Event Rows
// ============================================================================

/// Raw event row as stored.
struct EventRow {
    /// Event id.
    id: i64,
    /// Shop domain.
    shop: String,
    /// Kind label.
    kind: String,
    /// Outcome status label.
    outcome: Option<String>,
    /// Effect label.
    effect: String,
    /// Note JSON text.
    note_json: String,
    /// Session id.
    session_id: Option<String>,
    /// Customer key.
    customer_key: Option<i64>,
    /// Event time in unix millis.
    occurred_at: i64,
    /// Write time in unix millis.
    recorded_at: i64,
}

impl EventRow {
    /// Reads a row selected with [`EVENT_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            shop: row.get(1)?,
            kind: row.get(2)?,
            outcome: row.get(3)?,
            effect: row.get(4)?,
            note_json: row.get(5)?,
            session_id: row.get(6)?,
            customer_key: row.get(7)?,
            occurred_at: row.get(8)?,
            recorded_at: row.get(9)?,
        })
    }

    /// Decodes into a core event.
    fn into_event(self) -> Result<ConsentEvent, SqliteStoreError> {
        let id = self.id;
        let corrupt = |field: &str| SqliteStoreError::Corrupt(format!("event {id}: {field}"));
        let outcome = match self.outcome {
            Some(raw) => Some(ConsentStatus::parse(&raw).ok_or_else(|| corrupt("outcome"))?),
            None => None,
        };
        Ok(ConsentEvent {
            id: EventId::new(self.id),
            shop: ShopDomain::new(self.shop),
            kind: ConsentEventKind::parse(&self.kind).ok_or_else(|| corrupt("kind"))?,
            outcome,
            effect: EventEffect::parse(&self.effect).ok_or_else(|| corrupt("effect"))?,
            note: serde_json::from_str(&self.note_json).map_err(|_| corrupt("note_json"))?,
            session_id: self.session_id.map(SessionId::new),
            customer_key: self.customer_key.map(CustomerKey::new),
            occurred_at: Timestamp::from_unix_millis(self.occurred_at),
            recorded_at: Timestamp::from_unix_millis(self.recorded_at),
        })
    }
}

/// Lists events matching `clause` in insertion order.
fn query_events_in(
    tx: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ConsentEvent>, SqliteStoreError> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM consent_events WHERE {clause} ORDER BY id");
    let mut statement = tx.prepare(&sql).map_err(db)?;
    let rows = statement.query_map(params, EventRow::read).map_err(db)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(db)?.into_event()?);
    }
    Ok(events)
}

/// Finds an identical stored toggle.
fn find_toggle_in(
    tx: &Connection,
    event: &NewConsentEvent,
) -> Result<Option<EventId>, SqliteStoreError> {
    let id: Option<i64> = tx
        .query_row(
            "SELECT id FROM consent_events WHERE session_id = ?1 AND kind = ?2 \
             AND occurred_at = ?3 ORDER BY id LIMIT 1",
            params![
                event.session_id.as_ref().map(SessionId::as_str),
                event.kind.as_str(),
                event.occurred_at.as_unix_millis(),
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(db)?;
    Ok(id.map(EventId::new))
}

// ============================================================================
// SECTION: Session Rows
// ============================================================================

/// Raw session row as stored.
struct SessionRow {
    /// Session id.
    id: String,
    /// Shop domain.
    shop: String,
    /// Checkout token.
    checkout_token: String,
    /// Presentation label.
    presentation: String,
    /// Region code.
    region: Option<String>,
    /// Display text.
    display_text: Option<String>,
    /// Linked order.
    order_id: Option<String>,
    /// Intended status label.
    intended: Option<String>,
    /// Resolved subscribe flag.
    resolved_subscribe: Option<bool>,
    /// Creation time in unix millis.
    created_at: i64,
    /// Refresh time in unix millis.
    updated_at: i64,
}

impl SessionRow {
    /// Reads a row selected with [`SESSION_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            shop: row.get(1)?,
            checkout_token: row.get(2)?,
            presentation: row.get(3)?,
            region: row.get(4)?,
            display_text: row.get(5)?,
            order_id: row.get(6)?,
            intended: row.get(7)?,
            resolved_subscribe: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    /// Decodes into a core session.
    fn into_session(self) -> Result<CheckoutSession, SqliteStoreError> {
        let id = &self.id;
        let corrupt = |field: &str| SqliteStoreError::Corrupt(format!("session {id}: {field}"));
        let presentation =
            PresentationMode::parse(&self.presentation).ok_or_else(|| corrupt("presentation"))?;
        let region = match &self.region {
            Some(raw) => Some(RegionCode::parse(raw).ok_or_else(|| corrupt("region"))?),
            None => None,
        };
        let intended = match &self.intended {
            Some(raw) => Some(ConsentStatus::parse(raw).ok_or_else(|| corrupt("intended"))?),
            None => None,
        };
        Ok(CheckoutSession {
            id: SessionId::new(self.id.clone()),
            shop: ShopDomain::new(&self.shop),
            checkout_token: CheckoutToken::new(&self.checkout_token),
            presentation,
            region,
            display_text: self.display_text.clone(),
            order_id: self.order_id.clone().map(OrderId::new),
            intended,
            resolved_subscribe: self.resolved_subscribe,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
        })
    }
}

/// Loads one session matching `clause`.
fn query_session_in(
    tx: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Option<CheckoutSession>, SqliteStoreError> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM checkout_sessions WHERE {clause}");
    let row = tx.query_row(&sql, params, SessionRow::read).optional().map_err(db)?;
    row.map(SessionRow::into_session).transpose()
}

/// Loads a session by id.
fn load_session_in(
    tx: &Connection,
    session_id: &SessionId,
) -> Result<Option<CheckoutSession>, SqliteStoreError> {
    query_session_in(tx, "id = ?1", params![session_id.as_str()])
}

/// Loads a session by shop and checkout token.
fn find_session_by_token_in(
    tx: &Connection,
    shop: &ShopDomain,
    token: &CheckoutToken,
) -> Result<Option<CheckoutSession>, SqliteStoreError> {
    query_session_in(
        tx,
        "shop = ?1 AND checkout_token = ?2",
        params![shop.as_str(), token.as_str()],
    )
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db)?;
    Ok(connection)
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS customers (
                    key INTEGER PRIMARY KEY AUTOINCREMENT,
                    shop TEXT NOT NULL,
                    customer_id INTEGER,
                    email TEXT,
                    status TEXT NOT NULL,
                    last_consent_at INTEGER,
                    last_source TEXT,
                    region TEXT,
                    fence_until INTEGER,
                    fence_expected TEXT,
                    merged_into INTEGER,
                    UNIQUE (shop, customer_id),
                    UNIQUE (shop, email)
                );
                CREATE TABLE IF NOT EXISTS checkout_sessions (
                    id TEXT PRIMARY KEY,
                    shop TEXT NOT NULL,
                    checkout_token TEXT NOT NULL,
                    presentation TEXT NOT NULL,
                    region TEXT,
                    display_text TEXT,
                    order_id TEXT,
                    intended TEXT,
                    resolved_subscribe INTEGER,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (shop, checkout_token),
                    UNIQUE (shop, order_id)
                );
                CREATE INDEX IF NOT EXISTS idx_checkout_sessions_stale
                    ON checkout_sessions (updated_at) WHERE order_id IS NULL;
                CREATE TABLE IF NOT EXISTS consent_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    shop TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    outcome TEXT,
                    effect TEXT NOT NULL,
                    note_json TEXT NOT NULL,
                    session_id TEXT,
                    customer_key INTEGER REFERENCES customers(key),
                    occurred_at INTEGER NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_consent_events_customer
                    ON consent_events (customer_key);
                CREATE INDEX IF NOT EXISTS idx_consent_events_session
                    ON consent_events (session_id);
                CREATE UNIQUE INDEX IF NOT EXISTS idx_consent_events_toggle
                    ON consent_events (session_id, kind, occurred_at)
                    WHERE kind = 'checkout-toggle' AND session_id IS NOT NULL;",
            )
            .map_err(db)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(1) => {
            tx.execute_batch("ALTER TABLE customers ADD COLUMN merged_into INTEGER;").map_err(db)?;
            tx.execute("UPDATE store_meta SET version = ?1", params![SCHEMA_VERSION])
                .map_err(db)?;
        }
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db)?;
    Ok(())
}
