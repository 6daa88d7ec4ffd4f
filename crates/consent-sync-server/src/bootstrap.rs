// crates/consent-sync-server/src/bootstrap.rs
// ============================================================================
// Module: Bootstrap
// Description: Builds the engine and its collaborators from configuration.
// Purpose: Single wiring point shared by the HTTP server and the CLI.
// Dependencies: consent-sync-config, consent-sync-core, consent-sync-providers,
//               consent-sync-store-sqlite, rand
// ============================================================================

//! ## Overview
//! Bootstrap turns a validated [`ConsentSyncConfig`] into a running
//! [`ReconciliationEngine`]: the store backend, the platform and email
//! provider clients, the policy table, the geolocation table, and the log
//! sinks. HTTP clients are blocking and must be built outside any async
//! runtime.
//!
//! Policy rows that fail validation are skipped and logged. A configured
//! geolocation table that cannot be loaded degrades to a locator that
//! answers unknown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::sync::Arc;

use consent_sync_config::ConsentSyncConfig;
use consent_sync_config::LogConfig;
use consent_sync_config::LogSinkType;
use consent_sync_config::StoreConfig;
use consent_sync_config::StoreType;
use consent_sync_core::Clock;
use consent_sync_core::EngineParts;
use consent_sync_core::InMemoryConsentStore;
use consent_sync_core::NoopSyncLogSink;
use consent_sync_core::PolicyResolver;
use consent_sync_core::ReconciliationEngine;
use consent_sync_core::RegionLocator;
use consent_sync_core::SessionId;
use consent_sync_core::SessionIdGenerator;
use consent_sync_core::SharedConsentStore;
use consent_sync_core::SyncLogEvent;
use consent_sync_core::SyncLogLevel;
use consent_sync_core::SyncLogSink;
use consent_sync_core::SystemClock;
use consent_sync_providers::AdminApiConfig;
use consent_sync_providers::AdminApiPlatform;
use consent_sync_providers::DEFAULT_USER_AGENT;
use consent_sync_providers::GeoIpTable;
use consent_sync_providers::JsonApiConfig;
use consent_sync_providers::JsonApiEmailProvider;
use consent_sync_providers::load_policy_table;
use consent_sync_store_sqlite::SqliteConsentStore;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::log::FileLogSink;
use crate::log::HttpAuditSink;
use crate::log::StderrLogSink;
use crate::server::ServerError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Engine wired to the production store and HTTP clients.
pub type ConsentEngine =
    ReconciliationEngine<SharedConsentStore, AdminApiPlatform, JsonApiEmailProvider>;

/// Prefix of generated checkout session ids.
const SESSION_ID_PREFIX: &str = "cs_";
/// Random bytes per session id.
const SESSION_ID_BYTES: usize = 16;

/// Session id generator backed by the OS random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSessionIds;

impl SessionIdGenerator for RandomSessionIds {
    fn next_session_id(&self) -> SessionId {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let mut id = String::with_capacity(SESSION_ID_PREFIX.len() + SESSION_ID_BYTES * 2);
        id.push_str(SESSION_ID_PREFIX);
        for byte in bytes {
            let _ = write!(id, "{byte:02x}");
        }
        SessionId::new(id)
    }
}

/// Log sinks for both event families, backed by the same destination.
#[derive(Clone)]
pub struct LogSinks {
    /// Runtime sync outcomes.
    pub sync: Arc<dyn SyncLogSink>,
    /// HTTP access events.
    pub http: Arc<dyn HttpAuditSink>,
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Opens the configured log destination.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the log file cannot be opened.
pub fn build_log_sinks(config: &LogConfig) -> Result<LogSinks, ServerError> {
    match (config.sink, config.path.as_ref()) {
        (LogSinkType::File, Some(path)) => {
            let sink = Arc::new(FileLogSink::new(path).map_err(|err| {
                ServerError::Init(format!("log file {}: {err}", path.display()))
            })?);
            Ok(LogSinks {
                sync: Arc::clone(&sink) as Arc<dyn SyncLogSink>,
                http: sink,
            })
        }
        (LogSinkType::File, None) => Err(ServerError::Config("log.path is required".to_string())),
        (LogSinkType::None, _) => Ok(LogSinks {
            sync: Arc::new(NoopSyncLogSink),
            http: Arc::new(NoopSyncLogSink),
        }),
        (LogSinkType::Stderr, _) => Ok(LogSinks {
            sync: Arc::new(StderrLogSink),
            http: Arc::new(StderrLogSink),
        }),
    }
}

/// Opens the configured consent store.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the SQLite store cannot be opened.
pub fn build_store(config: &StoreConfig) -> Result<SharedConsentStore, ServerError> {
    match config.store_type {
        StoreType::Memory => Ok(SharedConsentStore::from_store(InMemoryConsentStore::new())),
        StoreType::Sqlite => {
            let sqlite = config
                .sqlite_config()
                .ok_or_else(|| ServerError::Config("store.path is required".to_string()))?;
            let store = SqliteConsentStore::new(sqlite)
                .map_err(|err| ServerError::Init(format!("sqlite store: {err}")))?;
            Ok(SharedConsentStore::from_store(store))
        }
    }
}

/// Loads the policy table, or an empty resolver when none is configured.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when a configured table cannot be read or
/// parsed. Individual bad rows are logged and skipped.
pub fn build_policy(
    config: &ConsentSyncConfig,
    log: &dyn SyncLogSink,
    clock: &dyn Clock,
) -> Result<PolicyResolver, ServerError> {
    let Some(path) = config.policy.table_path.as_ref() else {
        return Ok(PolicyResolver::empty());
    };
    let table = load_policy_table(path)
        .map_err(|err| ServerError::Init(format!("policy table {}: {err}", path.display())))?;
    for message in &table.rejected {
        log.record(
            &SyncLogEvent::new(clock.now(), SyncLogLevel::Warn, "policy", "row_rejected")
                .message(message.clone()),
        );
    }
    log.record(
        &SyncLogEvent::new(clock.now(), SyncLogLevel::Info, "policy", "table_loaded")
            .message(format!("{} rows accepted", table.accepted)),
    );
    Ok(table.resolver)
}

/// Loads the geolocation table, degrading to an empty table on failure.
#[must_use]
pub fn build_locator(
    config: &ConsentSyncConfig,
    log: &dyn SyncLogSink,
    clock: &dyn Clock,
) -> GeoIpTable {
    let Some(path) = config.geoip.database_path.as_ref() else {
        return GeoIpTable::empty();
    };
    match GeoIpTable::load(path) {
        Ok(table) => table,
        Err(err) => {
            log.record(
                &SyncLogEvent::new(clock.now(), SyncLogLevel::Warn, "policy", "geoip_unavailable")
                    .message(err.to_string()),
            );
            GeoIpTable::empty()
        }
    }
}

/// Builds the commerce platform client for all configured shops.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the client cannot be built.
pub fn build_platform(config: &ConsentSyncConfig) -> Result<AdminApiPlatform, ServerError> {
    let platform = &config.platform;
    let admin = AdminApiConfig {
        api_version: platform.api_version.clone(),
        timeout_ms: platform.timeout_ms,
        base_url_override: platform.base_url_override.clone(),
        ..AdminApiConfig::default()
    };
    let shops = platform.shops.iter().map(|shop| (shop.domain(), shop.access_token.clone()));
    AdminApiPlatform::new(admin, shops)
        .map_err(|err| ServerError::Init(format!("platform client: {err}")))
}

/// Builds the email provider client.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the client cannot be built.
pub fn build_email_provider(
    config: &ConsentSyncConfig,
) -> Result<JsonApiEmailProvider, ServerError> {
    let email = &config.email_provider;
    JsonApiEmailProvider::new(JsonApiConfig {
        base_url: email.base_url.clone(),
        api_key: email.api_key.clone(),
        revision: email.revision.clone(),
        timeout_ms: email.timeout_ms,
        user_agent: DEFAULT_USER_AGENT.to_string(),
        ..JsonApiConfig::default()
    })
    .map_err(|err| ServerError::Init(format!("email provider client: {err}")))
}

/// Builds the engine and returns it with its log sinks.
///
/// # Errors
///
/// Returns [`ServerError`] when any collaborator cannot be built.
pub fn build_engine(config: &ConsentSyncConfig) -> Result<(ConsentEngine, LogSinks), ServerError> {
    config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
    let sinks = build_log_sinks(&config.log)?;
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock);
    let policy = build_policy(config, sinks.sync.as_ref(), clock.as_ref())?;
    let locator: Arc<dyn RegionLocator + Send + Sync> =
        Arc::new(build_locator(config, sinks.sync.as_ref(), clock.as_ref()));
    let parts = EngineParts {
        store: build_store(&config.store)?,
        platform: Arc::new(build_platform(config)?),
        email: Arc::new(build_email_provider(config)?),
        policy: Arc::new(policy),
        locator,
        clock,
        session_ids: Arc::new(RandomSessionIds),
        log: Arc::clone(&sinks.sync),
    };
    Ok((ReconciliationEngine::new(parts, config.engine_config()), sinks))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::collections::BTreeSet;
    use std::fs;

    use consent_sync_config::ConsentSyncConfig;
    use consent_sync_core::SessionIdGenerator;
    use consent_sync_core::SystemClock;

    use super::RandomSessionIds;
    use super::build_engine;
    use super::build_locator;
    use super::build_policy;

    /// Verifies session ids are prefixed, hex encoded, and distinct.
    #[test]
    fn random_session_ids_are_distinct() {
        let ids: BTreeSet<String> = (0 .. 64)
            .map(|_| RandomSessionIds.next_session_id().as_str().to_string())
            .collect();
        assert_eq!(ids.len(), 64);
        for id in &ids {
            assert!(id.starts_with("cs_"));
            assert_eq!(id.len(), 35);
            assert!(id[3 ..].chars().all(|ch| ch.is_ascii_hexdigit()));
        }
    }

    /// Verifies a missing geolocation table degrades to an empty locator.
    #[test]
    fn missing_geoip_table_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[geoip]\ndatabase_path = \"{}\"\n[log]\nsink = \"none\"\n",
            dir.path().join("absent.csv").display()
        );
        let config = ConsentSyncConfig::from_toml(&toml).unwrap();
        let table = build_locator(&config, &consent_sync_core::NoopSyncLogSink, &SystemClock);
        assert!(table.is_empty());
    }

    /// Verifies a policy table loads and a missing one fails startup.
    #[test]
    fn policy_table_loads_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        fs::write(
            &path,
            "[[rules]]\nregion_code = \"DE\"\nsegment = \"*\"\npresentation = \"OPT_IN\"\n\
             confirmation = \"DOUBLE\"\n",
        )
        .unwrap();
        let toml = format!("[policy]\ntable_path = \"{}\"\n", path.display());
        let config = ConsentSyncConfig::from_toml(&toml).unwrap();
        let resolver =
            build_policy(&config, &consent_sync_core::NoopSyncLogSink, &SystemClock).unwrap();
        assert_eq!(resolver.region_count(), 1);

        let toml = format!("[policy]\ntable_path = \"{}\"\n", dir.path().join("x.toml").display());
        let config = ConsentSyncConfig::from_toml(&toml).unwrap();
        assert!(build_policy(&config, &consent_sync_core::NoopSyncLogSink, &SystemClock).is_err());
    }

    /// Verifies the default configuration wires a memory-backed engine.
    #[test]
    fn default_config_builds_engine() {
        let config = ConsentSyncConfig::from_toml("[log]\nsink = \"none\"\n").unwrap();
        let (engine, _sinks) = build_engine(&config).unwrap();
        assert!(engine.now().as_unix_millis() > 0);
    }
}
