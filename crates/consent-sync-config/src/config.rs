// crates/consent-sync-config/src/config.rs
// ============================================================================
// Module: Consent Sync Configuration
// Description: Configuration loading and validation for the consent service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: consent-sync-core, consent-sync-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file whose path comes from the CLI,
//! then the `CONSENT_SYNC_CONFIG` environment variable, then the default
//! file name. The file is size- and path-limited, must be UTF-8, and every
//! section validates before the service starts.
//!
//! Shop credentials live in `[[platform.shops]]`; the webhook secret of each
//! shop authenticates its webhook deliveries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use consent_sync_core::EmailListConfig;
use consent_sync_core::EngineConfig;
use consent_sync_core::ShopDomain;
use consent_sync_core::SuppressionOverride;
use consent_sync_core::runtime::MAX_FENCE_TTL;
use consent_sync_core::runtime::MIN_FENCE_TTL;
use consent_sync_store_sqlite::SqliteStoreConfig;
use consent_sync_store_sqlite::SqliteStoreMode;
use consent_sync_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "consent-sync.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CONSENT_SYNC_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default HTTP bind address.
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default maximum request body size.
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Maximum allowed request body size.
pub(crate) const MAX_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Maximum `SQLite` busy timeout in milliseconds.
pub(crate) const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default fence lifetime in seconds.
pub(crate) const DEFAULT_FENCE_TTL_SECS: u64 = 180;
/// Default outbound API timeout in milliseconds.
pub(crate) const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;
/// Maximum outbound API timeout in milliseconds.
pub(crate) const MAX_API_TIMEOUT_MS: u64 = 30_000;
/// Maximum number of configured shops.
pub(crate) const MAX_SHOPS: usize = 256;
/// Maximum length of a credential string.
pub(crate) const MAX_SECRET_LENGTH: usize = 512;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Consent sync service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsentSyncConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Consent store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Policy table configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// IP geolocation configuration.
    #[serde(default)]
    pub geoip: GeoIpConfig,
    /// Suppression fence configuration.
    #[serde(default)]
    pub fence: FenceConfig,
    /// Commerce platform configuration.
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Email provider configuration.
    #[serde(default)]
    pub email_provider: EmailProviderConfig,
    /// Operational log configuration.
    #[serde(default)]
    pub log: LogConfig,
}

impl ConsentSyncConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.policy.validate()?;
        self.geoip.validate()?;
        self.fence.validate()?;
        self.platform.validate(self.server.verify_webhooks)?;
        self.email_provider.validate()?;
        self.log.validate()?;
        Ok(())
    }

    /// Returns the engine tuning derived from the fence and email sections.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fence_ttl: self.fence.ttl(),
            email_lists: self.email_provider.list_config(),
        }
    }

    /// Returns the shop entry for a domain.
    #[must_use]
    pub fn shop(&self, domain: &ShopDomain) -> Option<&ShopConfig> {
        self.platform.shops.iter().find(|shop| shop.domain() == *domain)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Verify webhook HMAC signatures.
    #[serde(default = "default_true")]
    pub verify_webhooks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            verify_webhooks: true,
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is invalid: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_MAX_BODY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_MAX_BODY_BYTES}"
            )));
        }
        Ok(())
    }
}

/// Consent store backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store; state is lost on restart.
    #[default]
    Memory,
    /// `SQLite`-backed durable store.
    Sqlite,
}

/// Consent store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` configuration, or `None` for the memory backend.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        if self.store_type != StoreType::Sqlite {
            return None;
        }
        let path = self.path.clone()?;
        Some(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        })
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "store.path is only valid for the sqlite store".to_string(),
                    ));
                }
            }
            StoreType::Sqlite => {
                let Some(path) = &self.path else {
                    return Err(ConfigError::Invalid(
                        "store.path is required for the sqlite store".to_string(),
                    ));
                };
                validate_path_string("store.path", &path.to_string_lossy())?;
            }
        }
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "store.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// Policy table configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Path to the TOML policy table. Without it every lookup uses the default.
    #[serde(default)]
    pub table_path: Option<PathBuf>,
}

impl PolicyConfig {
    /// Validates policy configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.table_path {
            validate_path_string("policy.table_path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

/// IP geolocation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoIpConfig {
    /// Path to a CSV of `network,region_code` rows.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl GeoIpConfig {
    /// Validates geolocation configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.database_path {
            validate_path_string("geoip.database_path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Suppression fence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FenceConfig {
    /// Fence lifetime in seconds.
    #[serde(default = "default_fence_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_FENCE_TTL_SECS,
        }
    }
}

impl FenceConfig {
    /// Returns the fence lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Validates fence configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let ttl = self.ttl();
        if ttl < MIN_FENCE_TTL || ttl > MAX_FENCE_TTL {
            return Err(ConfigError::Invalid(format!(
                "fence.ttl_secs must be between {} and {}",
                MIN_FENCE_TTL.as_secs(),
                MAX_FENCE_TTL.as_secs()
            )));
        }
        Ok(())
    }
}

/// Commerce platform configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Admin API version segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
    /// Origin used instead of each shop's domain (local testing only).
    #[serde(default)]
    pub base_url_override: Option<String>,
    /// Shops served by this deployment.
    #[serde(default)]
    pub shops: Vec<ShopConfig>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            timeout_ms: DEFAULT_API_TIMEOUT_MS,
            base_url_override: None,
            shops: Vec::new(),
        }
    }
}

impl PlatformConfig {
    /// Validates platform configuration.
    fn validate(&self, verify_webhooks: bool) -> Result<(), ConfigError> {
        if !is_api_version(&self.api_version) {
            return Err(ConfigError::Invalid(
                "platform.api_version must look like YYYY-MM or be unstable".to_string(),
            ));
        }
        validate_timeout("platform.timeout_ms", self.timeout_ms)?;
        if let Some(base) = &self.base_url_override {
            validate_http_url("platform.base_url_override", base)?;
        }
        if self.shops.len() > MAX_SHOPS {
            return Err(ConfigError::Invalid(format!(
                "platform.shops exceeds max entries ({MAX_SHOPS})"
            )));
        }
        let mut seen = BTreeSet::new();
        for (index, shop) in self.shops.iter().enumerate() {
            shop.validate(index, verify_webhooks)?;
            if !seen.insert(shop.domain()) {
                return Err(ConfigError::Invalid(format!(
                    "platform.shops[{index}].domain is duplicated"
                )));
            }
        }
        Ok(())
    }
}

/// Credentials for one shop.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShopConfig {
    /// Shop domain (for example `demo.myshopify.com`).
    pub domain: String,
    /// Admin API access token.
    pub access_token: String,
    /// Webhook signing secret.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl ShopConfig {
    /// Returns the normalized shop domain.
    #[must_use]
    pub fn domain(&self) -> ShopDomain {
        ShopDomain::new(&self.domain)
    }

    /// Validates one shop entry.
    fn validate(&self, index: usize, verify_webhooks: bool) -> Result<(), ConfigError> {
        let field = format!("platform.shops[{index}]");
        let domain = self.domain.trim();
        let valid_domain = !domain.is_empty()
            && domain.len() <= MAX_PATH_COMPONENT_LENGTH
            && domain.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '-')
            && domain.contains('.');
        if !valid_domain {
            return Err(ConfigError::Invalid(format!("{field}.domain is not a host name")));
        }
        validate_secret(&format!("{field}.access_token"), &self.access_token)?;
        match &self.webhook_secret {
            Some(secret) => validate_secret(&format!("{field}.webhook_secret"), secret)?,
            None if verify_webhooks => {
                return Err(ConfigError::Invalid(format!(
                    "{field}.webhook_secret is required when server.verify_webhooks is true"
                )));
            }
            None => {}
        }
        Ok(())
    }
}

/// Email provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailProviderConfig {
    /// API origin.
    #[serde(default = "default_email_base_url")]
    pub base_url: String,
    /// Private API key.
    #[serde(default)]
    pub api_key: String,
    /// API revision date.
    #[serde(default = "default_email_revision")]
    pub revision: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
    /// List for single opt-in consent.
    #[serde(default)]
    pub single_opt_in_list: Option<String>,
    /// List for confirmed opt-in consent.
    #[serde(default)]
    pub double_opt_in_list: Option<String>,
    /// When a provider-side suppression may be overridden.
    #[serde(default)]
    pub suppression_override: SuppressionOverride,
}

impl Default for EmailProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_email_base_url(),
            api_key: String::new(),
            revision: default_email_revision(),
            timeout_ms: DEFAULT_API_TIMEOUT_MS,
            single_opt_in_list: None,
            double_opt_in_list: None,
            suppression_override: SuppressionOverride::default(),
        }
    }
}

impl EmailProviderConfig {
    /// Returns the list routing used by the email synchronizer.
    #[must_use]
    pub fn list_config(&self) -> EmailListConfig {
        EmailListConfig {
            single_opt_in_list: non_empty(self.single_opt_in_list.as_deref()),
            double_opt_in_list: non_empty(self.double_opt_in_list.as_deref()),
            suppression_override: self.suppression_override,
        }
    }

    /// Returns true when at least one list is configured.
    #[must_use]
    pub fn has_lists(&self) -> bool {
        !self.list_config().all_lists().is_empty()
    }

    /// Validates email provider configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("email_provider.base_url", &self.base_url)?;
        validate_timeout("email_provider.timeout_ms", self.timeout_ms)?;
        if self.revision.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "email_provider.revision must be non-empty".to_string(),
            ));
        }
        if self.has_lists() {
            validate_secret("email_provider.api_key", &self.api_key)?;
        }
        Ok(())
    }
}

/// Operational log sink type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard log entries.
    None,
}

/// Operational log configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: LogSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl LogConfig {
    /// Validates log configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkType::File, None) => {
                Err(ConfigError::Invalid("log.path is required for the file sink".to_string()))
            }
            (LogSinkType::File, Some(path)) => {
                validate_path_string("log.path", &path.to_string_lossy())
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("log.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an outbound request timeout.
fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_API_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_API_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

/// Validates a credential string.
fn validate_secret(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_SECRET_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Validates an absolute HTTP or HTTPS origin.
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::Invalid(format!("{field} must be an http(s) url")))?;
    if rest.is_empty() || rest.starts_with('/') || trimmed.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("{field} must include a host")));
    }
    Ok(())
}

/// Returns true for `YYYY-MM` or `unstable`.
fn is_api_version(value: &str) -> bool {
    if value == "unstable" {
        return true;
    }
    let bytes = value.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[.. 4].iter().all(u8::is_ascii_digit)
        && bytes[5 ..].iter().all(u8::is_ascii_digit)
}

/// Drops blank list identifiers.
fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(ToString::to_string)
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default maximum request body size.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default `true` for boolean flags.
const fn default_true() -> bool {
    true
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

/// Default fence lifetime in seconds.
const fn default_fence_ttl_secs() -> u64 {
    DEFAULT_FENCE_TTL_SECS
}

/// Default outbound API timeout.
const fn default_api_timeout_ms() -> u64 {
    DEFAULT_API_TIMEOUT_MS
}

/// Default admin API version.
fn default_api_version() -> String {
    "2025-01".to_string()
}

/// Default email provider origin.
fn default_email_base_url() -> String {
    "https://a.klaviyo.com".to_string()
}

/// Default email provider revision.
fn default_email_revision() -> String {
    "2024-10-15".to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::is_api_version;
    use super::validate_http_url;

    /// Verifies API version shapes.
    #[test]
    fn api_version_shapes() {
        assert!(is_api_version("2025-01"));
        assert!(is_api_version("unstable"));
        assert!(!is_api_version("2025-1"));
        assert!(!is_api_version("latest"));
    }

    /// Verifies URL acceptance rules.
    #[test]
    fn http_url_rules() {
        assert!(validate_http_url("x", "https://a.example.com").is_ok());
        assert!(validate_http_url("x", "http://127.0.0.1:9000").is_ok());
        assert!(validate_http_url("x", "ftp://example.com").is_err());
        assert!(validate_http_url("x", "https://").is_err());
        assert!(validate_http_url("x", "https:///path").is_err());
    }
}
