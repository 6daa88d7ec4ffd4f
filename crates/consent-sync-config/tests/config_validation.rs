// crates/consent-sync-config/tests/config_validation.rs
// ============================================================================
// Module: Config Validation Tests
// Description: Loading guards and per-section validation.
// Purpose: Ensure config input handling is strict and fail-closed.
// Dependencies: consent-sync-config, tempfile
// ============================================================================

//! ## Overview
//! Exercises file loading limits, defaults, and the validation rules of each
//! section, including cross-field checks between `[server]` and shop secrets.

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

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use consent_sync_config::ConfigError;
use consent_sync_config::ConsentSyncConfig;
use consent_sync_config::LogSinkType;
use consent_sync_config::StoreType;
use consent_sync_core::ShopDomain;
use consent_sync_core::SuppressionOverride;
use consent_sync_store_sqlite::SqliteStoreMode;
use tempfile::NamedTempFile;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Asserts that `result` failed with a message containing `needle`.
fn assert_invalid(result: Result<ConsentSyncConfig, ConfigError>, needle: &str) {
    match result {
        Err(error) => {
            let message = error.to_string();
            assert!(message.contains(needle), "error {message} did not contain {needle}");
        }
        Ok(_) => panic!("expected invalid config, wanted {needle}"),
    }
}

/// Minimal shop section used by several tests.
const SHOP: &str = r#"
[[platform.shops]]
domain = "demo.myshopify.com"
access_token = "shpat_token"
webhook_secret = "whsec"
"#;

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Verifies overlong paths are rejected before touching the disk.
#[test]
fn load_rejects_long_paths() {
    let long_path = "a".repeat(5_000);
    assert_invalid(
        ConsentSyncConfig::load(Some(Path::new(&long_path))),
        "config path exceeds max length",
    );
    let long_component = "a".repeat(300);
    assert_invalid(
        ConsentSyncConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    );
}

/// Verifies oversized files are rejected.
#[test]
fn load_rejects_oversized_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&vec![b'#'; 1_048_577]).unwrap();
    assert_invalid(ConsentSyncConfig::load(Some(file.path())), "config file exceeds size limit");
}

/// Verifies non-UTF-8 files are rejected.
#[test]
fn load_rejects_non_utf8_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&[0xFF, 0xFE, 0xFF]).unwrap();
    assert_invalid(ConsentSyncConfig::load(Some(file.path())), "config file must be utf-8");
}

/// Verifies a missing file is an I/O error.
#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConsentSyncConfig::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

/// Verifies a full file loads from disk.
#[test]
fn load_reads_valid_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[server]\nbind = \"0.0.0.0:9000\"\n{SHOP}").unwrap();
    let config = ConsentSyncConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.server.bind_addr().unwrap().port(), 9000);
    assert!(config.shop(&ShopDomain::new("DEMO.myshopify.com")).is_some());
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Verifies an empty file yields working defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = ConsentSyncConfig::from_toml("").unwrap();
    assert_eq!(config.server.bind, "127.0.0.1:8080");
    assert!(config.server.verify_webhooks);
    assert_eq!(config.store.store_type, StoreType::Memory);
    assert_eq!(config.fence.ttl_secs, 180);
    assert_eq!(config.platform.api_version, "2025-01");
    assert_eq!(config.log.sink, LogSinkType::Stderr);
    assert!(!config.email_provider.has_lists());

    let engine = config.engine_config();
    assert_eq!(engine.fence_ttl, Duration::from_secs(180));
    assert_eq!(engine.email_lists.suppression_override, SuppressionOverride::Never);
}

/// Verifies unknown keys fail parsing.
#[test]
fn unknown_keys_are_rejected() {
    let result = ConsentSyncConfig::from_toml("[server]\nbind = \"127.0.0.1:1\"\nmode = \"x\"\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
    let result = ConsentSyncConfig::from_toml("[metrics]\nenabled = true\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Verifies server limits.
#[test]
fn server_section_is_validated() {
    assert_invalid(
        ConsentSyncConfig::from_toml("[server]\nbind = \"nowhere\"\n"),
        "server.bind is invalid",
    );
    assert_invalid(
        ConsentSyncConfig::from_toml("[server]\nmax_body_bytes = 0\n"),
        "server.max_body_bytes",
    );
}

/// Verifies store backend rules.
#[test]
fn store_section_is_validated() {
    assert_invalid(
        ConsentSyncConfig::from_toml("[store]\ntype = \"sqlite\"\n"),
        "store.path is required",
    );
    assert_invalid(
        ConsentSyncConfig::from_toml("[store]\ntype = \"memory\"\npath = \"x.db\"\n"),
        "store.path is only valid",
    );
    let config = ConsentSyncConfig::from_toml(
        "[store]\ntype = \"sqlite\"\npath = \"data/consent.db\"\njournal_mode = \"delete\"\n",
    )
    .unwrap();
    let sqlite = config.store.sqlite_config().unwrap();
    assert_eq!(sqlite.path, Path::new("data/consent.db"));
    assert_eq!(sqlite.journal_mode, SqliteStoreMode::Delete);
}

/// Verifies fence lifetime bounds.
#[test]
fn fence_ttl_is_bounded() {
    assert_invalid(ConsentSyncConfig::from_toml("[fence]\nttl_secs = 60\n"), "fence.ttl_secs");
    assert_invalid(ConsentSyncConfig::from_toml("[fence]\nttl_secs = 600\n"), "fence.ttl_secs");
    let config = ConsentSyncConfig::from_toml("[fence]\nttl_secs = 300\n").unwrap();
    assert_eq!(config.engine_config().fence_ttl, Duration::from_secs(300));
}

/// Verifies platform settings and shop entries.
#[test]
fn platform_section_is_validated() {
    assert_invalid(
        ConsentSyncConfig::from_toml("[platform]\napi_version = \"latest\"\n"),
        "platform.api_version",
    );
    assert_invalid(
        ConsentSyncConfig::from_toml("[platform]\ntimeout_ms = 60000\n"),
        "platform.timeout_ms",
    );
    assert_invalid(
        ConsentSyncConfig::from_toml("[platform]\nbase_url_override = \"localhost:9\"\n"),
        "platform.base_url_override",
    );
    assert_invalid(
        ConsentSyncConfig::from_toml(&format!("{SHOP}{SHOP}")),
        "platform.shops[1].domain is duplicated",
    );
    assert_invalid(
        ConsentSyncConfig::from_toml(
            "[[platform.shops]]\ndomain = \"not a host\"\naccess_token = \"t\"\n",
        ),
        "platform.shops[0].domain",
    );
}

/// Verifies webhook secrets are required only while verification is on.
#[test]
fn webhook_secret_follows_verification_flag() {
    let shop = "[[platform.shops]]\ndomain = \"demo.myshopify.com\"\naccess_token = \"t\"\n";
    assert_invalid(
        ConsentSyncConfig::from_toml(shop),
        "platform.shops[0].webhook_secret is required",
    );
    let relaxed = format!("[server]\nverify_webhooks = false\n{shop}");
    assert!(ConsentSyncConfig::from_toml(&relaxed).is_ok());
}

/// Verifies email lists require an API key and blank lists are ignored.
#[test]
fn email_provider_section_is_validated() {
    assert_invalid(
        ConsentSyncConfig::from_toml("[email_provider]\nsingle_opt_in_list = \"L1\"\n"),
        "email_provider.api_key",
    );
    let config = ConsentSyncConfig::from_toml(
        "[email_provider]\napi_key = \"pk\"\nsingle_opt_in_list = \"L1\"\n\
         double_opt_in_list = \" \"\nsuppression_override = \"explicit_or_confirmed\"\n",
    )
    .unwrap();
    let lists = config.email_provider.list_config();
    assert_eq!(lists.single_opt_in_list.as_deref(), Some("L1"));
    assert_eq!(lists.double_opt_in_list, None);
    assert_eq!(lists.suppression_override, SuppressionOverride::ExplicitOrConfirmed);
}

/// Verifies log sink paths.
#[test]
fn log_section_is_validated() {
    assert_invalid(ConsentSyncConfig::from_toml("[log]\nsink = \"file\"\n"), "log.path");
    assert_invalid(
        ConsentSyncConfig::from_toml("[log]\nsink = \"stderr\"\npath = \"x.log\"\n"),
        "log.path is only valid",
    );
    let config = ConsentSyncConfig::from_toml("[log]\nsink = \"none\"\n").unwrap();
    assert_eq!(config.log.sink, LogSinkType::None);
}
