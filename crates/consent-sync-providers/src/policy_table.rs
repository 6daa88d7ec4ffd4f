// crates/consent-sync-providers/src/policy_table.rs
// ============================================================================
// Module: Policy Table Loader
// Description: Reads checkout consent policy rows from TOML.
// Purpose: Build the read-only policy resolver once at startup.
// Dependencies: consent-sync-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! A policy table is a TOML file of `[[rules]]` rows:
//!
//! ```toml
//! [[rules]]
//! region_code = "DE"
//! region_name = "Germany"
//! segment = "first_time"      # optional; omit or "any" for all segments
//! presentation = "OPT_IN"     # OPT_IN | OPT_OUT | NO_CHECKBOX
//! confirmation = "CONFIRMED"  # SINGLE | CONFIRMED
//! ```
//!
//! A malformed row is skipped and reported in [`PolicyTable::rejected`]; it
//! never blocks the rest of the table. Only an unreadable or unparsable file
//! is an error, and callers then fall back to an empty resolver, which always
//! yields the fixed default rule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use consent_sync_core::ConfirmationStrength;
use consent_sync_core::CustomerSegment;
use consent_sync_core::PolicyResolver;
use consent_sync_core::PolicyRule;
use consent_sync_core::PresentationMode;
use consent_sync_core::RegionCode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum policy table size in bytes.
const MAX_POLICY_TABLE_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Policy table loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyTableError {
    /// File could not be read.
    #[error("policy table io error: {0}")]
    Io(String),
    /// File is not valid TOML for a policy table.
    #[error("policy table parse error: {0}")]
    Parse(String),
    /// File exceeds the size limit.
    #[error("policy table exceeds size limit")]
    TooLarge,
}

/// Loaded policy table.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    /// Resolver built from the accepted rows.
    pub resolver: PolicyResolver,
    /// Number of accepted rows.
    pub accepted: usize,
    /// Messages for skipped rows, one per row.
    pub rejected: Vec<String>,
}

/// Policy table file layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyTableFile {
    /// Raw rows.
    #[serde(default)]
    rules: Vec<RawPolicyRow>,
}

/// Row as written in the file, before validation.
#[derive(Debug, Deserialize)]
struct RawPolicyRow {
    /// Region code key.
    region_code: Option<String>,
    /// Region name key.
    region_name: Option<String>,
    /// Segment label.
    segment: Option<String>,
    /// Presentation label.
    presentation: Option<String>,
    /// Confirmation label.
    confirmation: Option<String>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads a policy table from disk.
///
/// # Errors
///
/// Returns [`PolicyTableError`] when the file is unreadable, too large, or
/// not valid TOML.
pub fn load_policy_table(path: &Path) -> Result<PolicyTable, PolicyTableError> {
    let metadata = fs::metadata(path).map_err(|err| PolicyTableError::Io(err.to_string()))?;
    if metadata.len() > MAX_POLICY_TABLE_BYTES {
        return Err(PolicyTableError::TooLarge);
    }
    let text = fs::read_to_string(path).map_err(|err| PolicyTableError::Io(err.to_string()))?;
    parse_policy_table(&text)
}

/// Parses policy table text.
///
/// # Errors
///
/// Returns [`PolicyTableError::Parse`] when the text is not a policy table.
pub fn parse_policy_table(text: &str) -> Result<PolicyTable, PolicyTableError> {
    let file: PolicyTableFile =
        toml::from_str(text).map_err(|err| PolicyTableError::Parse(err.to_string()))?;
    let mut rules = Vec::new();
    let mut rejected = Vec::new();
    for (index, row) in file.rules.into_iter().enumerate() {
        match validate_row(row) {
            Ok(rule) => rules.push(rule),
            Err(reason) => rejected.push(format!("rules[{index}]: {reason}")),
        }
    }
    let accepted = rules.len();
    Ok(PolicyTable {
        resolver: PolicyResolver::from_rules(rules),
        accepted,
        rejected,
    })
}

/// Validates one raw row.
fn validate_row(row: RawPolicyRow) -> Result<PolicyRule, String> {
    let region_code = match row.region_code.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(RegionCode::parse(raw).ok_or_else(|| format!("bad region_code {raw}"))?),
    };
    let region_name = row.region_name.map(|name| name.trim().to_string()).filter(|n| !n.is_empty());
    if region_code.is_none() && region_name.is_none() {
        return Err("row needs region_code or region_name".to_string());
    }
    let segment = match row.segment.as_deref().map(str::trim) {
        None | Some("" | "*" | "any" | "ANY") => None,
        Some(raw) => Some(CustomerSegment::parse(raw).ok_or_else(|| format!("bad segment {raw}"))?),
    };
    let presentation = row
        .presentation
        .as_deref()
        .and_then(PresentationMode::parse)
        .ok_or_else(|| "missing or bad presentation".to_string())?;
    let confirmation = row
        .confirmation
        .as_deref()
        .and_then(ConfirmationStrength::parse)
        .ok_or_else(|| "missing or bad confirmation".to_string())?;
    Ok(PolicyRule {
        region_code,
        region_name,
        segment,
        presentation,
        confirmation,
    })
}
