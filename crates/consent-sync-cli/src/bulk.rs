// crates/consent-sync-cli/src/bulk.rs
// ============================================================================
// Module: Bulk Sync
// Description: JSON-lines import of platform consent exports.
// Purpose: Replay an exported customer list through the reconciliation engine.
// Dependencies: consent-sync-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Each input line is one customer export row. Rows are converted into
//! bulk-sync signals, which reconcile like platform webhooks except that they
//! never push back to the commerce platform. Malformed rows are rejected with
//! their line number and do not stop the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use consent_sync_core::CommercePlatform;
use consent_sync_core::ConfirmationStrength;
use consent_sync_core::ConsentSignal;
use consent_sync_core::ConsentStatus;
use consent_sync_core::CustomerId;
use consent_sync_core::CustomerIdentity;
use consent_sync_core::EmailAddress;
use consent_sync_core::EmailProvider;
use consent_sync_core::ProfileTraits;
use consent_sync_core::ReconciliationEngine;
use consent_sync_core::RegionCode;
use consent_sync_core::SharedConsentStore;
use consent_sync_core::ShopDomain;
use consent_sync_core::Signal;
use consent_sync_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Row Format
// ============================================================================

/// One exported customer row.
#[derive(Debug, Deserialize)]
struct BulkRow {
    /// Platform customer id (numeric or global id).
    #[serde(default)]
    customer_id: Option<Value>,
    /// Customer email.
    #[serde(default)]
    email: Option<String>,
    /// Platform marketing state.
    state: String,
    /// Platform opt-in level.
    #[serde(default)]
    opt_in_level: Option<String>,
    /// Time the platform last changed the state (RFC 3339).
    #[serde(default)]
    updated_at: Option<String>,
    /// Customer region code.
    #[serde(default)]
    region_code: Option<String>,
    /// Customer first name.
    #[serde(default)]
    first_name: Option<String>,
    /// Customer last name.
    #[serde(default)]
    last_name: Option<String>,
}

/// Parses one input line into a bulk-sync signal.
///
/// Rows without `updated_at` are stamped with `fallback`.
///
/// # Errors
///
/// Returns a message when the row is not valid JSON, has no identity, or
/// carries an unknown state or malformed time.
pub fn parse_bulk_row(
    shop: &ShopDomain,
    line: &str,
    fallback: Timestamp,
) -> Result<Signal, String> {
    let row: BulkRow = serde_json::from_str(line).map_err(|err| format!("invalid row: {err}"))?;
    let customer_id = match row.customer_id {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => number.as_u64().filter(|id| *id > 0).map(CustomerId::new),
        Some(Value::String(text)) => CustomerId::parse(&text),
        Some(_) => return Err("customer_id must be a number or string".to_string()),
    };
    let email = row.email.as_deref().and_then(EmailAddress::parse);
    let identity = CustomerIdentity::new(customer_id, email);
    if identity.is_empty() {
        return Err("row has neither customer_id nor email".to_string());
    }
    let status = ConsentStatus::from_platform_state(&row.state)
        .ok_or_else(|| format!("unknown state: {}", row.state.trim()))?;
    let occurred_at = match row.updated_at.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => {
            Timestamp::parse_rfc3339(text).map_err(|err| err.to_string())?
        }
        _ => fallback,
    };
    Ok(Signal::BulkSync(ConsentSignal {
        shop: shop.clone(),
        identity,
        status,
        confirmation: row.opt_in_level.as_deref().and_then(ConfirmationStrength::parse),
        region_code: row.region_code.as_deref().and_then(RegionCode::parse),
        traits: ProfileTraits {
            first_name: non_blank(row.first_name),
            last_name: non_blank(row.last_name),
        },
        occurred_at,
    }))
}

/// Drops blank names.
fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// A row that did not reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    /// One-based input line number.
    pub line: usize,
    /// Failure description.
    pub message: String,
}

/// Outcome counts for one bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    /// Non-blank lines read.
    pub rows: usize,
    /// Rows that could not be parsed.
    pub rejected: usize,
    /// Rows the engine failed to reconcile.
    pub failed: usize,
    /// Reconciled rows keyed by effect.
    pub effects: BTreeMap<String, usize>,
    /// Per-row failure details.
    pub failures: Vec<RowFailure>,
}

/// Reconciles every row of a JSON-lines export.
pub fn run_bulk_sync<P, E>(
    engine: &ReconciliationEngine<SharedConsentStore, P, E>,
    shop: &ShopDomain,
    input: &str,
) -> BulkSummary
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let mut summary = BulkSummary::default();
    for (index, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        summary.rows += 1;
        let line_number = index + 1;
        let signal = match parse_bulk_row(shop, line, engine.now()) {
            Ok(signal) => signal,
            Err(message) => {
                summary.rejected += 1;
                summary.failures.push(RowFailure {
                    line: line_number,
                    message,
                });
                continue;
            }
        };
        match engine.reconcile(&signal) {
            Ok(report) => {
                *summary.effects.entry(report.effect.as_str().to_string()).or_insert(0) += 1;
            }
            Err(err) => {
                summary.failed += 1;
                summary.failures.push(RowFailure {
                    line: line_number,
                    message: err.to_string(),
                });
            }
        }
    }
    summary
}
