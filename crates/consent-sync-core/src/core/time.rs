// crates/consent-sync-core/src/core/time.rs
// ============================================================================
// Module: Consent Sync Time Model
// Description: Canonical timestamp representation for consent signals and logs.
// Purpose: Provide ordered, replayable time values across consent records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Consent Sync orders every consent signal by the time it happened, not the
//! time it arrived. Timestamps are unix milliseconds supplied by callers; the
//! runtime reads wall-clock time only through the [`crate::interfaces::Clock`]
//! seam.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing timestamps from external payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// Timestamp text is not valid RFC 3339.
    #[error("invalid rfc3339 timestamp: {0}")]
    Parse(String),
    /// Timestamp falls outside the representable millisecond range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(String),
}

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers or a [`crate::interfaces::Clock`].
/// - Ordering is total and matches chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns a timestamp advanced by `duration`, saturating at the upper bound.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns a timestamp moved back by `duration`, saturating at the lower bound.
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }

    /// Parses an RFC 3339 timestamp such as `2026-03-01T12:00:00-05:00`.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError`] when the text is malformed or out of range.
    pub fn parse_rfc3339(text: &str) -> Result<Self, TimestampError> {
        let parsed = OffsetDateTime::parse(text.trim(), &Rfc3339)
            .map_err(|err| TimestampError::Parse(format!("{text}: {err}")))?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis)
            .map(Self)
            .map_err(|_| TimestampError::OutOfRange(text.to_string()))
    }

    /// Formats the timestamp as RFC 3339 in UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::OutOfRange`] when the value cannot be represented.
    pub fn to_rfc3339(self) -> Result<String, TimestampError> {
        let nanos = i128::from(self.0) * 1_000_000;
        let value = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|err| TimestampError::OutOfRange(err.to_string()))?;
        value.format(&Rfc3339).map_err(|err| TimestampError::OutOfRange(err.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
