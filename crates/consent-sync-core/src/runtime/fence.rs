// crates/consent-sync-core/src/runtime/fence.rs
// ============================================================================
// Module: Consent Sync Suppression Fence
// Description: Echo suppression for consent pushed to the platform.
// Purpose: Stop our own platform writes from re-entering reconciliation.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Before the commerce synchronizer pushes consent, it arms a fence on the
//! customer row with the state it is about to write. A platform webhook that
//! arrives while the fence is armed and reports exactly that state is our
//! echo: it is consumed and dropped. A webhook reporting a different state is
//! a genuine change and is processed, and the fence stays armed so a late
//! echo is still caught. Expired fences are ignored and cleared.
//!
//! The fence lives on the customer row, so it is shared by every process that
//! shares the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::core::ConsentStatus;
use crate::core::CustomerConsentRecord;
use crate::core::CustomerKey;
use crate::core::FenceMarker;
use crate::interfaces::Clock;
use crate::interfaces::ConsentStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default fence lifetime.
pub const DEFAULT_FENCE_TTL: Duration = Duration::from_secs(180);
/// Shortest accepted fence lifetime.
pub const MIN_FENCE_TTL: Duration = Duration::from_secs(120);
/// Longest accepted fence lifetime.
pub const MAX_FENCE_TTL: Duration = Duration::from_secs(300);

// ============================================================================
// SECTION: Fence Service
// ============================================================================

/// Verdict for an incoming platform consent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceVerdict {
    /// No armed fence; process normally.
    Open,
    /// Armed fence expected this state; drop the signal.
    Echo,
    /// Armed fence expected a different state; process normally.
    Mismatch,
}

/// Arms, checks, and clears suppression fences.
#[derive(Clone)]
pub struct SuppressionFence<S> {
    /// Store holding the fence markers.
    store: S,
    /// Time source.
    clock: Arc<dyn Clock + Send + Sync>,
    /// Fence lifetime.
    ttl: Duration,
}

impl<S> SuppressionFence<S>
where
    S: ConsentStore,
{
    /// Creates a fence service. The TTL is clamped to the accepted range.
    #[must_use]
    pub fn new(store: S, clock: Arc<dyn Clock + Send + Sync>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl: ttl.clamp(MIN_FENCE_TTL, MAX_FENCE_TTL),
        }
    }

    /// Returns the effective fence lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Arms the fence for `key` expecting `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the fence cannot be stored.
    pub fn arm(
        &self,
        key: CustomerKey,
        expected: ConsentStatus,
    ) -> Result<FenceMarker, StoreError> {
        let marker = FenceMarker {
            until: self.clock.now().saturating_add(self.ttl),
            expected,
        };
        self.store.set_fence(key, Some(marker))?;
        Ok(marker)
    }

    /// Clears the fence for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the fence cannot be cleared.
    pub fn clear(&self, key: CustomerKey) -> Result<(), StoreError> {
        self.store.set_fence(key, None)
    }

    /// Checks an incoming state against the row's fence.
    ///
    /// An echo consumes the fence. An expired fence is cleared and treated as
    /// open.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when clearing the fence fails.
    pub fn check(
        &self,
        record: &CustomerConsentRecord,
        observed: ConsentStatus,
    ) -> Result<FenceVerdict, StoreError> {
        let Some(marker) = record.fence else {
            return Ok(FenceVerdict::Open);
        };
        if !marker.is_armed(self.clock.now()) {
            self.clear(record.key)?;
            return Ok(FenceVerdict::Open);
        }
        if marker.expected == observed {
            self.clear(record.key)?;
            return Ok(FenceVerdict::Echo);
        }
        Ok(FenceVerdict::Mismatch)
    }

    /// Returns true when a signal reporting `observed` for `key` should be
    /// suppressed, consuming the fence when it is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the row cannot be read or updated.
    pub fn should_suppress(
        &self,
        key: CustomerKey,
        observed: ConsentStatus,
    ) -> Result<bool, StoreError> {
        let Some(record) = self.store.load_customer(key)? else {
            return Ok(false);
        };
        Ok(self.check(&record, observed)? == FenceVerdict::Echo)
    }
}
