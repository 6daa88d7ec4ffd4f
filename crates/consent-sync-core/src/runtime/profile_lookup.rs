// crates/consent-sync-core/src/runtime/profile_lookup.rs
// ============================================================================
// Module: Consent Sync Profile Lookup
// Description: Profile lookup strategies for the email provider.
// Purpose: Hide account-dependent lookup capabilities behind one interface.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Some provider accounts can return subscription and suppression state with a
//! profile lookup, while others reject the extra field. [`TieredProfileLookup`]
//! tries the detailed lookup first and, once the provider reports the field as
//! unsupported, latches to the basic lookup for the rest of the process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::core::EmailAddress;
use crate::interfaces::EmailProvider;
use crate::interfaces::EmailProviderError;
use crate::interfaces::LookupDetail;
use crate::interfaces::ProfileLookup;
use crate::interfaces::ProviderProfile;

// ============================================================================
// SECTION: Lookups
// ============================================================================

/// Lookup that always requests the given detail level.
pub struct FixedProfileLookup<E> {
    /// Provider client.
    provider: Arc<E>,
    /// Detail level requested.
    detail: LookupDetail,
}

impl<E> FixedProfileLookup<E> {
    /// Creates a lookup requesting `detail`.
    #[must_use]
    pub const fn new(provider: Arc<E>, detail: LookupDetail) -> Self {
        Self {
            provider,
            detail,
        }
    }
}

impl<E: EmailProvider> ProfileLookup for FixedProfileLookup<E> {
    fn lookup(&self, email: &EmailAddress) -> Result<Option<ProviderProfile>, EmailProviderError> {
        self.provider.find_profile(email, self.detail)
    }
}

/// Lookup that degrades to the basic form after the first unsupported-field error.
pub struct TieredProfileLookup<E> {
    /// Provider client.
    provider: Arc<E>,
    /// Set once the detailed lookup is known to be unavailable.
    basic_only: AtomicBool,
}

impl<E> TieredProfileLookup<E> {
    /// Creates a tiered lookup starting with the detailed form.
    #[must_use]
    pub const fn new(provider: Arc<E>) -> Self {
        Self {
            provider,
            basic_only: AtomicBool::new(false),
        }
    }

    /// Returns true once the lookup has latched to the basic form.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.basic_only.load(Ordering::Relaxed)
    }
}

impl<E: EmailProvider> ProfileLookup for TieredProfileLookup<E> {
    fn lookup(&self, email: &EmailAddress) -> Result<Option<ProviderProfile>, EmailProviderError> {
        if !self.is_degraded() {
            match self.provider.find_profile(email, LookupDetail::WithSubscriptions) {
                Err(EmailProviderError::UnsupportedField(_)) => {
                    self.basic_only.store(true, Ordering::Relaxed);
                }
                other => return other,
            }
        }
        self.provider.find_profile(email, LookupDetail::Basic)
    }
}
