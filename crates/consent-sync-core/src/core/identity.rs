// crates/consent-sync-core/src/core/identity.rs
// ============================================================================
// Module: Consent Sync Identity Resolution
// Description: Rules for reconciling customer-id and email lookups to one row.
// Purpose: Keep each customer on exactly one consent row per shop.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! A signal may identify a customer by platform id, by email, or both. Stores
//! look up each key independently and pass both results to [`plan_identity`],
//! which decides how to bring them onto one row:
//!
//! - an email-only row found alongside an id row is folded into the id row;
//! - a row found by id with a new email adopts it;
//! - a row found by email without an id adopts the id;
//! - an email held by a row belonging to a different customer id is released,
//!   because the platform reports the email now belongs to this customer.
//!
//! Stores execute the plan inside one transaction. Folded rows are never
//! deleted; they are kept as merged and stop resolving.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::identifiers::CustomerIdentity;
use crate::core::identifiers::CustomerKey;
use crate::core::records::CustomerConsentRecord;

// ============================================================================
// SECTION: Identity Plans
// ============================================================================

/// Action a store takes to resolve a customer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IdentityPlan {
    /// No row matches; the caller may create one.
    Missing,
    /// One row matches both keys already.
    Existing {
        /// Matching row.
        key: CustomerKey,
    },
    /// Row found by id adopts the identity's email.
    AttachEmail {
        /// Row found by id.
        key: CustomerKey,
    },
    /// Row found by email adopts the identity's customer id.
    AttachCustomerId {
        /// Row found by email.
        key: CustomerKey,
    },
    /// Email-only row is merged into the id row and retired as merged.
    Fold {
        /// Row found by id; keeps its key.
        survivor: CustomerKey,
        /// Row found by email; its events are relinked to `survivor`.
        absorbed: CustomerKey,
    },
    /// Email is detached from a row owned by another customer id.
    ReleaseEmail {
        /// Row currently holding the email.
        holder: CustomerKey,
        /// Row found by id that takes the email, if any.
        target: Option<CustomerKey>,
    },
}

impl IdentityPlan {
    /// Returns the row the identity resolves to after the plan runs.
    #[must_use]
    pub const fn resolved_key(self) -> Option<CustomerKey> {
        match self {
            Self::Missing
            | Self::ReleaseEmail {
                target: None,
                ..
            } => None,
            Self::Existing {
                key,
            }
            | Self::AttachEmail {
                key,
            }
            | Self::AttachCustomerId {
                key,
            }
            | Self::Fold {
                survivor: key,
                ..
            }
            | Self::ReleaseEmail {
                target: Some(key),
                ..
            } => Some(key),
        }
    }

    /// Returns true when the plan merges or reassigns rows.
    #[must_use]
    pub const fn is_merge(self) -> bool {
        matches!(self, Self::Fold { .. } | Self::ReleaseEmail { .. })
    }
}

/// Decides how to reconcile the id lookup and the email lookup for `identity`.
#[must_use]
pub fn plan_identity(
    identity: &CustomerIdentity,
    by_id: Option<&CustomerConsentRecord>,
    by_email: Option<&CustomerConsentRecord>,
) -> IdentityPlan {
    match (by_id, by_email) {
        (None, None) => IdentityPlan::Missing,
        (Some(row), None) => {
            if identity.email.is_some() && row.email != identity.email {
                IdentityPlan::AttachEmail {
                    key: row.key,
                }
            } else {
                IdentityPlan::Existing {
                    key: row.key,
                }
            }
        }
        (None, Some(row)) => match (identity.customer_id, row.customer_id) {
            (Some(_), None) => IdentityPlan::AttachCustomerId {
                key: row.key,
            },
            (Some(incoming), Some(held)) if incoming != held => IdentityPlan::ReleaseEmail {
                holder: row.key,
                target: None,
            },
            _ => IdentityPlan::Existing {
                key: row.key,
            },
        },
        (Some(id_row), Some(email_row)) if id_row.key == email_row.key => IdentityPlan::Existing {
            key: id_row.key,
        },
        (Some(id_row), Some(email_row)) => {
            if email_row.customer_id.is_none() {
                IdentityPlan::Fold {
                    survivor: id_row.key,
                    absorbed: email_row.key,
                }
            } else {
                IdentityPlan::ReleaseEmail {
                    holder: email_row.key,
                    target: Some(id_row.key),
                }
            }
        }
    }
}

impl CustomerConsentRecord {
    /// Merges an email-only row into this row.
    ///
    /// The email moves over. The consent state with the newer
    /// `last_consent_at` is kept; on a tie this row's state stays.
    pub fn absorb(&mut self, other: &Self) {
        if other.email.is_some() {
            self.email.clone_from(&other.email);
        }
        let other_newer = match (self.last_consent_at, other.last_consent_at) {
            (None, Some(_)) => true,
            (Some(mine), Some(theirs)) => theirs > mine,
            _ => false,
        };
        if other_newer {
            self.status = other.status;
            self.last_consent_at = other.last_consent_at;
            self.last_source = other.last_source;
        }
        if self.region.is_none() {
            self.region.clone_from(&other.region);
        }
        if self.fence.is_none() {
            self.fence = other.fence;
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
