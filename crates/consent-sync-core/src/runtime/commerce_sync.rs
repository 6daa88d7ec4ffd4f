// crates/consent-sync-core/src/runtime/commerce_sync.rs
// ============================================================================
// Module: Consent Sync Commerce Synchronizer
// Description: Pushes locally decided consent to the commerce platform.
// Purpose: Keep platform consent aligned without re-triggering reconciliation.
// Dependencies: crate::{core, interfaces, runtime::fence}
// ============================================================================

//! ## Overview
//! A push always arms the suppression fence first, so the webhook the platform
//! emits for our write is recognized as an echo. If the platform rejects the
//! mutation over an email conflict, the customer's email is set and the
//! mutation retried exactly once. Any failure clears the fence, because no
//! echo will follow. Failures are reported, never raised: the stored state is
//! authoritative and a later signal will reconcile the platform.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::core::ConfirmationStrength;
use crate::core::ConsentStatus;
use crate::core::CustomerIdentity;
use crate::core::CustomerKey;
use crate::core::ShopDomain;
use crate::core::Timestamp;
use crate::interfaces::CommercePlatform;
use crate::interfaces::ConsentMutation;
use crate::interfaces::ConsentStore;
use crate::interfaces::PlatformError;
use crate::runtime::fence::SuppressionFence;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Consent push request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommercePush {
    /// Owning shop.
    pub shop: ShopDomain,
    /// Local customer row.
    pub key: CustomerKey,
    /// Customer identity.
    pub identity: CustomerIdentity,
    /// Status to push.
    pub status: ConsentStatus,
    /// Opt-in level to push.
    pub confirmation: ConfirmationStrength,
    /// Consent time.
    pub occurred_at: Timestamp,
}

/// Result of a consent push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PushOutcome {
    /// Mutation accepted on the first attempt.
    Pushed,
    /// Mutation accepted after setting the customer's email.
    PushedAfterEmailFix,
    /// Push not attempted.
    Skipped(String),
    /// Push failed; the fence was cleared.
    Failed(String),
}

impl PushOutcome {
    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pushed => "pushed",
            Self::PushedAfterEmailFix => "pushed_after_email_fix",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

// ============================================================================
// SECTION: Synchronizer
// ============================================================================

/// Pushes consent decisions to the commerce platform.
pub struct CommerceSynchronizer<S, P> {
    /// Fence service for echo suppression.
    fence: SuppressionFence<S>,
    /// Platform client.
    platform: Arc<P>,
}

impl<S, P> CommerceSynchronizer<S, P>
where
    S: ConsentStore,
    P: CommercePlatform,
{
    /// Creates a synchronizer.
    #[must_use]
    pub const fn new(fence: SuppressionFence<S>, platform: Arc<P>) -> Self {
        Self {
            fence,
            platform,
        }
    }

    /// Pushes a consent decision.
    #[must_use]
    pub fn push(&self, request: &CommercePush) -> PushOutcome {
        let Some(customer) = request.identity.customer_id else {
            return PushOutcome::Skipped("customer id unknown".to_string());
        };
        if let Err(err) = self.fence.arm(request.key, request.status) {
            return PushOutcome::Failed(format!("fence arm failed: {err}"));
        }
        let mutation = ConsentMutation {
            status: request.status,
            confirmation: request.confirmation,
            occurred_at: request.occurred_at,
        };
        let first = self.platform.update_marketing_consent(&request.shop, customer, &mutation);
        let outcome = match first {
            Ok(()) => PushOutcome::Pushed,
            Err(PlatformError::EmailConflict(reason)) => {
                self.remediate(request, &mutation, &reason)
            }
            Err(err) => PushOutcome::Failed(err.to_string()),
        };
        if let PushOutcome::Failed(reason) = &outcome
            && let Err(err) = self.fence.clear(request.key)
        {
            return PushOutcome::Failed(format!("{reason}; fence clear failed: {err}"));
        }
        outcome
    }

    /// Sets the customer email and retries the mutation once.
    fn remediate(
        &self,
        request: &CommercePush,
        mutation: &ConsentMutation,
        conflict: &str,
    ) -> PushOutcome {
        let (Some(customer), Some(email)) = (request.identity.customer_id, &request.identity.email)
        else {
            return PushOutcome::Failed(format!("email conflict without local email: {conflict}"));
        };
        if let Err(err) = self.platform.set_customer_email(&request.shop, customer, email) {
            return PushOutcome::Failed(format!("email remediation failed: {err}"));
        }
        match self.platform.update_marketing_consent(&request.shop, customer, mutation) {
            Ok(()) => PushOutcome::PushedAfterEmailFix,
            Err(err) => PushOutcome::Failed(format!("retry after email fix failed: {err}")),
        }
    }
}
