// crates/consent-sync-core/src/runtime/email_sync.rs
// ============================================================================
// Module: Consent Sync Email List Synchronizer
// Description: Mirrors stored consent onto email provider lists.
// Purpose: Subscribe or unsubscribe customers on the configured lists.
// Dependencies: crate::{core, interfaces, runtime::profile_lookup}, serde
// ============================================================================

//! ## Overview
//! Subscribing looks the profile up (creating it when absent), refreshes its
//! attributes, and then subscribes it to one list: the double opt-in list for
//! confirmed consent, otherwise the single opt-in list, each falling back to
//! the other when unset. Profiles already subscribed are left alone. Profiles
//! the provider has suppressed are skipped unless the consent evidence meets
//! the configured override policy.
//!
//! Unsubscribing refreshes the profile the same way, then removes the email
//! from every configured list; each removal is attempted regardless of the
//! others.
//!
//! Attribute refresh failures are recorded as warnings and do not stop list
//! membership changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::core::ConfirmationStrength;
use crate::core::ConsentEvidence;
use crate::core::EmailAddress;
use crate::core::SuppressionOverride;
use crate::interfaces::EmailProvider;
use crate::interfaces::ProfileAttributes;
use crate::interfaces::ProfileLookup;
use crate::interfaces::ProviderConsent;
use crate::interfaces::ProviderSubscription;
use crate::runtime::profile_lookup::TieredProfileLookup;

// ============================================================================
// SECTION: Types
// ============================================================================

/// List configuration for the email provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailListConfig {
    /// List used for single opt-in consent.
    pub single_opt_in_list: Option<String>,
    /// List used for confirmed (double) opt-in consent.
    pub double_opt_in_list: Option<String>,
    /// Policy for re-subscribing suppressed profiles.
    pub suppression_override: SuppressionOverride,
}

impl EmailListConfig {
    /// Returns the list for a confirmation strength, with fallback.
    #[must_use]
    pub fn list_for(&self, confirmation: ConfirmationStrength) -> Option<&str> {
        let (primary, fallback) = match confirmation {
            ConfirmationStrength::Confirmed => (&self.double_opt_in_list, &self.single_opt_in_list),
            ConfirmationStrength::Single => (&self.single_opt_in_list, &self.double_opt_in_list),
        };
        primary.as_deref().or(fallback.as_deref())
    }

    /// Returns every configured list, without duplicates.
    #[must_use]
    pub fn all_lists(&self) -> Vec<&str> {
        let mut lists: Vec<&str> = Vec::new();
        for list in [&self.single_opt_in_list, &self.double_opt_in_list].into_iter().flatten() {
            if !lists.contains(&list.as_str()) {
                lists.push(list);
            }
        }
        lists
    }
}

/// Email list sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSync {
    /// Customer email.
    pub email: EmailAddress,
    /// Target membership.
    pub subscribe: bool,
    /// Opt-in strength of the consent.
    pub confirmation: ConfirmationStrength,
    /// Evidence for overriding suppression.
    pub evidence: ConsentEvidence,
    /// Profile attributes to refresh.
    pub attributes: ProfileAttributes,
}

/// Result of an email list sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EmailSyncOutcome {
    /// Subscribed to a list.
    Subscribed {
        /// List joined.
        list: String,
    },
    /// Profile was already subscribed.
    AlreadySubscribed,
    /// Profile is suppressed and the evidence does not permit an override.
    SuppressedSkipped,
    /// No list is configured.
    NoListConfigured,
    /// Unsubscribe attempted on every configured list.
    Unsubscribed {
        /// Lists left successfully.
        lists: Vec<String>,
        /// Lists whose removal failed.
        failed: Vec<String>,
    },
    /// Sync failed before changing membership.
    Failed {
        /// Failure reason.
        reason: String,
    },
}

impl EmailSyncOutcome {
    /// Returns a short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Subscribed {
                ..
            } => "subscribed",
            Self::AlreadySubscribed => "already_subscribed",
            Self::SuppressedSkipped => "suppressed_skipped",
            Self::NoListConfigured => "no_list_configured",
            Self::Unsubscribed {
                failed,
                ..
            } => {
                if failed.is_empty() {
                    "unsubscribed"
                } else {
                    "unsubscribed_partially"
                }
            }
            Self::Failed {
                ..
            } => "failed",
        }
    }

    /// Returns true when the outcome represents a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Failed {
                ..
            } => true,
            Self::Unsubscribed {
                failed,
                ..
            } => !failed.is_empty(),
            _ => false,
        }
    }
}

/// Outcome plus non-fatal warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailSyncReport {
    /// Membership outcome.
    pub outcome: EmailSyncOutcome,
    /// Non-fatal problems encountered along the way.
    pub warnings: Vec<String>,
}

impl EmailSyncReport {
    /// Builds a report without warnings.
    const fn plain(outcome: EmailSyncOutcome) -> Self {
        Self {
            outcome,
            warnings: Vec::new(),
        }
    }

    /// Builds a failed report.
    fn failed(reason: impl Into<String>) -> Self {
        Self::plain(EmailSyncOutcome::Failed {
            reason: reason.into(),
        })
    }
}

// ============================================================================
// SECTION: Synchronizer
// ============================================================================

/// Mirrors consent onto email provider lists.
pub struct EmailListSynchronizer<E> {
    /// Provider client.
    provider: Arc<E>,
    /// Profile lookup strategy.
    lookup: Arc<dyn ProfileLookup + Send + Sync>,
    /// List configuration.
    config: EmailListConfig,
}

impl<E> EmailListSynchronizer<E>
where
    E: EmailProvider + Send + Sync + 'static,
{
    /// Creates a synchronizer using the tiered profile lookup.
    #[must_use]
    pub fn new(provider: Arc<E>, config: EmailListConfig) -> Self {
        let lookup = Arc::new(TieredProfileLookup::new(Arc::clone(&provider)));
        Self {
            provider,
            lookup,
            config,
        }
    }

    /// Replaces the profile lookup strategy.
    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn ProfileLookup + Send + Sync>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Returns the list configuration.
    #[must_use]
    pub const fn config(&self) -> &EmailListConfig {
        &self.config
    }

    /// Applies a sync request.
    ///
    /// The profile is looked up (or created) and its attributes refreshed
    /// before either direction. A lookup failure aborts a subscribe but not an
    /// unsubscribe, which still attempts every list.
    #[must_use]
    pub fn sync(&self, request: &EmailSync) -> EmailSyncReport {
        let mut warnings = Vec::new();
        let prepared = self.prepare_profile(request, &mut warnings);
        if !request.subscribe {
            if let Err(reason) = prepared {
                warnings.push(reason);
            }
            return self.unsubscribe(&request.email, warnings);
        }
        match prepared {
            Ok(subscription) => self.subscribe(request, subscription, warnings),
            Err(reason) => EmailSyncReport::failed(reason),
        }
    }

    /// Finds or creates the profile and refreshes its attributes.
    fn prepare_profile(
        &self,
        request: &EmailSync,
        warnings: &mut Vec<String>,
    ) -> Result<Option<ProviderSubscription>, String> {
        let existing = self
            .lookup
            .lookup(&request.email)
            .map_err(|err| format!("profile lookup failed: {err}"))?;
        match existing {
            Some(profile) => {
                if let Err(err) = self.provider.update_profile(&profile.id, &request.attributes) {
                    warnings.push(format!("profile attribute update failed: {err}"));
                }
                Ok(profile.subscription)
            }
            None => self
                .provider
                .create_profile(&request.email, &request.attributes)
                .map(|profile| profile.subscription)
                .map_err(|err| format!("profile create failed: {err}")),
        }
    }

    /// Subscribes the profile to the appropriate list.
    fn subscribe(
        &self,
        request: &EmailSync,
        subscription: Option<ProviderSubscription>,
        warnings: Vec<String>,
    ) -> EmailSyncReport {
        if let Some(state) = subscription {
            if state.suppressed && !self.config.suppression_override.permits(request.evidence) {
                return EmailSyncReport {
                    outcome: EmailSyncOutcome::SuppressedSkipped,
                    warnings,
                };
            }
            if !state.suppressed && state.consent == ProviderConsent::Subscribed {
                return EmailSyncReport {
                    outcome: EmailSyncOutcome::AlreadySubscribed,
                    warnings,
                };
            }
        }
        let Some(list) = self.config.list_for(request.confirmation) else {
            return EmailSyncReport {
                outcome: EmailSyncOutcome::NoListConfigured,
                warnings,
            };
        };
        let outcome = match self.provider.subscribe(list, &request.email) {
            Ok(()) => EmailSyncOutcome::Subscribed {
                list: list.to_string(),
            },
            Err(err) => EmailSyncOutcome::Failed {
                reason: format!("subscribe to {list} failed: {err}"),
            },
        };
        EmailSyncReport {
            outcome,
            warnings,
        }
    }

    /// Removes the email from every configured list.
    fn unsubscribe(&self, email: &EmailAddress, mut warnings: Vec<String>) -> EmailSyncReport {
        let lists = self.config.all_lists();
        if lists.is_empty() {
            return EmailSyncReport {
                outcome: EmailSyncOutcome::NoListConfigured,
                warnings,
            };
        }
        let mut left = Vec::new();
        let mut failed = Vec::new();
        for list in lists {
            match self.provider.unsubscribe(list, email) {
                Ok(()) => left.push(list.to_string()),
                Err(err) => {
                    warnings.push(format!("unsubscribe from {list} failed: {err}"));
                    failed.push(list.to_string());
                }
            }
        }
        EmailSyncReport {
            outcome: EmailSyncOutcome::Unsubscribed {
                lists: left,
                failed,
            },
            warnings,
        }
    }
}
