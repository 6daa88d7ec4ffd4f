// crates/consent-sync-core/src/runtime/engine.rs
// ============================================================================
// Module: Consent Sync Reconciliation Engine
// Description: Single execution path for every consent signal.
// Purpose: Order signals by event time, store one consent state per customer,
//          and fan decisions out to the commerce platform and email provider.
// Dependencies: crate::{core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! The engine is the single canonical path for consent changes. The HTTP
//! surface and the bulk importer both call into it, so every signal goes
//! through the same steps:
//!
//! 1. resolve the customer row, folding split identities;
//! 2. drop echoes of our own platform pushes (platform webhooks only);
//! 3. apply the candidate through the store's ordered write;
//! 4. append exactly one audit event describing the effect;
//! 5. when the status changed, push to the platform (checkout decisions
//!    only) and mirror onto the email lists.
//!
//! Checkout toggles never touch stored consent. They are recorded as
//! provisional events and only take effect when the order webhook confirms
//! the checkout.
//!
//! Synchronizer failures are logged and reported but never returned as
//! errors: the stored state stays authoritative.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::CheckoutSession;
use crate::core::ConfirmationStrength;
use crate::core::ConsentEvent;
use crate::core::ConsentEventKind;
use crate::core::ConsentEvidence;
use crate::core::ConsentSignal;
use crate::core::ConsentStatus;
use crate::core::CustomerConsentRecord;
use crate::core::CustomerDraft;
use crate::core::CustomerId;
use crate::core::CustomerIdentity;
use crate::core::CustomerKey;
use crate::core::CustomerSegment;
use crate::core::EventEffect;
use crate::core::EventInsert;
use crate::core::IdentityPlan;
use crate::core::NewConsentEvent;
use crate::core::OrderLink;
use crate::core::OrderSignal;
use crate::core::PolicyRequest;
use crate::core::PresentationMode;
use crate::core::ProfileSignal;
use crate::core::PruneReport;
use crate::core::RegionCode;
use crate::core::SessionId;
use crate::core::SessionOpen;
use crate::core::ShopDomain;
use crate::core::Signal;
use crate::core::StatusWrite;
use crate::core::Timestamp;
use crate::core::ToggleSignal;
use crate::core::WriteOutcome;
use crate::interfaces::Clock;
use crate::interfaces::CommercePlatform;
use crate::interfaces::ConsentStore;
use crate::interfaces::EmailProvider;
use crate::interfaces::ProfileAttributes;
use crate::interfaces::RegionLocator;
use crate::interfaces::SessionIdGenerator;
use crate::interfaces::StoreError;
use crate::interfaces::SyncLogEvent;
use crate::interfaces::SyncLogLevel;
use crate::interfaces::SyncLogSink;
use crate::runtime::commerce_sync::CommercePush;
use crate::runtime::commerce_sync::CommerceSynchronizer;
use crate::runtime::commerce_sync::PushOutcome;
use crate::runtime::email_sync::EmailListConfig;
use crate::runtime::email_sync::EmailListSynchronizer;
use crate::runtime::email_sync::EmailSync;
use crate::runtime::email_sync::EmailSyncReport;
use crate::runtime::fence::DEFAULT_FENCE_TTL;
use crate::runtime::fence::FenceVerdict;
use crate::runtime::fence::SuppressionFence;
use crate::runtime::policy::PolicyMatch;
use crate::runtime::policy::PolicyResolver;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Suppression fence lifetime.
    pub fence_ttl: Duration,
    /// Email list configuration.
    pub email_lists: EmailListConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fence_ttl: DEFAULT_FENCE_TTL,
            email_lists: EmailListConfig::default(),
        }
    }
}

/// Collaborators the engine is built from.
pub struct EngineParts<S, P, E> {
    /// Consent store.
    pub store: S,
    /// Commerce platform client.
    pub platform: Arc<P>,
    /// Email provider client.
    pub email: Arc<E>,
    /// Policy table.
    pub policy: Arc<PolicyResolver>,
    /// Geographic fallback for region lookup.
    pub locator: Arc<dyn RegionLocator + Send + Sync>,
    /// Time source.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// Session identifier source.
    pub session_ids: Arc<dyn SessionIdGenerator + Send + Sync>,
    /// Operational log sink.
    pub log: Arc<dyn SyncLogSink>,
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Engine errors. Only storage failures surface; synchronizer failures are
/// reported in [`ReconcileReport`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Policy handed to the storefront with its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionGrant {
    /// Session identifier the storefront echoes on toggles.
    pub session_id: SessionId,
    /// Presentation mode to show.
    pub presentation: PresentationMode,
    /// Opt-in strength required.
    pub confirmation: ConfirmationStrength,
    /// Region the policy applies to.
    pub region: Option<RegionCode>,
    /// Segment used for resolution, when known.
    pub segment: Option<CustomerSegment>,
    /// Lookup step that matched.
    pub matched: PolicyMatch,
}

/// Result of recording a checkout toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ToggleReport {
    /// Toggle recorded (or already recorded) as provisional intent.
    Recorded {
        /// True when an identical toggle was already stored.
        duplicate: bool,
    },
    /// Session id is unknown; nothing was recorded.
    UnknownSession,
    /// Session already linked to an order; the toggle was logged and ignored.
    SessionClosed,
}

/// Result of reconciling one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Signal kind.
    pub kind: ConsentEventKind,
    /// Effect on stored consent.
    pub effect: EventEffect,
    /// Status carried by the signal or seeded by it.
    pub status: Option<ConsentStatus>,
    /// Customer row the signal resolved to.
    pub customer_key: Option<CustomerKey>,
    /// Audit event identifier.
    #[serde(skip)]
    pub event: Option<EventInsert>,
    /// Commerce push outcome, when attempted.
    pub commerce: Option<PushOutcome>,
    /// Email list outcome, when attempted.
    pub email: Option<EmailSyncReport>,
}

impl ReconcileReport {
    /// Builds a report with no synchronizer activity.
    const fn quiet(
        kind: ConsentEventKind,
        effect: EventEffect,
        status: Option<ConsentStatus>,
        customer_key: Option<CustomerKey>,
        event: EventInsert,
    ) -> Self {
        Self {
            kind,
            effect,
            status,
            customer_key,
            event: Some(event),
            commerce: None,
            email: None,
        }
    }
}

/// Fan-out work for an applied decision.
struct SyncPlan<'a> {
    /// Owning shop.
    shop: &'a ShopDomain,
    /// Resolved customer row.
    record: &'a CustomerConsentRecord,
    /// New status.
    status: ConsentStatus,
    /// Opt-in strength.
    confirmation: ConfirmationStrength,
    /// Evidence for suppression overrides.
    evidence: ConsentEvidence,
    /// Profile attributes.
    attributes: ProfileAttributes,
    /// Consent time.
    occurred_at: Timestamp,
    /// Whether the decision originated locally and must be pushed upstream.
    push_upstream: bool,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Consent reconciliation engine.
pub struct ReconciliationEngine<S, P, E> {
    /// Consent store.
    store: S,
    /// Echo suppression.
    fence: SuppressionFence<S>,
    /// Platform client.
    platform: Arc<P>,
    /// Platform push.
    commerce: CommerceSynchronizer<S, P>,
    /// Email list mirroring.
    email: EmailListSynchronizer<E>,
    /// Policy table.
    policy: Arc<PolicyResolver>,
    /// Region fallback.
    locator: Arc<dyn RegionLocator + Send + Sync>,
    /// Time source.
    clock: Arc<dyn Clock + Send + Sync>,
    /// Session id source.
    session_ids: Arc<dyn SessionIdGenerator + Send + Sync>,
    /// Operational log.
    log: Arc<dyn SyncLogSink>,
}

impl<S, P, E> ReconciliationEngine<S, P, E>
where
    S: ConsentStore + Clone,
    P: CommercePlatform,
    E: EmailProvider + Send + Sync + 'static,
{
    /// Builds an engine from its collaborators.
    #[must_use]
    pub fn new(parts: EngineParts<S, P, E>, config: EngineConfig) -> Self {
        let fence =
            SuppressionFence::new(parts.store.clone(), Arc::clone(&parts.clock), config.fence_ttl);
        let commerce = CommerceSynchronizer::new(fence.clone(), Arc::clone(&parts.platform));
        let email = EmailListSynchronizer::new(parts.email, config.email_lists);
        Self {
            store: parts.store,
            fence,
            platform: parts.platform,
            commerce,
            email,
            policy: parts.policy,
            locator: parts.locator,
            clock: parts.clock,
            session_ids: parts.session_ids,
            log: parts.log,
        }
    }

    /// Replaces the email synchronizer (for alternative lookup strategies).
    #[must_use]
    pub fn with_email_synchronizer(mut self, email: EmailListSynchronizer<E>) -> Self {
        self.email = email;
        self
    }

    /// Returns the consent store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the suppression fence service.
    #[must_use]
    pub const fn fence(&self) -> &SuppressionFence<S> {
        &self.fence
    }

    /// Returns the current time from the engine clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ------------------------------------------------------------------------
    // Storefront
    // ------------------------------------------------------------------------

    /// Resolves the checkout policy and opens (or refreshes) the session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the session cannot be stored.
    pub fn open_session(&self, request: &PolicyRequest) -> Result<SessionGrant, EngineError> {
        let region = request
            .region_code
            .clone()
            .or_else(|| request.client_ip.and_then(|ip| self.locator.locate(ip)));
        let segment =
            self.derive_segment(&request.shop, request.customer_id, request.order_count, false);
        let decision =
            self.policy.resolve(region.as_ref(), request.country_name.as_deref(), segment);
        let session = self.store.open_session(&SessionOpen {
            candidate_id: self.session_ids.next_session_id(),
            shop: request.shop.clone(),
            checkout_token: request.checkout_token.clone(),
            presentation: decision.presentation,
            region: decision.region.clone(),
            display_text: request.display_text.clone(),
            now: self.clock.now(),
        })?;
        let now = self.clock.now();
        self.emit(
            SyncLogEvent::new(now, SyncLogLevel::Info, "policy", decision.presentation.as_str())
                .shop(&request.shop)
                .message(format!("session {} matched {}", session.id, decision.matched.as_str())),
        );
        Ok(SessionGrant {
            session_id: session.id,
            presentation: session.presentation,
            confirmation: decision.confirmation,
            region: session.region,
            segment,
            matched: decision.matched,
        })
    }

    /// Records a checkbox interaction as provisional intent.
    ///
    /// Identical toggles (same session, same event time) are recorded once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the event cannot be stored.
    pub fn record_toggle(&self, toggle: &ToggleSignal) -> Result<ToggleReport, EngineError> {
        let Some(session) = self.store.load_session(&toggle.session_id)? else {
            self.emit(
                SyncLogEvent::new(self.clock.now(), SyncLogLevel::Warn, "toggle", "unknown_session")
                    .signal(ConsentEventKind::CheckoutToggle)
                    .message(format!("toggle for unknown session {}", toggle.session_id)),
            );
            return Ok(ToggleReport::UnknownSession);
        };
        let closed = session.is_completed();
        let event = NewConsentEvent {
            shop: session.shop.clone(),
            kind: ConsentEventKind::CheckoutToggle,
            outcome: Some(toggle.status),
            effect: if closed { EventEffect::Rejected } else { EventEffect::Provisional },
            note: json!({
                "presentation": session.presentation,
                "display_text": toggle.display_text.as_ref().or(session.display_text.as_ref()),
                "reason": if closed { Some("session already completed") } else { None },
            }),
            session_id: Some(session.id.clone()),
            customer_key: None,
            occurred_at: toggle.occurred_at,
            recorded_at: self.clock.now(),
        };
        let inserted = self.store.append_event(&event)?;
        if closed {
            return Ok(ToggleReport::SessionClosed);
        }
        let duplicate = matches!(inserted, EventInsert::Duplicate(_));
        if !duplicate {
            let events = self.store.events_for_session(&session.id)?;
            if let Some(latest) = latest_toggle(&events).and_then(|event| event.outcome) {
                self.store.record_intent(
                    &session.id,
                    latest,
                    toggle.display_text.as_deref(),
                    self.clock.now(),
                )?;
            }
        }
        Ok(ToggleReport::Recorded {
            duplicate,
        })
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Reconciles one signal into stored consent and fans the result out.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when storage fails.
    pub fn reconcile(&self, signal: &Signal) -> Result<ReconcileReport, EngineError> {
        let report = match signal {
            Signal::CheckoutCompleted(order) => self.reconcile_order(order),
            Signal::PlatformConsent(consent) => self.reconcile_authoritative(
                consent,
                ConsentEventKind::PlatformConsentWebhook,
                true,
            ),
            Signal::BulkSync(consent) => {
                self.reconcile_authoritative(consent, ConsentEventKind::BulkSync, false)
            }
            Signal::ProfileUpdate(profile) => self.reconcile_profile(profile),
        }?;
        let now = self.clock.now();
        self.emit(
            SyncLogEvent::new(now, SyncLogLevel::Info, "reconcile", report.effect.as_str())
                .shop(signal.shop())
                .signal(report.kind)
                .customer_key(report.customer_key),
        );
        Ok(report)
    }

    /// Deletes sessions that never completed and were last touched longer
    /// than `older_than` ago.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the prune fails.
    pub fn prune_sessions(&self, older_than: Duration) -> Result<PruneReport, EngineError> {
        let cutoff = self.clock.now().saturating_sub(older_than);
        let report = self.store.prune_stale_sessions(cutoff)?;
        let detail = format!("{} sessions, {} events", report.sessions, report.events);
        let now = self.clock.now();
        self.emit(SyncLogEvent::new(now, SyncLogLevel::Info, "prune", "pruned").message(detail));
        Ok(report)
    }

    /// Applies a platform-authoritative consent state.
    fn reconcile_authoritative(
        &self,
        signal: &ConsentSignal,
        kind: ConsentEventKind,
        fenced: bool,
    ) -> Result<ReconcileReport, EngineError> {
        if signal.identity.is_empty() {
            return self.reject(
                &signal.shop,
                kind,
                Some(signal.status),
                None,
                signal.occurred_at,
                "signal has no customer identity",
            );
        }
        let record = self.resolve_or_create(
            &signal.shop,
            &signal.identity,
            signal.region_code.clone(),
            kind,
        )?;
        if fenced && self.fence.check(&record, signal.status)? == FenceVerdict::Echo {
            let event = self.append(
                &signal.shop,
                kind,
                Some(signal.status),
                EventEffect::Suppressed,
                json!({ "reason": "echo of pushed consent" }),
                None,
                Some(record.key),
                signal.occurred_at,
            )?;
            return Ok(ReconcileReport::quiet(
                kind,
                EventEffect::Suppressed,
                Some(signal.status),
                Some(record.key),
                event,
            ));
        }
        let outcome = self.store.write_status(&StatusWrite {
            key: record.key,
            status: signal.status,
            occurred_at: signal.occurred_at,
            source: kind,
            region: signal.region_code.clone(),
        })?;
        let event = self.append(
            &signal.shop,
            kind,
            Some(signal.status),
            outcome.effect(),
            json!({
                "confirmation": signal.confirmation,
                "write": outcome,
            }),
            None,
            Some(record.key),
            signal.occurred_at,
        )?;
        let mut report = ReconcileReport::quiet(
            kind,
            outcome.effect(),
            Some(signal.status),
            Some(record.key),
            event,
        );
        if outcome.is_applied() {
            let record = self.store.load_customer(record.key)?.unwrap_or(record);
            let confirmation = signal.confirmation.unwrap_or(ConfirmationStrength::Single);
            let segment = self.derive_segment(&signal.shop, record.customer_id, None, true);
            let plan = SyncPlan {
                shop: &signal.shop,
                record: &record,
                status: signal.status,
                confirmation,
                evidence: ConsentEvidence {
                    explicit_checkbox: false,
                    confirmed_opt_in: confirmation == ConfirmationStrength::Confirmed,
                },
                attributes: ProfileAttributes {
                    traits: signal.traits.clone(),
                    region: record.region.clone(),
                    segment,
                },
                occurred_at: signal.occurred_at,
                push_upstream: false,
            };
            self.fan_out(&plan, &mut report, kind);
        }
        Ok(report)
    }

    /// Resolves a completed checkout into stored consent.
    fn reconcile_order(&self, order: &OrderSignal) -> Result<ReconcileReport, EngineError> {
        let kind = ConsentEventKind::CheckoutCompleted;
        let session = match &order.checkout_token {
            Some(token) => self.store.find_session_by_token(&order.shop, token)?,
            None => None,
        };
        let Some(session) = session else {
            let event = self.append(
                &order.shop,
                kind,
                None,
                EventEffect::NoSession,
                json!({ "order_id": order.order_id, "checkout_token": order.checkout_token }),
                None,
                None,
                order.occurred_at,
            )?;
            return Ok(ReconcileReport::quiet(kind, EventEffect::NoSession, None, None, event));
        };
        let session_events = self.store.events_for_session(&session.id)?;
        let toggle = latest_toggle(&session_events);
        let status = toggle
            .and_then(|event| event.outcome)
            .unwrap_or_else(|| session.presentation.default_status());
        let link = self.store.complete_session(
            &session.id,
            &order.order_id,
            status.is_subscribed(),
            self.clock.now(),
        )?;
        let rejection = match link {
            OrderLink::Conflict(reason) => Some(reason),
            OrderLink::Linked(_) | OrderLink::AlreadyLinked(_) if order.identity.is_empty() => {
                Some("order has no customer identity".to_string())
            }
            OrderLink::Linked(_) | OrderLink::AlreadyLinked(_) => None,
        };
        if let Some(reason) = rejection {
            return self.reject(
                &order.shop,
                kind,
                Some(status),
                Some(&session),
                order.occurred_at,
                &reason,
            );
        }
        let region = order.region_code.clone().or_else(|| session.region.clone());
        let record = self.resolve_or_create(&order.shop, &order.identity, region.clone(), kind)?;
        let backfilled = self.store.link_session_events(&session.id, record.key)?;
        let outcome = self.store.write_status(&StatusWrite {
            key: record.key,
            status,
            occurred_at: order.occurred_at,
            source: kind,
            region: region.clone(),
        })?;
        let mut note = checkout_note(order, &session, toggle.is_some(), backfilled, outcome);
        let applied = if outcome.is_applied() {
            let prior_orders = order.orders_including_current.map(|total| total.saturating_sub(1));
            let customer = record.customer_id.or(order.identity.customer_id);
            let segment = self.derive_segment(&order.shop, customer, prior_orders, true);
            let decision =
                self.policy.resolve(region.as_ref(), order.country_name.as_deref(), segment);
            if let Value::Object(map) = &mut note {
                map.insert("segment".to_string(), json!(segment));
                map.insert("confirmation".to_string(), json!(decision.confirmation));
            }
            Some((segment, decision.confirmation))
        } else {
            None
        };
        let event = self.append(
            &order.shop,
            kind,
            Some(status),
            outcome.effect(),
            note,
            Some(session.id.clone()),
            Some(record.key),
            order.occurred_at,
        )?;
        let mut report =
            ReconcileReport::quiet(kind, outcome.effect(), Some(status), Some(record.key), event);
        if let Some((segment, confirmation)) = applied {
            let record = self.store.load_customer(record.key)?.unwrap_or(record);
            let explicit_checkbox = toggle.is_some()
                && session.presentation == PresentationMode::OptIn
                && status == ConsentStatus::Subscribed;
            let plan = SyncPlan {
                shop: &order.shop,
                record: &record,
                status,
                confirmation,
                evidence: ConsentEvidence {
                    explicit_checkbox,
                    confirmed_opt_in: false,
                },
                attributes: ProfileAttributes {
                    traits: order.traits.clone(),
                    region: record.region.clone(),
                    segment,
                },
                occurred_at: order.occurred_at,
                push_upstream: true,
            };
            self.fan_out(&plan, &mut report, kind);
        }
        Ok(report)
    }

    /// Records a profile update; seeds consent only for new rows.
    fn reconcile_profile(&self, profile: &ProfileSignal) -> Result<ReconcileReport, EngineError> {
        let kind = ConsentEventKind::ProfileFieldUpdate;
        if profile.identity.is_empty() {
            return self.reject(
                &profile.shop,
                kind,
                profile.explicit_status,
                None,
                profile.occurred_at,
                "profile update has no customer identity",
            );
        }
        let resolution = self.store.resolve_customer(&profile.shop, &profile.identity)?;
        self.log_identity_plan(&profile.shop, &profile.identity, resolution.plan, kind);
        if let Some(record) = resolution.record {
            let event = self.append(
                &profile.shop,
                kind,
                None,
                EventEffect::Recorded,
                json!({ "explicit_status": profile.explicit_status }),
                None,
                Some(record.key),
                profile.occurred_at,
            )?;
            return Ok(ReconcileReport::quiet(
                kind,
                EventEffect::Recorded,
                None,
                Some(record.key),
                event,
            ));
        }
        let seed = profile.explicit_status.unwrap_or(ConsentStatus::NotSubscribed);
        let explicit = profile.explicit_status.is_some();
        let record = self.create_or_resolve(&CustomerDraft {
            shop: profile.shop.clone(),
            customer_id: profile.identity.customer_id,
            email: profile.identity.email.clone(),
            status: seed,
            last_consent_at: explicit.then_some(profile.occurred_at),
            last_source: explicit.then_some(kind),
            region: profile.region_code.clone(),
        })?;
        let event = self.append(
            &profile.shop,
            kind,
            Some(record.status),
            EventEffect::Seeded,
            json!({ "explicit": explicit }),
            None,
            Some(record.key),
            profile.occurred_at,
        )?;
        Ok(ReconcileReport::quiet(
            kind,
            EventEffect::Seeded,
            Some(record.status),
            Some(record.key),
            event,
        ))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Runs the synchronizers for an applied decision.
    fn fan_out(&self, plan: &SyncPlan<'_>, report: &mut ReconcileReport, kind: ConsentEventKind) {
        let identity = CustomerIdentity::new(plan.record.customer_id, plan.record.email.clone());
        if plan.push_upstream {
            let outcome = self.commerce.push(&CommercePush {
                shop: plan.shop.clone(),
                key: plan.record.key,
                identity: identity.clone(),
                status: plan.status,
                confirmation: plan.confirmation,
                occurred_at: plan.occurred_at,
            });
            let level = match outcome {
                PushOutcome::Failed(_) => SyncLogLevel::Error,
                PushOutcome::Skipped(_) => SyncLogLevel::Warn,
                PushOutcome::Pushed | PushOutcome::PushedAfterEmailFix => SyncLogLevel::Info,
            };
            let now = self.clock.now();
            let mut entry = SyncLogEvent::new(now, level, "commerce_push", outcome.label())
                .shop(plan.shop)
                .signal(kind)
                .customer_key(Some(plan.record.key))
                .identity(&identity);
            if let PushOutcome::Failed(reason) | PushOutcome::Skipped(reason) = &outcome {
                entry = entry.message(reason.clone());
            }
            self.emit(entry);
            report.commerce = Some(outcome);
        }
        let Some(email) = plan.record.email.clone() else {
            self.emit(
                SyncLogEvent::new(self.clock.now(), SyncLogLevel::Warn, "email_sync", "skipped")
                    .shop(plan.shop)
                    .signal(kind)
                    .customer_key(Some(plan.record.key))
                    .message("customer has no email"),
            );
            return;
        };
        let result = self.email.sync(&EmailSync {
            email,
            subscribe: plan.status.is_subscribed(),
            confirmation: plan.confirmation,
            evidence: plan.evidence,
            attributes: plan.attributes.clone(),
        });
        let level = if result.outcome.is_failure() {
            SyncLogLevel::Error
        } else if result.warnings.is_empty() {
            SyncLogLevel::Info
        } else {
            SyncLogLevel::Warn
        };
        let now = self.clock.now();
        let mut entry = SyncLogEvent::new(now, level, "email_sync", result.outcome.label())
            .shop(plan.shop)
            .signal(kind)
            .customer_key(Some(plan.record.key))
            .identity(&identity);
        if !result.warnings.is_empty() {
            entry = entry.message(result.warnings.join("; "));
        }
        self.emit(entry);
        report.email = Some(result);
    }

    /// Resolves the identity to a row, creating a not-subscribed row if absent.
    fn resolve_or_create(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
        region: Option<RegionCode>,
        kind: ConsentEventKind,
    ) -> Result<CustomerConsentRecord, EngineError> {
        let resolution = self.store.resolve_customer(shop, identity)?;
        self.log_identity_plan(shop, identity, resolution.plan, kind);
        if let Some(record) = resolution.record {
            return Ok(record);
        }
        self.create_or_resolve(&CustomerDraft {
            shop: shop.clone(),
            customer_id: identity.customer_id,
            email: identity.email.clone(),
            status: ConsentStatus::NotSubscribed,
            last_consent_at: None,
            last_source: None,
            region,
        })
    }

    /// Creates a row, falling back to a lookup if a concurrent signal won the insert.
    fn create_or_resolve(
        &self,
        draft: &CustomerDraft,
    ) -> Result<CustomerConsentRecord, EngineError> {
        match self.store.create_customer(draft) {
            Ok(record) => Ok(record),
            Err(StoreError::Invalid(reason)) => {
                let identity = CustomerIdentity::new(draft.customer_id, draft.email.clone());
                self.store
                    .resolve_customer(&draft.shop, &identity)?
                    .record
                    .ok_or_else(|| EngineError::Store(StoreError::Invalid(reason)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Logs identity merges.
    fn log_identity_plan(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
        plan: IdentityPlan,
        kind: ConsentEventKind,
    ) {
        if !plan.is_merge() {
            return;
        }
        let detail = serde_json::to_string(&plan).unwrap_or_default();
        self.emit(
            SyncLogEvent::new(self.clock.now(), SyncLogLevel::Info, "identity", "merged")
                .shop(shop)
                .signal(kind)
                .customer_key(plan.resolved_key())
                .identity(identity)
                .message(detail),
        );
    }

    /// Derives the customer segment from a prior-order count or the platform.
    ///
    /// `count_includes_current` is true when the platform count already
    /// contains the order being processed.
    fn derive_segment(
        &self,
        shop: &ShopDomain,
        customer: Option<CustomerId>,
        prior_orders: Option<u64>,
        count_includes_current: bool,
    ) -> Option<CustomerSegment> {
        if let Some(prior) = prior_orders {
            return Some(CustomerSegment::from_prior_orders(prior));
        }
        let customer = customer?;
        match self.platform.customer_order_count(shop, customer) {
            Ok(Some(total)) => {
                let prior = if count_includes_current { total.saturating_sub(1) } else { total };
                Some(CustomerSegment::from_prior_orders(prior))
            }
            Ok(None) => None,
            Err(err) => {
                self.emit(
                    SyncLogEvent::new(self.clock.now(), SyncLogLevel::Warn, "segment", "unknown")
                        .shop(shop)
                        .message(err.to_string()),
                );
                None
            }
        }
    }

    /// Appends a rejected event.
    fn reject(
        &self,
        shop: &ShopDomain,
        kind: ConsentEventKind,
        status: Option<ConsentStatus>,
        session: Option<&CheckoutSession>,
        occurred_at: Timestamp,
        reason: &str,
    ) -> Result<ReconcileReport, EngineError> {
        self.emit(
            SyncLogEvent::new(self.clock.now(), SyncLogLevel::Warn, "reconcile", "rejected")
                .shop(shop)
                .signal(kind)
                .message(reason),
        );
        let event = self.append(
            shop,
            kind,
            status,
            EventEffect::Rejected,
            json!({ "reason": reason }),
            session.map(|session| session.id.clone()),
            None,
            occurred_at,
        )?;
        Ok(ReconcileReport::quiet(kind, EventEffect::Rejected, status, None, event))
    }

    /// Appends an audit event stamped with the current time.
    #[allow(clippy::too_many_arguments, reason = "Mirrors the audit row columns.")]
    fn append(
        &self,
        shop: &ShopDomain,
        kind: ConsentEventKind,
        outcome: Option<ConsentStatus>,
        effect: EventEffect,
        note: Value,
        session_id: Option<SessionId>,
        customer_key: Option<CustomerKey>,
        occurred_at: Timestamp,
    ) -> Result<EventInsert, EngineError> {
        Ok(self.store.append_event(&NewConsentEvent {
            shop: shop.clone(),
            kind,
            outcome,
            effect,
            note,
            session_id,
            customer_key,
            occurred_at,
            recorded_at: self.clock.now(),
        })?)
    }

    /// Sends an entry to the operational log.
    fn emit(&self, event: SyncLogEvent) {
        self.log.record(&event);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the latest provisional toggle, by event time then insertion order.
fn latest_toggle(events: &[ConsentEvent]) -> Option<&ConsentEvent> {
    events
        .iter()
        .filter(|event| {
            event.kind == ConsentEventKind::CheckoutToggle
                && event.effect == EventEffect::Provisional
        })
        .max_by_key(|event| (event.occurred_at, event.id))
}

/// Builds the provenance note for a checkout completion.
fn checkout_note(
    order: &OrderSignal,
    session: &CheckoutSession,
    toggled: bool,
    backfilled: usize,
    outcome: WriteOutcome,
) -> Value {
    json!({
        "order_id": order.order_id,
        "presentation": session.presentation,
        "display_text": session.display_text,
        "region": session.region,
        "toggled": toggled,
        "backfilled_events": backfilled,
        "write": outcome,
    })
}
