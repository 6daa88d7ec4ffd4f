// crates/consent-sync-core/src/runtime/store.rs
// ============================================================================
// Module: Consent Sync In-Memory Store
// Description: In-memory consent store and a shared store wrapper.
// Purpose: Provide a dependency-free store for tests and the memory backend.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryConsentStore`] keeps every table behind a single mutex, so each
//! trait method is atomic. It follows the same identity and write rules as the
//! durable store by delegating to [`plan_identity`] and
//! [`CustomerConsentRecord::apply`]. State is lost on restart.
//!
//! [`SharedConsentStore`] erases the concrete backend so hosts can choose one
//! from configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::CheckoutSession;
use crate::core::CheckoutToken;
use crate::core::ConsentEvent;
use crate::core::ConsentStatus;
use crate::core::CustomerConsentRecord;
use crate::core::CustomerDraft;
use crate::core::CustomerIdentity;
use crate::core::CustomerKey;
use crate::core::EventId;
use crate::core::EventInsert;
use crate::core::FenceMarker;
use crate::core::IdentityPlan;
use crate::core::NewConsentEvent;
use crate::core::OrderId;
use crate::core::OrderLink;
use crate::core::PruneReport;
use crate::core::SessionId;
use crate::core::SessionOpen;
use crate::core::ShopDomain;
use crate::core::StatusWrite;
use crate::core::Timestamp;
use crate::core::WriteOutcome;
use crate::core::plan_identity;
use crate::interfaces::ConsentStore;
use crate::interfaces::CustomerResolution;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Tables held by the in-memory store.
#[derive(Debug, Default)]
struct MemoryTables {
    /// Last assigned customer key.
    last_customer_key: i64,
    /// Last assigned event id.
    last_event_id: i64,
    /// Customer rows by key.
    customers: BTreeMap<CustomerKey, CustomerConsentRecord>,
    /// Folded rows by key, with the key that absorbed them.
    merged: BTreeMap<CustomerKey, (CustomerKey, CustomerConsentRecord)>,
    /// Audit events in insertion order.
    events: Vec<ConsentEvent>,
    /// Checkout sessions by id.
    sessions: BTreeMap<SessionId, CheckoutSession>,
}

impl MemoryTables {
    /// Returns a mutable customer row or an invalid-data error.
    fn customer_mut(&mut self, key: CustomerKey) -> Result<&mut CustomerConsentRecord, StoreError> {
        self.customers
            .get_mut(&key)
            .ok_or_else(|| StoreError::Invalid(format!("unknown customer key {key}")))
    }

    /// Finds the row holding a customer id in a shop.
    fn find_by_id(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
    ) -> Option<CustomerConsentRecord> {
        let id = identity.customer_id?;
        self.customers
            .values()
            .find(|row| row.shop == *shop && row.customer_id == Some(id))
            .cloned()
    }

    /// Finds the row holding an email in a shop.
    fn find_by_email(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
    ) -> Option<CustomerConsentRecord> {
        let email = identity.email.as_ref()?;
        self.customers
            .values()
            .find(|row| row.shop == *shop && row.email.as_ref() == Some(email))
            .cloned()
    }
}

/// In-memory consent store for tests and single-process deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConsentStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<MemoryTables>>,
}

impl InMemoryConsentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key a folded customer row was merged into.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn merged_into(&self, key: CustomerKey) -> Result<Option<CustomerKey>, StoreError> {
        Ok(self.lock()?.merged.get(&key).map(|(survivor, _)| *survivor))
    }

    /// Locks the tables.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Store("consent store mutex poisoned".to_string()))
    }
}

impl ConsentStore for InMemoryConsentStore {
    fn resolve_customer(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
    ) -> Result<CustomerResolution, StoreError> {
        let mut tables = self.lock()?;
        let by_id = tables.find_by_id(shop, identity);
        let by_email = tables.find_by_email(shop, identity);
        let plan = plan_identity(identity, by_id.as_ref(), by_email.as_ref());
        match plan {
            IdentityPlan::Missing
            | IdentityPlan::Existing {
                ..
            } => {}
            IdentityPlan::AttachEmail {
                key,
            } => {
                tables.customer_mut(key)?.email.clone_from(&identity.email);
            }
            IdentityPlan::AttachCustomerId {
                key,
            } => {
                tables.customer_mut(key)?.customer_id = identity.customer_id;
            }
            IdentityPlan::Fold {
                survivor,
                absorbed,
            } => {
                let absorbed_row = tables.customers.remove(&absorbed).ok_or_else(|| {
                    StoreError::Invalid(format!("unknown customer key {absorbed}"))
                })?;
                for event in &mut tables.events {
                    if event.customer_key == Some(absorbed) {
                        event.customer_key = Some(survivor);
                    }
                }
                tables.customer_mut(survivor)?.absorb(&absorbed_row);
                tables.merged.insert(absorbed, (survivor, absorbed_row));
            }
            IdentityPlan::ReleaseEmail {
                holder,
                target,
            } => {
                tables.customer_mut(holder)?.email = None;
                if let Some(target) = target {
                    tables.customer_mut(target)?.email.clone_from(&identity.email);
                }
            }
        }
        let record = plan.resolved_key().and_then(|key| tables.customers.get(&key).cloned());
        Ok(CustomerResolution {
            record,
            plan,
        })
    }

    fn create_customer(&self, draft: &CustomerDraft) -> Result<CustomerConsentRecord, StoreError> {
        let mut tables = self.lock()?;
        let identity = CustomerIdentity::new(draft.customer_id, draft.email.clone());
        if tables.find_by_id(&draft.shop, &identity).is_some()
            || tables.find_by_email(&draft.shop, &identity).is_some()
        {
            return Err(StoreError::Invalid("customer identity already stored".to_string()));
        }
        tables.last_customer_key += 1;
        let key = CustomerKey::new(tables.last_customer_key);
        let record = CustomerConsentRecord {
            key,
            shop: draft.shop.clone(),
            customer_id: draft.customer_id,
            email: draft.email.clone(),
            status: draft.status,
            last_consent_at: draft.last_consent_at,
            last_source: draft.last_source,
            region: draft.region.clone(),
            fence: None,
        };
        tables.customers.insert(key, record.clone());
        Ok(record)
    }

    fn load_customer(&self, key: CustomerKey) -> Result<Option<CustomerConsentRecord>, StoreError> {
        Ok(self.lock()?.customers.get(&key).cloned())
    }

    fn write_status(&self, write: &StatusWrite) -> Result<WriteOutcome, StoreError> {
        let mut tables = self.lock()?;
        Ok(tables.customer_mut(write.key)?.apply(write))
    }

    fn set_fence(&self, key: CustomerKey, fence: Option<FenceMarker>) -> Result<(), StoreError> {
        self.lock()?.customer_mut(key)?.fence = fence;
        Ok(())
    }

    fn append_event(&self, event: &NewConsentEvent) -> Result<EventInsert, StoreError> {
        let mut tables = self.lock()?;
        if event.is_session_toggle()
            && let Some(existing) = tables.events.iter().find(|stored| {
                stored.kind == event.kind
                    && stored.session_id == event.session_id
                    && stored.occurred_at == event.occurred_at
            })
        {
            return Ok(EventInsert::Duplicate(existing.id));
        }
        tables.last_event_id += 1;
        let id = EventId::new(tables.last_event_id);
        tables.events.push(event.clone().into_event(id));
        Ok(EventInsert::Inserted(id))
    }

    fn events_for_customer(&self, key: CustomerKey) -> Result<Vec<ConsentEvent>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.events.iter().filter(|event| event.customer_key == Some(key)).cloned().collect())
    }

    fn events_for_session(&self, session_id: &SessionId) -> Result<Vec<ConsentEvent>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .events
            .iter()
            .filter(|event| event.session_id.as_ref() == Some(session_id))
            .cloned()
            .collect())
    }

    fn link_session_events(
        &self,
        session_id: &SessionId,
        key: CustomerKey,
    ) -> Result<usize, StoreError> {
        let mut tables = self.lock()?;
        let mut linked = 0;
        for event in &mut tables.events {
            if event.session_id.as_ref() == Some(session_id) && event.customer_key.is_none() {
                event.customer_key = Some(key);
                linked += 1;
            }
        }
        Ok(linked)
    }

    fn open_session(&self, open: &SessionOpen) -> Result<CheckoutSession, StoreError> {
        let mut tables = self.lock()?;
        let existing = tables.sessions.values_mut().find(|session| {
            session.shop == open.shop && session.checkout_token == open.checkout_token
        });
        if let Some(session) = existing {
            if !session.is_completed() {
                session.presentation = open.presentation;
                session.region.clone_from(&open.region);
                if open.display_text.is_some() {
                    session.display_text.clone_from(&open.display_text);
                }
                session.updated_at = open.now;
            }
            return Ok(session.clone());
        }
        let session = CheckoutSession {
            id: open.candidate_id.clone(),
            shop: open.shop.clone(),
            checkout_token: open.checkout_token.clone(),
            presentation: open.presentation,
            region: open.region.clone(),
            display_text: open.display_text.clone(),
            order_id: None,
            intended: None,
            resolved_subscribe: None,
            created_at: open.now,
            updated_at: open.now,
        };
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Invalid(format!("session id collision: {}", session.id)));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn load_session(&self, session_id: &SessionId) -> Result<Option<CheckoutSession>, StoreError> {
        Ok(self.lock()?.sessions.get(session_id).cloned())
    }

    fn find_session_by_token(
        &self,
        shop: &ShopDomain,
        token: &CheckoutToken,
    ) -> Result<Option<CheckoutSession>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .sessions
            .values()
            .find(|session| session.shop == *shop && session.checkout_token == *token)
            .cloned())
    }

    fn record_intent(
        &self,
        session_id: &SessionId,
        status: ConsentStatus,
        display_text: Option<&str>,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let session = tables
            .sessions
            .get_mut(session_id)
            .filter(|session| !session.is_completed())
            .ok_or_else(|| StoreError::Invalid(format!("no open session {session_id}")))?;
        session.intended = Some(status);
        if let Some(text) = display_text {
            session.display_text = Some(text.to_string());
        }
        session.updated_at = at;
        Ok(())
    }

    fn complete_session(
        &self,
        session_id: &SessionId,
        order_id: &OrderId,
        subscribe: bool,
        at: Timestamp,
    ) -> Result<OrderLink, StoreError> {
        let mut tables = self.lock()?;
        let Some(shop) = tables.sessions.get(session_id).map(|session| session.shop.clone()) else {
            return Err(StoreError::Invalid(format!("unknown session {session_id}")));
        };
        let claimed_elsewhere = tables.sessions.values().any(|session| {
            session.id != *session_id
                && session.shop == shop
                && session.order_id.as_ref() == Some(order_id)
        });
        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::Invalid(format!("unknown session {session_id}")))?;
        match session.order_id.clone() {
            Some(linked) if linked == *order_id => Ok(OrderLink::AlreadyLinked(session.clone())),
            Some(linked) => Ok(OrderLink::Conflict(format!(
                "session {session_id} already linked to order {linked}"
            ))),
            None if claimed_elsewhere => {
                Ok(OrderLink::Conflict(format!("order {order_id} linked to another session")))
            }
            None => {
                session.order_id = Some(order_id.clone());
                session.resolved_subscribe = Some(subscribe);
                session.updated_at = at;
                Ok(OrderLink::Linked(session.clone()))
            }
        }
    }

    fn prune_stale_sessions(&self, cutoff: Timestamp) -> Result<PruneReport, StoreError> {
        let mut tables = self.lock()?;
        let stale: Vec<SessionId> = tables
            .sessions
            .values()
            .filter(|session| !session.is_completed() && session.updated_at < cutoff)
            .map(|session| session.id.clone())
            .collect();
        let before = tables.events.len();
        tables.events.retain(|event| {
            let orphan = event.customer_key.is_none()
                && event.session_id.as_ref().is_some_and(|id| stale.contains(id));
            !orphan
        });
        let removed_events = before - tables.events.len();
        for event in &mut tables.events {
            if event.session_id.as_ref().is_some_and(|id| stale.contains(id)) {
                event.session_id = None;
            }
        }
        for id in &stale {
            tables.sessions.remove(id);
        }
        Ok(PruneReport {
            sessions: stale.len(),
            events: removed_events,
        })
    }
}

// ============================================================================
// SECTION: Shared Store
// ============================================================================

/// Shared consent store wrapper for trait objects.
#[derive(Clone)]
pub struct SharedConsentStore {
    /// Inner store implementation.
    inner: Arc<dyn ConsentStore + Send + Sync>,
}

impl SharedConsentStore {
    /// Wraps a consent store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl ConsentStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(inner: Arc<dyn ConsentStore + Send + Sync>) -> Self {
        Self {
            inner,
        }
    }
}

impl ConsentStore for SharedConsentStore {
    fn resolve_customer(
        &self,
        shop: &ShopDomain,
        identity: &CustomerIdentity,
    ) -> Result<CustomerResolution, StoreError> {
        self.inner.resolve_customer(shop, identity)
    }

    fn create_customer(&self, draft: &CustomerDraft) -> Result<CustomerConsentRecord, StoreError> {
        self.inner.create_customer(draft)
    }

    fn load_customer(&self, key: CustomerKey) -> Result<Option<CustomerConsentRecord>, StoreError> {
        self.inner.load_customer(key)
    }

    fn write_status(&self, write: &StatusWrite) -> Result<WriteOutcome, StoreError> {
        self.inner.write_status(write)
    }

    fn set_fence(&self, key: CustomerKey, fence: Option<FenceMarker>) -> Result<(), StoreError> {
        self.inner.set_fence(key, fence)
    }

    fn append_event(&self, event: &NewConsentEvent) -> Result<EventInsert, StoreError> {
        self.inner.append_event(event)
    }

    fn events_for_customer(&self, key: CustomerKey) -> Result<Vec<ConsentEvent>, StoreError> {
        self.inner.events_for_customer(key)
    }

    fn events_for_session(&self, session_id: &SessionId) -> Result<Vec<ConsentEvent>, StoreError> {
        self.inner.events_for_session(session_id)
    }

    fn link_session_events(
        &self,
        session_id: &SessionId,
        key: CustomerKey,
    ) -> Result<usize, StoreError> {
        self.inner.link_session_events(session_id, key)
    }

    fn open_session(&self, open: &SessionOpen) -> Result<CheckoutSession, StoreError> {
        self.inner.open_session(open)
    }

    fn load_session(&self, session_id: &SessionId) -> Result<Option<CheckoutSession>, StoreError> {
        self.inner.load_session(session_id)
    }

    fn find_session_by_token(
        &self,
        shop: &ShopDomain,
        token: &CheckoutToken,
    ) -> Result<Option<CheckoutSession>, StoreError> {
        self.inner.find_session_by_token(shop, token)
    }

    fn record_intent(
        &self,
        session_id: &SessionId,
        status: ConsentStatus,
        display_text: Option<&str>,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.inner.record_intent(session_id, status, display_text, at)
    }

    fn complete_session(
        &self,
        session_id: &SessionId,
        order_id: &OrderId,
        subscribe: bool,
        at: Timestamp,
    ) -> Result<OrderLink, StoreError> {
        self.inner.complete_session(session_id, order_id, subscribe, at)
    }

    fn prune_stale_sessions(&self, cutoff: Timestamp) -> Result<PruneReport, StoreError> {
        self.inner.prune_stale_sessions(cutoff)
    }
}
