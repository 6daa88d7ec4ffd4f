// crates/consent-sync-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Recording fakes and an engine harness for consent-sync-core.
// Purpose: Drive the reconciliation engine without network or disk access.
// Dependencies: consent-sync-core
// ============================================================================

//! ## Overview
//! Provides a recording commerce platform, a recording email provider, a
//! manual clock, counter session ids, and a memory log sink, wired into a
//! ready-to-use engine harness.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use consent_sync_core::CheckoutToken;
use consent_sync_core::CommercePlatform;
use consent_sync_core::ConsentMutation;
use consent_sync_core::ConsentSignal;
use consent_sync_core::ConsentStatus;
use consent_sync_core::ConsentStore;
use consent_sync_core::CustomerConsentRecord;
use consent_sync_core::CustomerId;
use consent_sync_core::CustomerIdentity;
use consent_sync_core::EmailAddress;
use consent_sync_core::EmailListConfig;
use consent_sync_core::EmailProvider;
use consent_sync_core::EmailProviderError;
use consent_sync_core::EngineConfig;
use consent_sync_core::EngineParts;
use consent_sync_core::InMemoryConsentStore;
use consent_sync_core::LookupDetail;
use consent_sync_core::ManualClock;
use consent_sync_core::NullRegionLocator;
use consent_sync_core::OrderId;
use consent_sync_core::OrderSignal;
use consent_sync_core::PlatformError;
use consent_sync_core::PolicyRequest;
use consent_sync_core::PolicyResolver;
use consent_sync_core::PolicyRule;
use consent_sync_core::ProfileAttributes;
use consent_sync_core::ProfileTraits;
use consent_sync_core::ProviderProfile;
use consent_sync_core::ProviderSubscription;
use consent_sync_core::ReconciliationEngine;
use consent_sync_core::RegionCode;
use consent_sync_core::SessionId;
use consent_sync_core::SessionIdGenerator;
use consent_sync_core::ShopDomain;
use consent_sync_core::SyncLogEvent;
use consent_sync_core::SyncLogSink;
use consent_sync_core::Timestamp;

pub const SHOP: &str = "demo.myshopify.com";
pub const SINGLE_LIST: &str = "LIST_SINGLE";
pub const DOUBLE_LIST: &str = "LIST_DOUBLE";
pub const START_MS: i64 = 1_700_000_000_000;

// ============================================================================
// SECTION: Commerce Platform Fake
// ============================================================================

/// Call observed by the recording platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    OrderCount(u64),
    Consent(u64, ConsentStatus),
    SetEmail(u64, String),
}

/// Commerce platform that records calls and replays scripted failures.
#[derive(Default)]
pub struct RecordingPlatform {
    pub calls: Mutex<Vec<PlatformCall>>,
    pub order_count: Mutex<Option<u64>>,
    pub consent_failures: Mutex<VecDeque<PlatformError>>,
    pub order_count_failures: Mutex<VecDeque<PlatformError>>,
}

impl RecordingPlatform {
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn consent_pushes(&self) -> Vec<(u64, ConsentStatus)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Consent(id, status) => Some((id, status)),
                _ => None,
            })
            .collect()
    }

    pub fn fail_next_consent(&self, error: PlatformError) {
        self.consent_failures.lock().unwrap().push_back(error);
    }

    pub fn set_order_count(&self, count: Option<u64>) {
        *self.order_count.lock().unwrap() = count;
    }

    pub fn fail_next_order_count(&self, error: PlatformError) {
        self.order_count_failures.lock().unwrap().push_back(error);
    }
}

impl CommercePlatform for RecordingPlatform {
    fn customer_order_count(
        &self,
        _shop: &ShopDomain,
        customer: CustomerId,
    ) -> Result<Option<u64>, PlatformError> {
        self.calls.lock().unwrap().push(PlatformCall::OrderCount(customer.get()));
        if let Some(error) = self.order_count_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(*self.order_count.lock().unwrap())
    }

    fn update_marketing_consent(
        &self,
        _shop: &ShopDomain,
        customer: CustomerId,
        mutation: &ConsentMutation,
    ) -> Result<(), PlatformError> {
        self.calls.lock().unwrap().push(PlatformCall::Consent(customer.get(), mutation.status));
        match self.consent_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn set_customer_email(
        &self,
        _shop: &ShopDomain,
        customer: CustomerId,
        email: &EmailAddress,
    ) -> Result<(), PlatformError> {
        self.calls
            .lock()
            .unwrap()
            .push(PlatformCall::SetEmail(customer.get(), email.as_str().to_string()));
        Ok(())
    }
}

// ============================================================================
// SECTION: Email Provider Fake
// ============================================================================

/// Call observed by the recording email provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailCall {
    Find(String, LookupDetail),
    Create(String),
    Update(String),
    Subscribe(String, String),
    Unsubscribe(String, String),
}

/// Email provider backed by a profile map.
#[derive(Default)]
pub struct RecordingEmail {
    pub calls: Mutex<Vec<EmailCall>>,
    pub profiles: Mutex<BTreeMap<String, ProviderProfile>>,
    pub subscriptions_unsupported: Mutex<bool>,
    pub update_failures: Mutex<VecDeque<EmailProviderError>>,
    /// Unsubscribe failures keyed by list id; each entry fails once.
    pub unsubscribe_failures: Mutex<BTreeMap<String, EmailProviderError>>,
}

impl RecordingEmail {
    pub fn calls(&self) -> Vec<EmailCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> Vec<EmailCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, EmailCall::Subscribe(..) | EmailCall::Unsubscribe(..)))
            .collect()
    }

    pub fn fail_next_update(&self, error: EmailProviderError) {
        self.update_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_unsubscribe(&self, list_id: &str, error: EmailProviderError) {
        self.unsubscribe_failures.lock().unwrap().insert(list_id.to_string(), error);
    }

    pub fn seed_profile(&self, email: &str, subscription: Option<ProviderSubscription>) {
        let id = format!("P-{email}");
        self.profiles.lock().unwrap().insert(
            email.to_string(),
            ProviderProfile {
                id,
                subscription,
            },
        );
    }
}

impl EmailProvider for RecordingEmail {
    fn find_profile(
        &self,
        email: &EmailAddress,
        detail: LookupDetail,
    ) -> Result<Option<ProviderProfile>, EmailProviderError> {
        self.calls.lock().unwrap().push(EmailCall::Find(email.as_str().to_string(), detail));
        let unsupported = *self.subscriptions_unsupported.lock().unwrap();
        if detail == LookupDetail::WithSubscriptions && unsupported {
            return Err(EmailProviderError::UnsupportedField(
                "additional-fields[profile]".to_string(),
            ));
        }
        let found = self.profiles.lock().unwrap().get(email.as_str()).cloned();
        Ok(found.map(|mut profile| {
            if detail == LookupDetail::Basic {
                profile.subscription = None;
            }
            profile
        }))
    }

    fn create_profile(
        &self,
        email: &EmailAddress,
        _attributes: &ProfileAttributes,
    ) -> Result<ProviderProfile, EmailProviderError> {
        self.calls.lock().unwrap().push(EmailCall::Create(email.as_str().to_string()));
        let profile = ProviderProfile {
            id: format!("P-{email}"),
            subscription: None,
        };
        self.profiles.lock().unwrap().insert(email.as_str().to_string(), profile.clone());
        Ok(profile)
    }

    fn update_profile(
        &self,
        profile_id: &str,
        _attributes: &ProfileAttributes,
    ) -> Result<(), EmailProviderError> {
        self.calls.lock().unwrap().push(EmailCall::Update(profile_id.to_string()));
        match self.update_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn subscribe(&self, list_id: &str, email: &EmailAddress) -> Result<(), EmailProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(EmailCall::Subscribe(list_id.to_string(), email.as_str().to_string()));
        Ok(())
    }

    fn unsubscribe(&self, list_id: &str, email: &EmailAddress) -> Result<(), EmailProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(EmailCall::Unsubscribe(list_id.to_string(), email.as_str().to_string()));
        match self.unsubscribe_failures.lock().unwrap().remove(list_id) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Host Fakes
// ============================================================================

/// Session ids `sess-1`, `sess-2`, ...
#[derive(Default)]
pub struct CounterSessionIds {
    next: AtomicU64,
}

impl SessionIdGenerator for CounterSessionIds {
    fn next_session_id(&self) -> SessionId {
        let value = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        SessionId::new(format!("sess-{value}"))
    }
}

/// Log sink that keeps entries in memory.
#[derive(Default)]
pub struct MemoryLogSink {
    pub entries: Mutex<Vec<SyncLogEvent>>,
}

impl MemoryLogSink {
    pub fn stages(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| (entry.stage.to_string(), entry.outcome.clone()))
            .collect()
    }
}

impl SyncLogSink for MemoryLogSink {
    fn record(&self, event: &SyncLogEvent) {
        self.entries.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

pub type TestEngine = ReconciliationEngine<InMemoryConsentStore, RecordingPlatform, RecordingEmail>;

/// Engine wired to recording fakes.
pub struct Harness {
    pub engine: TestEngine,
    pub store: InMemoryConsentStore,
    pub platform: Arc<RecordingPlatform>,
    pub email: Arc<RecordingEmail>,
    pub clock: ManualClock,
    pub log: Arc<MemoryLogSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(default_rules(), default_config())
    }

    pub fn with_config(rules: Vec<PolicyRule>, config: EngineConfig) -> Self {
        let store = InMemoryConsentStore::new();
        let platform = Arc::new(RecordingPlatform::default());
        platform.set_order_count(Some(1));
        let email = Arc::new(RecordingEmail::default());
        let clock = ManualClock::new(Timestamp::from_unix_millis(START_MS));
        let log = Arc::new(MemoryLogSink::default());
        let engine = ReconciliationEngine::new(
            EngineParts {
                store: store.clone(),
                platform: Arc::clone(&platform),
                email: Arc::clone(&email),
                policy: Arc::new(PolicyResolver::from_rules(rules)),
                locator: Arc::new(NullRegionLocator),
                clock: Arc::new(clock.clone()),
                session_ids: Arc::new(CounterSessionIds::default()),
                log: Arc::clone(&log) as Arc<dyn SyncLogSink>,
            },
            config,
        );
        Self {
            engine,
            store,
            platform,
            email,
            clock,
            log,
        }
    }

    pub fn record(&self, id: u64) -> CustomerConsentRecord {
        let identity = CustomerIdentity::new(Some(CustomerId::new(id)), None);
        self.store
            .resolve_customer(&shop(), &identity)
            .unwrap()
            .record
            .expect("customer row exists")
    }
}

pub fn default_config() -> EngineConfig {
    EngineConfig {
        email_lists: EmailListConfig {
            single_opt_in_list: Some(SINGLE_LIST.to_string()),
            double_opt_in_list: Some(DOUBLE_LIST.to_string()),
            ..EmailListConfig::default()
        },
        ..EngineConfig::default()
    }
}

/// DE requires opt-in; US is opt-out.
pub fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            region_code: RegionCode::parse("DE"),
            region_name: Some("Germany".to_string()),
            segment: None,
            presentation: consent_sync_core::PresentationMode::OptIn,
            confirmation: consent_sync_core::ConfirmationStrength::Confirmed,
        },
        PolicyRule {
            region_code: RegionCode::parse("US"),
            region_name: Some("United States".to_string()),
            segment: None,
            presentation: consent_sync_core::PresentationMode::OptOut,
            confirmation: consent_sync_core::ConfirmationStrength::Single,
        },
    ]
}

// ============================================================================
// SECTION: Builders
// ============================================================================

pub fn shop() -> ShopDomain {
    ShopDomain::new(SHOP)
}

pub fn at(offset_ms: i64) -> Timestamp {
    Timestamp::from_unix_millis(START_MS + offset_ms)
}

pub fn identity(id: u64, email: &str) -> CustomerIdentity {
    CustomerIdentity::new(Some(CustomerId::new(id)), EmailAddress::parse(email))
}

pub fn policy_request(token: &str, region: &str) -> PolicyRequest {
    PolicyRequest {
        shop: shop(),
        checkout_token: CheckoutToken::new(token),
        region_code: RegionCode::parse(region),
        country_name: None,
        client_ip: None,
        customer_id: None,
        order_count: Some(0),
        display_text: Some("Email me with news and offers".to_string()),
    }
}

pub fn order(
    order_id: &str,
    token: Option<&str>,
    who: CustomerIdentity,
    offset: i64,
) -> OrderSignal {
    OrderSignal {
        shop: shop(),
        order_id: OrderId::new(order_id),
        checkout_token: token.map(CheckoutToken::new),
        identity: who,
        orders_including_current: Some(1),
        region_code: None,
        country_name: None,
        traits: ProfileTraits::default(),
        occurred_at: at(offset),
    }
}

pub fn consent(who: CustomerIdentity, status: ConsentStatus, offset: i64) -> ConsentSignal {
    ConsentSignal {
        shop: shop(),
        identity: who,
        status,
        confirmation: None,
        region_code: None,
        traits: ProfileTraits::default(),
        occurred_at: at(offset),
    }
}
