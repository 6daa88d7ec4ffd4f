// crates/consent-sync-server/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: axum routes for the storefront widget and platform webhooks.
// Purpose: Feed inbound signals to the reconciliation engine.
// Dependencies: axum, consent-sync-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Storefront routes answer with engine results. Webhook routes answer with a
//! fixed acknowledgment once a delivery is authenticated and decoded: the
//! platform retries only on transport failures, so reconciliation failures
//! are logged and never surfaced. Engine calls are blocking and run under
//! [`tokio::task::block_in_place`] on multi-threaded runtimes.
//!
//! Request handling lives in synchronous functions returning a [`Reply`];
//! the async handlers only extract inputs and record access events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use consent_sync_config::ConsentSyncConfig;
use consent_sync_core::CommercePlatform;
use consent_sync_core::EmailProvider;
use consent_sync_core::ReconciliationEngine;
use consent_sync_core::SharedConsentStore;
use consent_sync_core::ShopDomain;
use consent_sync_core::SyncLogEvent;
use consent_sync_core::SyncLogLevel;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::bootstrap::LogSinks;
use crate::log::HttpAuditEvent;
use crate::storefront::PolicyPayload;
use crate::storefront::TogglePayload;
use crate::storefront::client_ip;
use crate::webhook::HMAC_HEADER;
use crate::webhook::SHOP_HEADER;
use crate::webhook::WebhookError;
use crate::webhook::WebhookTopic;
use crate::webhook::decode_signal;
use crate::webhook::verify_signature;

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Storefront policy and session route.
pub const POLICY_ROUTE: &str = "/storefront/consent-policy";
/// Storefront toggle route.
pub const TOGGLE_ROUTE: &str = "/storefront/consent-events";
/// Order created webhook route.
pub const ORDERS_CREATE_ROUTE: &str = "/webhooks/orders/create";
/// Customer updated webhook route.
pub const CUSTOMERS_UPDATE_ROUTE: &str = "/webhooks/customers/update";
/// Marketing consent updated webhook route.
pub const CONSENT_UPDATE_ROUTE: &str = "/webhooks/customers/marketing_consent_update";
/// Liveness route.
pub const HEALTH_ROUTE: &str = "/healthz";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server startup and transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration is invalid.
    #[error("server config error: {0}")]
    Config(String),
    /// A collaborator could not be built.
    #[error("server init error: {0}")]
    Init(String),
    /// Listener or connection failure.
    #[error("server transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Request-handling settings derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Whether webhook signatures are checked.
    pub verify_webhooks: bool,
    /// Known shops and their webhook secrets.
    pub shops: BTreeMap<ShopDomain, Option<String>>,
}

impl ServerSettings {
    /// Extracts server settings from configuration.
    #[must_use]
    pub fn from_config(config: &ConsentSyncConfig) -> Self {
        Self {
            max_body_bytes: config.server.max_body_bytes,
            verify_webhooks: config.server.verify_webhooks,
            shops: config
                .platform
                .shops
                .iter()
                .map(|shop| (shop.domain(), shop.webhook_secret.clone()))
                .collect(),
        }
    }
}

/// Shared state for all handlers.
pub struct AppState<P, E> {
    /// Reconciliation engine.
    engine: ReconciliationEngine<SharedConsentStore, P, E>,
    /// Request-handling settings.
    settings: ServerSettings,
    /// Log sinks.
    sinks: LogSinks,
}

impl<P, E> AppState<P, E>
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    /// Creates handler state.
    #[must_use]
    pub const fn new(
        engine: ReconciliationEngine<SharedConsentStore, P, E>,
        settings: ServerSettings,
        sinks: LogSinks,
    ) -> Self {
        Self {
            engine,
            settings,
            sinks,
        }
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &ReconciliationEngine<SharedConsentStore, P, E> {
        &self.engine
    }

    /// Records a failed engine call.
    fn log_engine_failure(&self, stage: &'static str, shop: Option<&ShopDomain>, message: String) {
        let mut event =
            SyncLogEvent::new(self.engine.now(), SyncLogLevel::Error, stage, "store_error")
                .message(message);
        if let Some(shop) = shop {
            event = event.shop(shop);
        }
        self.sinks.sync.record(&event);
    }
}

// ============================================================================
// SECTION: Replies
// ============================================================================

/// Handler outcome before it is written to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Response status.
    pub status: StatusCode,
    /// JSON response body.
    pub body: Value,
    /// Shop the request named, when known.
    pub shop: Option<String>,
    /// Short failure label.
    pub error_kind: Option<&'static str>,
}

impl Reply {
    /// Builds a success reply.
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            shop: None,
            error_kind: None,
        }
    }

    /// Builds a success reply from a serializable value.
    fn ok_json(value: &impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self::ok(body),
            Err(err) => {
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, "serialization", &err.to_string())
            }
        }
    }

    /// Builds a failure reply.
    fn error(status: StatusCode, kind: &'static str, message: &str) -> Self {
        Self {
            status,
            body: json!({ "ok": false, "error": message }),
            shop: None,
            error_kind: Some(kind),
        }
    }

    /// Attaches the shop.
    fn for_shop(mut self, shop: &ShopDomain) -> Self {
        self.shop = Some(shop.to_string());
        self
    }
}

impl From<WebhookError> for Reply {
    fn from(err: WebhookError) -> Self {
        let status = match &err {
            WebhookError::MissingHeader(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::UnknownShop(_) => StatusCode::NOT_FOUND,
            WebhookError::BadSignature => StatusCode::UNAUTHORIZED,
        };
        Self::error(status, err.kind(), &err.to_string())
    }
}

/// Rejects bodies above the configured limit.
fn check_body_size(settings: &ServerSettings, body: &[u8]) -> Result<(), Reply> {
    if body.len() > settings.max_body_bytes {
        return Err(Reply::error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "body_too_large",
            "request body too large",
        ));
    }
    Ok(())
}

/// Reply for a failed store call.
fn store_unavailable() -> Reply {
    Reply::error(StatusCode::SERVICE_UNAVAILABLE, "store_error", "consent store unavailable")
}

// ============================================================================
// SECTION: Storefront
// ============================================================================

/// Resolves the checkout policy and opens a session.
pub fn policy_reply<P, E>(
    state: &AppState<P, E>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    body: &[u8],
) -> Reply
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    if let Err(reply) = check_body_size(&state.settings, body) {
        return reply;
    }
    let payload: PolicyPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            return Reply::error(StatusCode::BAD_REQUEST, "invalid_payload", &err.to_string());
        }
    };
    let request = match payload.into_request(client_ip(headers, peer)) {
        Ok(request) => request,
        Err(message) => return Reply::error(StatusCode::BAD_REQUEST, "invalid_payload", &message),
    };
    if !state.settings.shops.contains_key(&request.shop) {
        return Reply::error(StatusCode::NOT_FOUND, "unknown_shop", "unknown shop")
            .for_shop(&request.shop);
    }
    match state.engine.open_session(&request) {
        Ok(grant) => Reply::ok_json(&grant).for_shop(&request.shop),
        Err(err) => {
            state.log_engine_failure("policy", Some(&request.shop), err.to_string());
            store_unavailable().for_shop(&request.shop)
        }
    }
}

/// Records a checkbox toggle.
pub fn toggle_reply<P, E>(state: &AppState<P, E>, body: &[u8]) -> Reply
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    if let Err(reply) = check_body_size(&state.settings, body) {
        return reply;
    }
    let payload: TogglePayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            return Reply::error(StatusCode::BAD_REQUEST, "invalid_payload", &err.to_string());
        }
    };
    let toggle = match payload.into_signal(state.engine.now()) {
        Ok(toggle) => toggle,
        Err(message) => return Reply::error(StatusCode::BAD_REQUEST, "invalid_payload", &message),
    };
    match state.engine.record_toggle(&toggle) {
        Ok(report) => Reply::ok_json(&report),
        Err(err) => {
            state.log_engine_failure("reconcile", None, err.to_string());
            store_unavailable()
        }
    }
}

// ============================================================================
// SECTION: Webhooks
// ============================================================================

/// Authenticates, decodes, and reconciles a webhook delivery.
pub fn webhook_reply<P, E>(
    state: &AppState<P, E>,
    topic: WebhookTopic,
    headers: &HeaderMap,
    body: &[u8],
) -> Reply
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    if let Err(reply) = check_body_size(&state.settings, body) {
        return reply;
    }
    let shop = match authenticate(&state.settings, headers, body) {
        Ok(shop) => shop,
        Err(err) => return Reply::from(err),
    };
    let signal = match decode_signal(topic, &shop, body, state.engine.now()) {
        Ok(signal) => signal,
        Err(err) => return Reply::from(err).for_shop(&shop),
    };
    if let Err(err) = state.engine.reconcile(&signal) {
        state.log_engine_failure("reconcile", Some(&shop), err.to_string());
    }
    Reply::ok(json!({ "ok": true })).for_shop(&shop)
}

/// Resolves the sending shop and checks the delivery signature.
fn authenticate(
    settings: &ServerSettings,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ShopDomain, WebhookError> {
    let shop = header_text(headers, SHOP_HEADER)
        .map(ShopDomain::new)
        .filter(|shop| !shop.is_empty())
        .ok_or(WebhookError::MissingHeader(SHOP_HEADER))?;
    let Some(secret) = settings.shops.get(&shop) else {
        return Err(WebhookError::UnknownShop(shop.to_string()));
    };
    if !settings.verify_webhooks {
        return Ok(shop);
    }
    let signature = header_text(headers, HMAC_HEADER).ok_or(WebhookError::BadSignature)?;
    match secret {
        Some(secret) if verify_signature(secret, body, signature) => Ok(shop),
        _ => Err(WebhookError::BadSignature),
    }
}

/// Returns a header value as text.
fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Builds the router for all endpoints.
pub fn router<P, E>(state: Arc<AppState<P, E>>) -> Router
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let limit = state.settings.max_body_bytes;
    Router::new()
        .route(POLICY_ROUTE, post(handle_policy::<P, E>))
        .route(TOGGLE_ROUTE, post(handle_toggle::<P, E>))
        .route(ORDERS_CREATE_ROUTE, post(handle_orders_create::<P, E>))
        .route(CUSTOMERS_UPDATE_ROUTE, post(handle_customers_update::<P, E>))
        .route(CONSENT_UPDATE_ROUTE, post(handle_consent_update::<P, E>))
        .route(HEALTH_ROUTE, get(handle_health))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Serves HTTP on an already bound listener.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] when the server fails.
pub async fn serve_listener<P, E>(
    state: Arc<AppState<P, E>>,
    listener: TcpListener,
) -> Result<(), ServerError>
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
}

/// Binds `addr` and serves HTTP.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] when binding or serving fails.
pub async fn serve<P, E>(state: Arc<AppState<P, E>>, addr: SocketAddr) -> Result<(), ServerError>
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::Transport(format!("http bind {addr} failed: {err}")))?;
    serve_listener(state, listener).await
}

/// Runs handler work, shifting to a blocking context when available.
fn with_blocking<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

/// Records the access event and converts a reply into a response.
fn respond<P, E>(
    state: &AppState<P, E>,
    route: &'static str,
    peer: SocketAddr,
    request_bytes: usize,
    reply: Reply,
) -> (StatusCode, axum::Json<Value>)
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let mut event =
        HttpAuditEvent::new(state.engine.now().as_unix_millis(), route, request_bytes);
    event.status = reply.status.as_u16();
    event.peer_ip = Some(peer.ip().to_string());
    event.shop = reply.shop;
    event.error_kind = reply.error_kind;
    state.sinks.http.record_http(&event);
    (reply.status, axum::Json(reply.body))
}

/// Handles `POST /storefront/consent-policy`.
async fn handle_policy<P, E>(
    State(state): State<Arc<AppState<P, E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> impl IntoResponse
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let reply = with_blocking(|| policy_reply(&state, &headers, Some(peer), &bytes));
    respond(&state, "storefront_policy", peer, bytes.len(), reply)
}

/// Handles `POST /storefront/consent-events`.
async fn handle_toggle<P, E>(
    State(state): State<Arc<AppState<P, E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    bytes: Bytes,
) -> impl IntoResponse
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let reply = with_blocking(|| toggle_reply(&state, &bytes));
    respond(&state, "storefront_event", peer, bytes.len(), reply)
}

/// Shared body of the webhook handlers.
fn handle_webhook<P, E>(
    state: &AppState<P, E>,
    topic: WebhookTopic,
    peer: SocketAddr,
    headers: &HeaderMap,
    bytes: &Bytes,
) -> (StatusCode, axum::Json<Value>)
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    let reply = with_blocking(|| webhook_reply(state, topic, headers, bytes));
    respond(state, topic.label(), peer, bytes.len(), reply)
}

/// Handles `POST /webhooks/orders/create`.
async fn handle_orders_create<P, E>(
    State(state): State<Arc<AppState<P, E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> impl IntoResponse
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    handle_webhook(&state, WebhookTopic::OrdersCreate, peer, &headers, &bytes)
}

/// Handles `POST /webhooks/customers/update`.
async fn handle_customers_update<P, E>(
    State(state): State<Arc<AppState<P, E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> impl IntoResponse
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    handle_webhook(&state, WebhookTopic::CustomersUpdate, peer, &headers, &bytes)
}

/// Handles `POST /webhooks/customers/marketing_consent_update`.
async fn handle_consent_update<P, E>(
    State(state): State<Arc<AppState<P, E>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> impl IntoResponse
where
    P: CommercePlatform + Send + Sync + 'static,
    E: EmailProvider + Send + Sync + 'static,
{
    handle_webhook(&state, WebhookTopic::MarketingConsentUpdate, peer, &headers, &bytes)
}

/// Handles `GET /healthz`.
async fn handle_health() -> impl IntoResponse {
    axum::Json(json!({ "ok": true }))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
