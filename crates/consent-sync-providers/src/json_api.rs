// crates/consent-sync-providers/src/json_api.rs
// ============================================================================
// Module: JSON:API Email Provider
// Description: Email provider client speaking JSON:API over HTTPS.
// Purpose: Look up profiles and mirror list membership.
// Dependencies: consent-sync-core, reqwest, serde_json, url
// ============================================================================

//! ## Overview
//! [`JsonApiEmailProvider`] implements [`EmailProvider`]. Profile lookups
//! filter by email and optionally request subscription fields; accounts
//! that do not support those fields answer 400 naming `additional-fields`,
//! which surfaces as [`EmailProviderError::UnsupportedField`] so the tiered
//! lookup can latch to basic lookups. Creating a profile that already exists
//! (409 with a duplicate id) resolves to the existing profile.
//!
//! List membership changes go through the provider's bulk subscription jobs
//! and are accepted asynchronously; a lookup right after a subscribe may not
//! reflect it yet.

// ============================================================================
// SECTION: Imports
// ============================================================================

use consent_sync_core::EmailAddress;
use consent_sync_core::EmailProvider;
use consent_sync_core::EmailProviderError;
use consent_sync_core::LookupDetail;
use consent_sync_core::ProfileAttributes;
use consent_sync_core::ProviderConsent;
use consent_sync_core::ProviderProfile;
use consent_sync_core::ProviderSubscription;
use reqwest::Method;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use url::Url;

use crate::http::DEFAULT_MAX_RESPONSE_BYTES;
use crate::http::DEFAULT_USER_AGENT;
use crate::http::HttpReply;
use crate::http::build_http_client;
use crate::http::execute;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON:API media type.
const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";
/// Authorization scheme prefix for private API keys.
const API_KEY_SCHEME: &str = "Klaviyo-API-Key";
/// Query parameter requesting subscription fields.
const ADDITIONAL_FIELDS_PARAM: &str = "additional-fields[profile]";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Email provider client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JsonApiConfig {
    /// API origin, for example `https://a.klaviyo.com`.
    pub base_url: String,
    /// Private API key.
    pub api_key: String,
    /// API revision date sent with every request.
    pub revision: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
}

impl Default for JsonApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://a.klaviyo.com".to_string(),
            api_key: String::new(),
            revision: "2024-10-15".to_string(),
            timeout_ms: 10_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Email provider client.
pub struct JsonApiEmailProvider {
    /// Client configuration.
    config: JsonApiConfig,
    /// Parsed API origin.
    base: Url,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl JsonApiEmailProvider {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`EmailProviderError::Rejected`] when the base URL is invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: JsonApiConfig) -> Result<Self, EmailProviderError> {
        let base = Url::parse(&config.base_url).map_err(|err| EmailProviderError::Rejected {
            status: 0,
            message: format!("invalid base url: {err}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(EmailProviderError::Rejected {
                status: 0,
                message: "base url cannot carry a path".to_string(),
            });
        }
        let client = build_http_client(config.timeout_ms, &config.user_agent).map_err(|err| {
            EmailProviderError::Rejected {
                status: 0,
                message: err,
            }
        })?;
        Ok(Self {
            config,
            base,
            client,
        })
    }

    /// Builds an endpoint URL from path segments; a trailing slash is kept.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    /// Sends a request with the provider headers.
    fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<HttpReply, EmailProviderError> {
        let mut request = self
            .client
            .request(method, url.as_str())
            .header("Authorization", format!("{API_KEY_SCHEME} {}", self.config.api_key))
            .header("revision", self.config.revision.as_str())
            .header("Accept", JSON_API_MEDIA_TYPE);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body)
                .map_err(|err| EmailProviderError::InvalidResponse(format!("encoding: {err}")))?;
            request = request.header("Content-Type", JSON_API_MEDIA_TYPE).body(bytes);
        }
        let reply = execute(request, self.config.max_response_bytes)
            .map_err(EmailProviderError::Transport)?;
        if reply.is_transient() {
            return Err(EmailProviderError::Transport(format!("status {}", reply.status)));
        }
        Ok(reply)
    }

    /// Runs a bulk subscription job for one email.
    fn subscription_job(
        &self,
        job: &str,
        list_id: &str,
        email: &EmailAddress,
        consent: Option<&str>,
    ) -> Result<(), EmailProviderError> {
        let mut attributes = Map::new();
        attributes.insert("email".to_string(), json!(email.as_str()));
        if let Some(consent) = consent {
            attributes.insert(
                "subscriptions".to_string(),
                json!({ "email": { "marketing": { "consent": consent } } }),
            );
        }
        let body = json!({
            "data": {
                "type": job,
                "attributes": {
                    "profiles": {
                        "data": [{ "type": "profile", "attributes": attributes }],
                    },
                },
                "relationships": {
                    "list": { "data": { "type": "list", "id": list_id } },
                },
            },
        });
        let url = self.endpoint(&["api", &format!("{job}s")]);
        let reply = self.send(Method::POST, &url, Some(&body))?;
        if reply.is_success() {
            return Ok(());
        }
        Err(rejection(&reply))
    }
}

impl EmailProvider for JsonApiEmailProvider {
    fn find_profile(
        &self,
        email: &EmailAddress,
        detail: LookupDetail,
    ) -> Result<Option<ProviderProfile>, EmailProviderError> {
        let mut url = self.endpoint(&["api", "profiles"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("filter", &format!("equals(email,\"{}\")", email.as_str()));
            if detail == LookupDetail::WithSubscriptions {
                query.append_pair(ADDITIONAL_FIELDS_PARAM, "subscriptions");
            }
        }
        let reply = self.send(Method::GET, &url, None)?;
        if reply.status == 400 && reply.text().contains("additional-fields") {
            return Err(EmailProviderError::UnsupportedField(ADDITIONAL_FIELDS_PARAM.to_string()));
        }
        if !reply.is_success() {
            return Err(rejection(&reply));
        }
        let payload = parse_json(&reply)?;
        let Some(first) = payload.get("data").and_then(Value::as_array).and_then(|d| d.first())
        else {
            return Ok(None);
        };
        let id = profile_id(first)?;
        let subscription = match detail {
            LookupDetail::WithSubscriptions => subscription_from(first),
            LookupDetail::Basic => None,
        };
        Ok(Some(ProviderProfile {
            id,
            subscription,
        }))
    }

    fn create_profile(
        &self,
        email: &EmailAddress,
        attributes: &ProfileAttributes,
    ) -> Result<ProviderProfile, EmailProviderError> {
        let mut fields = profile_fields(attributes);
        fields.insert("email".to_string(), json!(email.as_str()));
        let body = json!({ "data": { "type": "profile", "attributes": fields } });
        let url = self.endpoint(&["api", "profiles"]);
        let reply = self.send(Method::POST, &url, Some(&body))?;
        if reply.status == 409 {
            let payload = parse_json(&reply)?;
            let duplicate = payload
                .pointer("/errors/0/meta/duplicate_profile_id")
                .and_then(Value::as_str)
                .ok_or_else(|| rejection(&reply))?;
            return Ok(ProviderProfile {
                id: duplicate.to_string(),
                subscription: None,
            });
        }
        if !reply.is_success() {
            return Err(rejection(&reply));
        }
        let payload = parse_json(&reply)?;
        let data = payload
            .get("data")
            .ok_or_else(|| EmailProviderError::InvalidResponse("missing data".to_string()))?;
        Ok(ProviderProfile {
            id: profile_id(data)?,
            subscription: None,
        })
    }

    fn update_profile(
        &self,
        profile_id: &str,
        attributes: &ProfileAttributes,
    ) -> Result<(), EmailProviderError> {
        let body = json!({
            "data": {
                "type": "profile",
                "id": profile_id,
                "attributes": profile_fields(attributes),
            },
        });
        let url = self.endpoint(&["api", "profiles", profile_id]);
        let reply = self.send(Method::PATCH, &url, Some(&body))?;
        if reply.is_success() {
            return Ok(());
        }
        Err(rejection(&reply))
    }

    fn subscribe(&self, list_id: &str, email: &EmailAddress) -> Result<(), EmailProviderError> {
        let job = "profile-subscription-bulk-create-job";
        self.subscription_job(job, list_id, email, Some("SUBSCRIBED"))
    }

    fn unsubscribe(&self, list_id: &str, email: &EmailAddress) -> Result<(), EmailProviderError> {
        self.subscription_job("profile-subscription-bulk-delete-job", list_id, email, None)
    }
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Builds writable profile attributes; absent values are omitted.
fn profile_fields(attributes: &ProfileAttributes) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(first) = &attributes.traits.first_name {
        fields.insert("first_name".to_string(), json!(first));
    }
    if let Some(last) = &attributes.traits.last_name {
        fields.insert("last_name".to_string(), json!(last));
    }
    if let Some(region) = &attributes.region {
        fields.insert("location".to_string(), json!({ "country": region.as_str() }));
    }
    if let Some(segment) = attributes.segment {
        fields.insert("properties".to_string(), json!({ "customer_segment": segment.as_str() }));
    }
    fields
}

/// Reads the profile identifier from a resource object.
fn profile_id(resource: &Value) -> Result<String, EmailProviderError> {
    resource
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| EmailProviderError::InvalidResponse("profile id missing".to_string()))
}

/// Reads email marketing subscription state from a profile resource.
fn subscription_from(resource: &Value) -> Option<ProviderSubscription> {
    let marketing = resource.pointer("/attributes/subscriptions/email/marketing")?;
    let consent = match marketing.get("consent").and_then(Value::as_str) {
        Some(raw) if raw.eq_ignore_ascii_case("SUBSCRIBED") => ProviderConsent::Subscribed,
        Some(raw) if raw.eq_ignore_ascii_case("UNSUBSCRIBED") => ProviderConsent::Unsubscribed,
        _ => ProviderConsent::NeverSubscribed,
    };
    let suppressed = marketing
        .get("suppression")
        .and_then(Value::as_array)
        .is_some_and(|entries| !entries.is_empty());
    Some(ProviderSubscription {
        consent,
        suppressed,
    })
}

/// Parses a JSON reply body.
fn parse_json(reply: &HttpReply) -> Result<Value, EmailProviderError> {
    serde_json::from_slice(&reply.body)
        .map_err(|err| EmailProviderError::InvalidResponse(format!("json: {err}")))
}

/// Builds a rejection from a non-success reply, preferring the first error detail.
fn rejection(reply: &HttpReply) -> EmailProviderError {
    let detail = serde_json::from_slice::<Value>(&reply.body).ok().and_then(|payload| {
        payload
            .pointer("/errors/0/detail")
            .and_then(Value::as_str)
            .map(ToString::to_string)
    });
    EmailProviderError::Rejected {
        status: reply.status,
        message: detail.unwrap_or_else(|| format!("status {}", reply.status)),
    }
}
