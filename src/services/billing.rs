//! Subscription billing against a Stripe-compatible API.
//!
//! The provider is the source of truth; `subscriptions` is a mirror kept
//! current by webhooks. Plan mapping and signature checks are pure so they
//! can be tested without the network.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::config::BillingConfig;
use crate::db::operations::billing::{self, SubscriptionRecord};
use crate::db::DatabaseProxy;
use crate::time::now_ms;

pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Free,
    Trial,
    Monthly,
    Annual,
}

impl PlanType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Trial => "trial",
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Self::Free),
            "trial" => Some(Self::Trial),
            "monthly" => Some(Self::Monthly),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }

    pub fn is_paid(self) -> bool {
        self != Self::Free
    }
}

/// Requested billing interval for checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Annual,
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("billing not configured: {0}")]
    NotConfigured(&'static str),
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(&'static str),
    #[error("malformed webhook payload: {0}")]
    MalformedEvent(&'static str),
    #[error("no billing account for this user")]
    NoCustomer,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Maps a provider subscription status and price to the local plan.
pub fn plan_for(status: &str, price_id: Option<&str>, config: &BillingConfig) -> PlanType {
    match status {
        "trialing" => PlanType::Trial,
        "active" | "past_due" => {
            if price_id.is_some() && price_id == config.price_annual.as_deref() {
                PlanType::Annual
            } else if price_id.is_some() && price_id == config.price_monthly.as_deref() {
                PlanType::Monthly
            } else {
                tracing::warn!(
                    price_id = ?price_id,
                    "unknown price on active subscription; treating as monthly"
                );
                PlanType::Monthly
            }
        }
        _ => PlanType::Free,
    }
}

/// Checks a `Stripe-Signature` header (`t=...,v1=...`) over `"{t}.{body}"`.
pub fn verify_webhook_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now_secs: i64,
) -> Result<(), BillingError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidSignature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(BillingError::InvalidSignature("missing v1 signature"));
    }
    if now_secs.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(BillingError::InvalidSignature("timestamp outside tolerance"));
    }

    let matches = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature("signature mismatch"))
    }
}

/// Produces a header value the provider would send; used by tests and
/// local webhook replays.
pub fn sign_webhook_payload(body: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub trial_end: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProviderSubscription {
    fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckoutCompleted {
    customer: Option<String>,
    subscription: Option<String>,
    client_reference_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub handled: bool,
    pub user_id: Option<String>,
}

impl WebhookOutcome {
    fn ignored() -> Self {
        Self {
            handled: false,
            user_id: None,
        }
    }
}

/// Applies one verified webhook event to the local mirror. Unknown event
/// types and events for unknown customers are acknowledged and ignored.
pub async fn apply_webhook_event(
    proxy: &DatabaseProxy,
    config: &BillingConfig,
    event: WebhookEvent,
) -> Result<WebhookOutcome, BillingError> {
    match event.kind.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutCompleted = serde_json::from_value(event.data.object)?;
            let (Some(user_id), Some(customer_id)) = (session.client_reference_id, session.customer)
            else {
                return Err(BillingError::MalformedEvent(
                    "checkout session without user or customer",
                ));
            };

            let mut record = billing::find_subscription(proxy, &user_id)
                .await?
                .unwrap_or_else(|| SubscriptionRecord::free(&user_id));
            record.customer_id = Some(customer_id);
            if session.subscription.is_some() {
                record.subscription_id = session.subscription;
            }
            record.updated_at = now_ms();
            billing::upsert_subscription(proxy, &record).await?;

            tracing::info!(user_id = %user_id, "checkout completed");
            Ok(WebhookOutcome {
                handled: true,
                user_id: Some(user_id),
            })
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let subscription: ProviderSubscription = serde_json::from_value(event.data.object)?;
            let existing = billing::find_by_customer(proxy, &subscription.customer).await?;
            let user_id = match (&existing, subscription.metadata.get("user_id")) {
                (Some(record), _) => record.user_id.clone(),
                (None, Some(user_id)) => user_id.clone(),
                (None, None) => {
                    tracing::warn!(
                        customer = %subscription.customer,
                        "subscription event for unknown customer"
                    );
                    return Ok(WebhookOutcome::ignored());
                }
            };

            let deleted = event.kind == "customer.subscription.deleted";
            let status = if deleted { "canceled" } else { subscription.status.as_str() };
            let price_id = subscription.price_id().map(str::to_string);
            let plan = plan_for(status, price_id.as_deref(), config);

            let record = SubscriptionRecord {
                user_id: user_id.clone(),
                customer_id: Some(subscription.customer.clone()),
                subscription_id: Some(subscription.id.clone()),
                status: status.to_string(),
                price_id,
                plan_type: plan.as_str().to_string(),
                trial_end: subscription.trial_end.map(|secs| secs * 1000),
                current_period_end: subscription.current_period_end.map(|secs| secs * 1000),
                cancel_at_period_end: !deleted && subscription.cancel_at_period_end,
                updated_at: now_ms(),
            };
            billing::upsert_subscription(proxy, &record).await?;

            tracing::info!(user_id = %user_id, status, plan = plan.as_str(), "subscription synced");
            Ok(WebhookOutcome {
                handled: true,
                user_id: Some(user_id),
            })
        }
        other => {
            tracing::debug!(event = other, "ignoring webhook event");
            Ok(WebhookOutcome::ignored())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProviderObject {
    id: String,
    url: Option<String>,
}

/// Thin client for the provider's REST API (form-encoded requests).
#[derive(Clone)]
pub struct BillingClient {
    config: BillingConfig,
    client: reqwest::Client,
}

impl BillingClient {
    pub fn new(config: BillingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.secret_key.is_some()
    }

    pub async fn create_customer(
        &self,
        email: &str,
        user_id: &str,
    ) -> Result<String, BillingError> {
        let form = [
            ("email", email.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];
        let object = self.post("customers", &form).await?;
        Ok(object.id)
    }

    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        user_id: &str,
        interval: BillingInterval,
        frontend_url: &str,
    ) -> Result<String, BillingError> {
        let price = match interval {
            BillingInterval::Monthly => self.config.price_monthly.as_deref(),
            BillingInterval::Annual => self.config.price_annual.as_deref(),
        }
        .ok_or(BillingError::NotConfigured("price id"))?;

        let base = frontend_url.trim_end_matches('/');
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("customer", customer_id.to_string()),
            ("client_reference_id", user_id.to_string()),
            ("line_items[0][price]", price.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("subscription_data[metadata][user_id]", user_id.to_string()),
            ("success_url", format!("{base}/billing?checkout=success")),
            ("cancel_url", format!("{base}/billing?checkout=cancelled")),
        ];
        if self.config.trial_days > 0 {
            form.push(("subscription_data[trial_period_days]", self.config.trial_days.to_string()));
        }

        let object = self.post("checkout/sessions", &form).await?;
        object.url.ok_or(BillingError::MalformedEvent("checkout session without url"))
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        frontend_url: &str,
    ) -> Result<String, BillingError> {
        let form = [
            ("customer", customer_id.to_string()),
            ("return_url", format!("{}/billing", frontend_url.trim_end_matches('/'))),
        ];
        let object = self.post("billing_portal/sessions", &form).await?;
        object.url.ok_or(BillingError::MalformedEvent("portal session without url"))
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<ProviderObject, BillingError> {
        let secret = self
            .config
            .secret_key
            .as_deref()
            .ok_or(BillingError::NotConfigured("STRIPE_SECRET_KEY"))?;
        let url = format!("{}/{path}", self.config.api_base.trim_end_matches('/'));

        let response = self.client.post(&url).bearer_auth(secret).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::HttpStatus { status, body });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BillingConfig {
        BillingConfig {
            secret_key: None,
            webhook_secret: Some("whsec_test".to_string()),
            price_monthly: Some("price_m".to_string()),
            price_annual: Some("price_a".to_string()),
            trial_days: 7,
            api_base: "https://billing.invalid/v1".to_string(),
        }
    }

    #[test]
    fn plan_mapping_follows_status_then_price() {
        let config = config();
        assert_eq!(plan_for("trialing", Some("price_a"), &config), PlanType::Trial);
        assert_eq!(plan_for("active", Some("price_a"), &config), PlanType::Annual);
        assert_eq!(plan_for("past_due", Some("price_m"), &config), PlanType::Monthly);
        assert_eq!(plan_for("active", Some("price_other"), &config), PlanType::Monthly);
        assert_eq!(plan_for("active", None, &config), PlanType::Monthly);
        assert_eq!(plan_for("canceled", Some("price_a"), &config), PlanType::Free);
        assert_eq!(plan_for("incomplete", None, &config), PlanType::Free);
    }

    #[test]
    fn signed_payload_verifies() {
        let body = br#"{"type":"ping"}"#;
        let header = sign_webhook_payload(body, "whsec_test", 1_700_000_000);
        assert!(verify_webhook_signature(&header, body, "whsec_test", 1_700_000_100).is_ok());
    }

    #[test]
    fn tampered_or_stale_payloads_fail() {
        let body = br#"{"type":"ping"}"#;
        let header = sign_webhook_payload(body, "whsec_test", 1_700_000_000);
        assert!(verify_webhook_signature(&header, b"{}", "whsec_test", 1_700_000_000).is_err());
        assert!(verify_webhook_signature(&header, body, "other", 1_700_000_000).is_err());
        assert!(verify_webhook_signature(&header, body, "whsec_test", 1_700_000_301).is_err());
        assert!(verify_webhook_signature("v1=abc", body, "whsec_test", 1_700_000_000).is_err());
    }

    #[test]
    fn extreme_timestamps_are_outside_tolerance() {
        let body = b"{}";
        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            let err = verify_webhook_signature(header, body, "whsec_test", 1_700_000_000)
                .unwrap_err();
            assert!(matches!(
                err,
                BillingError::InvalidSignature("timestamp outside tolerance")
            ));
        }
    }

    #[test]
    fn stored_plan_names_parse_back() {
        for plan in [PlanType::Free, PlanType::Trial, PlanType::Monthly, PlanType::Annual] {
            assert_eq!(PlanType::parse(plan.as_str()), Some(plan));
        }
        assert_eq!(PlanType::parse("enterprise"), None);
        assert!(!PlanType::Free.is_paid());
        assert!(PlanType::Trial.is_paid());
    }

    #[test]
    fn any_matching_v1_signature_is_accepted() {
        let body = b"payload";
        let good = sign_webhook_payload(body, "whsec_test", 100);
        let v1 = good.split("v1=").nth(1).unwrap();
        let header = format!("t=100,v1=deadbeef,v1={v1}");
        assert!(verify_webhook_signature(&header, body, "whsec_test", 100).is_ok());
    }

    #[test]
    fn subscription_object_decodes_price() {
        let object = serde_json::json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "items": {"data": [{"price": {"id": "price_a"}}]},
            "current_period_end": 1_700_000_000
        });
        let subscription: ProviderSubscription = serde_json::from_value(object).unwrap();
        assert_eq!(subscription.price_id(), Some("price_a"));
        assert!(!subscription.cancel_at_period_end);
    }
}
