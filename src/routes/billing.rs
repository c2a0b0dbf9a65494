use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::billing::{self, SubscriptionRecord};
use crate::response::{ok, AppError};
use crate::services::billing::{
    apply_webhook_event, verify_webhook_signature, BillingError, BillingInterval, PlanType,
    WebhookEvent,
};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/checkout", post(checkout))
        .route("/portal", post(portal))
}

/// Mounted outside the session guard; the provider signs instead.
pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/webhook", post(webhook))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    interval: Option<BillingInterval>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(flatten)]
    subscription: SubscriptionRecord,
    is_paid: bool,
}

#[derive(Serialize)]
struct RedirectResponse {
    url: String,
}

async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let record = billing::find_subscription(state.db(), &user.id)
        .await?
        .unwrap_or_else(|| SubscriptionRecord::free(&user.id));
    let is_paid = PlanType::parse(&record.plan_type).is_some_and(PlanType::is_paid);
    Ok(ok(StatusResponse {
        subscription: record,
        is_paid,
    }))
}

async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let interval = body.interval.ok_or_else(|| AppError::missing_field("interval"))?;
    let client = state.billing();
    if !client.is_configured() {
        return Err(BillingError::NotConfigured("STRIPE_SECRET_KEY").into());
    }

    let existing = billing::find_subscription(state.db(), &user.id).await?;
    let customer_id = match existing.and_then(|record| record.customer_id) {
        Some(customer_id) => customer_id,
        None => {
            let customer_id = client.create_customer(&user.email, &user.id).await?;
            billing::attach_customer(state.db(), &user.id, &customer_id).await?;
            customer_id
        }
    };

    let url = client
        .create_checkout_session(&customer_id, &user.id, interval, &state.config().frontend_url)
        .await?;
    Ok(ok(RedirectResponse { url }))
}

async fn portal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let client = state.billing();
    if !client.is_configured() {
        return Err(BillingError::NotConfigured("STRIPE_SECRET_KEY").into());
    }
    let customer_id = billing::find_subscription(state.db(), &user.id)
        .await?
        .and_then(|record| record.customer_id)
        .ok_or(BillingError::NoCustomer)?;

    let url = client
        .create_portal_session(&customer_id, &state.config().frontend_url)
        .await?;
    Ok(ok(RedirectResponse { url }))
}

/// Takes the raw body: the signature covers the exact bytes sent.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let secret = state
        .config()
        .billing
        .webhook_secret
        .as_deref()
        .ok_or(BillingError::NotConfigured("STRIPE_WEBHOOK_SECRET"))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(BillingError::InvalidSignature("missing header"))?;

    verify_webhook_signature(signature, &body, secret, chrono::Utc::now().timestamp())?;
    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| BillingError::MalformedEvent("body is not a webhook event"))?;

    let outcome = apply_webhook_event(state.db(), &state.config().billing, event).await?;
    Ok(ok(outcome))
}
