use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthUser};
use crate::db::operations::billing;
use crate::db::operations::user::{self, NewUser, UserRecord};
use crate::response::{created, ok, AppError};
use crate::routes::access::{optional, required};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const ROLES: &[&str] = &["parent", "student"];

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: Option<String>,
    password: Option<String>,
    display_name: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    user: UserRecord,
    token: String,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    expires_at: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    #[serde(flatten)]
    user: AuthUser,
    plan_type: String,
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = required(body.email, "email")?.to_lowercase();
    if !email.contains('@') {
        return Err(AppError::validation("email is invalid"));
    }
    let password = body.password.ok_or_else(|| AppError::missing_field("password"))?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let role = optional(body.role).unwrap_or_else(|| "parent".to_string());
    if !ROLES.contains(&role.as_str()) {
        return Err(AppError::validation("role must be parent or student"));
    }
    let display_name = optional(body.display_name)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    if user::find_user_by_email(state.db(), &email).await?.is_some() {
        return Err(AppError::conflict("An account with this email already exists"));
    }

    let password_hash = auth::hash_password(&password)?;
    let account = user::insert_user(
        state.db(),
        NewUser {
            email: &email,
            password_hash: &password_hash,
            display_name: &display_name,
            role: &role,
        },
    )
    .await?;
    tracing::info!(user_id = %account.id, "account registered");

    let (headers, session) = open_session(&state, account).await?;
    let (status, body) = created(session);
    Ok((status, headers, body))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = required(body.email, "email")?.to_lowercase();
    let password = body.password.ok_or_else(|| AppError::missing_field("password"))?;

    let account = user::find_user_by_email(state.db(), &email).await?;
    let Some(account) =
        account.filter(|account| auth::verify_password(&password, &account.password_hash))
    else {
        tracing::warn!("login rejected");
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    let (headers, session) = open_session(&state, account).await?;
    Ok((headers, ok(session)))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = auth::extract_token(&headers) {
        user::delete_session(state.db(), &auth::hash_token(&token)).await?;
    }
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, auth::clear_cookie_header());
    Ok((response_headers, ok(serde_json::json!({ "loggedOut": true }))))
}

async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let plan_type = billing::find_subscription(state.db(), &user.id)
        .await?
        .map(|subscription| subscription.plan_type)
        .unwrap_or_else(|| "free".to_string());
    Ok(ok(MeResponse { user, plan_type }))
}

async fn open_session(
    state: &AppState,
    account: UserRecord,
) -> Result<(HeaderMap, SessionResponse), AppError> {
    let (token, expires_at) = auth::sign_jwt_for_user(state.config(), &account.id)?;
    user::insert_session(state.db(), &account.id, &auth::hash_token(&token), expires_at).await?;

    let mut headers = HeaderMap::new();
    if let Some(cookie) = auth::auth_cookie_header(state.config(), &token) {
        headers.insert(header::SET_COOKIE, cookie);
    }
    Ok((
        headers,
        SessionResponse {
            user: account,
            token,
            expires_at,
        },
    ))
}
