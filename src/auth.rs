use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Config;
use crate::db::operations::user;
use crate::db::DatabaseProxy;

pub const AUTH_COOKIE_NAME: &str = "forge_session";
const BCRYPT_COST: u32 = 10;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("session expired")]
    Expired,
    #[error("JWT_SECRET is not configured")]
    MissingSecret,
    #[error("invalid JWT_EXPIRES_IN")]
    InvalidExpiresIn,
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
struct JwtClaims {
    user_id: String,
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Checks the signature, then requires a live session row whose user still exists.
pub async fn verify_request_token(
    proxy: &DatabaseProxy,
    secret: &str,
    token: &str,
) -> Result<AuthUser, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }
    let claims = verify_jwt_hs256(token, secret)?;

    let session = user::find_session(proxy, &hash_token(token))
        .await?
        .ok_or(AuthError::InvalidToken)?;

    if session.user_id != claims.user_id {
        return Err(AuthError::InvalidToken);
    }
    if session.expires_at < Utc::now().timestamp_millis() {
        return Err(AuthError::Expired);
    }

    let account = user::find_user_by_id(proxy, &claims.user_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    Ok(AuthUser {
        id: account.id,
        email: account.email,
        display_name: account.display_name,
        role: account.role,
        created_at: account.created_at,
    })
}

/// Signs a token and returns it with its expiry in epoch milliseconds.
pub fn sign_jwt_for_user(config: &Config, user_id: &str) -> Result<(String, i64), AuthError> {
    if config.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }
    let expires_in_ms = parse_expires_in_ms(&config.jwt_expires_in)?;

    let issued_at = Utc::now();
    let exp = issued_at
        .checked_add_signed(chrono::Duration::milliseconds(expires_in_ms))
        .ok_or(AuthError::InvalidExpiresIn)?;

    let header_json = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let payload_json = serde_json::json!({
        "userId": user_id,
        "jti": uuid::Uuid::new_v4().to_string(),
        "iat": issued_at.timestamp(),
        "exp": exp.timestamp(),
    });

    let header_b64 = URL_SAFE_NO_PAD.encode(header_json.to_string());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json.to_string());
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac = HmacSha256::new_from_slice(config.jwt_secret.as_bytes())
        .map_err(|_| AuthError::MissingSecret)?;
    mac.update(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok((format!("{signing_input}.{sig_b64}"), exp.timestamp_millis()))
}

fn verify_jwt_hs256(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;

    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidToken)?;
    if header_json.get("alg").and_then(|value| value.as_str()) != Some("HS256") {
        return Err(AuthError::InvalidToken);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidToken)?;

    if let Some(exp) = payload_json.get("exp").and_then(|value| value.as_i64()) {
        if Utc::now().timestamp() >= exp {
            return Err(AuthError::Expired);
        }
    }

    let user_id = payload_json
        .get("userId")
        .and_then(|value| value.as_str())
        .ok_or(AuthError::InvalidToken)?
        .to_string();

    Ok(JwtClaims { user_id })
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

pub fn parse_expires_in_ms(value: &str) -> Result<i64, AuthError> {
    let trimmed = value.trim();
    if trimmed.len() < 2 {
        return Err(AuthError::InvalidExpiresIn);
    }

    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);
    let amount: i64 = digits.parse().map_err(|_| AuthError::InvalidExpiresIn)?;
    if amount <= 0 {
        return Err(AuthError::InvalidExpiresIn);
    }

    match unit {
        "s" => Ok(amount * 1000),
        "m" => Ok(amount * 60 * 1000),
        "h" => Ok(amount * 60 * 60 * 1000),
        "d" => Ok(amount * 24 * 60 * 60 * 1000),
        _ => Err(AuthError::InvalidExpiresIn),
    }
}

pub fn auth_cookie_header(config: &Config, token: &str) -> Option<HeaderValue> {
    let max_age = parse_expires_in_ms(&config.jwt_expires_in)
        .map(|ms| ms / 1000)
        .unwrap_or(86_400);

    let mut cookie =
        format!("{AUTH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.is_production() {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie).ok()
}

pub fn clear_cookie_header() -> HeaderValue {
    HeaderValue::from_static("forge_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
