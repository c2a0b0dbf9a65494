//! Inbound email hook. Called by the mail relay, not by a logged-in user,
//! so it authenticates with a shared secret header instead of a session.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::hash_token;
use crate::db::operations::profile;
use crate::db::operations::topics::TopicSource;
use crate::response::{created, AppError};
use crate::routes::access::required;
use crate::services::documents::{self, NewDocument};
use crate::state::AppState;
use crate::time::now_ms;

pub const INTAKE_SECRET_HEADER: &str = "x-intake-secret";

pub fn router() -> Router<AppState> {
    Router::new().route("/email", post(receive_email))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailIntakeRequest {
    profile_id: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

fn check_secret(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Err(AppError::service_unavailable("Email intake is not configured"));
    };
    let provided = headers
        .get(INTAKE_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Missing intake secret"))?;

    // Compare digests so the comparison time does not depend on the secret.
    if hash_token(provided) != hash_token(expected) {
        return Err(AppError::unauthorized("Invalid intake secret"));
    }
    Ok(())
}

/// Subjects repeat ("Spelling list", "Homework"), so each message gets its
/// own document name.
fn email_filename(received_at: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("email-{received_at}-{}.txt", &suffix[..8])
}

async fn receive_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EmailIntakeRequest>,
) -> Result<impl IntoResponse, AppError> {
    check_secret(&headers, state.config().intake_secret.as_deref())?;

    let profile_id = required(body.profile_id, "profileId")?;
    let subject = required(body.subject, "subject")?;
    let text = required(body.body, "body")?;

    let profile = profile::find_profile(state.db(), &profile_id)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;

    let filename = email_filename(now_ms());
    let document = documents::ingest(
        state.db(),
        &profile.owner_id,
        NewDocument {
            profile_id: Some(&profile.id),
            filename: &filename,
            topic_title: &subject,
            text: &text,
            source: TopicSource::Email,
        },
    )
    .await?;
    tracing::info!(profile_id = %profile.id, chunks = document.chunks.len(), "email ingested");
    Ok(created(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn secret_must_match() {
        let mut headers = HeaderMap::new();
        headers.insert(INTAKE_SECRET_HEADER, HeaderValue::from_static("wrong"));
        let err = check_secret(&headers, Some("right")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        headers.insert(INTAKE_SECRET_HEADER, HeaderValue::from_static("right"));
        assert!(check_secret(&headers, Some("right")).is_ok());
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let err = check_secret(&HeaderMap::new(), Some("right")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn email_filenames_do_not_repeat() {
        let first = email_filename(1_700_000_000_000);
        let second = email_filename(1_700_000_000_000);
        assert!(first.starts_with("email-1700000000000-"));
        assert!(first.ends_with(".txt"));
        assert_ne!(first, second);
    }

    #[test]
    fn unconfigured_intake_is_unavailable() {
        let err = check_secret(&HeaderMap::new(), None).unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
