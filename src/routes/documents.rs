use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::content;
use crate::db::operations::topics::TopicSource;
use crate::response::{created, ok, AppError};
use crate::routes::access::{optional, owned_profile, required};
use crate::services::documents::{self, NewDocument, ToggleReport};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(upload))
        .route("/active", post(set_active))
        .route("/:filename", delete(remove))
        .route("/:filename/chunks", get(chunks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    filename: Option<String>,
    content: Option<String>,
    profile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    filename: Option<String>,
    active: Option<bool>,
}

/// Body for a toggle where some chunk updates failed. Successful updates
/// are not rolled back, so the counts tell the client what stuck.
#[derive(Serialize)]
struct PartialToggleBody {
    success: bool,
    error: String,
    code: &'static str,
    partial: bool,
    updated: usize,
    failed: usize,
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(content::list_documents(state.db(), &user.id).await?))
}

async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let filename = required(body.filename, "filename")?;
    let text = required(body.content, "content")?;
    let profile_id = match optional(body.profile_id) {
        Some(id) => Some(owned_profile(&state, &user, &id).await?.id),
        None => None,
    };

    let title = documents::topic_title(&filename);
    let document = documents::ingest(
        state.db(),
        &user.id,
        NewDocument {
            profile_id: profile_id.as_deref(),
            filename: &filename,
            topic_title: &title,
            text: &text,
            source: TopicSource::Upload,
        },
    )
    .await?;
    Ok(created(document))
}

async fn chunks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let chunks = content::list_chunks(state.db(), &user.id, &filename).await?;
    if chunks.is_empty() {
        return Err(AppError::not_found("Document not found"));
    }
    Ok(ok(chunks))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let removed = content::delete_document(state.db(), &user.id, &filename).await?;
    if removed == 0 {
        return Err(AppError::not_found("Document not found"));
    }
    Ok(ok(serde_json::json!({ "deleted": removed })))
}

async fn set_active(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ToggleRequest>,
) -> Result<Response, AppError> {
    let filename = required(body.filename, "filename")?;
    let active = body.active.ok_or_else(|| AppError::missing_field("active"))?;

    let report = documents::set_document_active(state.db(), &user.id, &filename, active).await?;
    if report.total == 0 {
        return Err(AppError::not_found("Document not found"));
    }
    Ok(toggle_response(report))
}

fn toggle_response(report: ToggleReport) -> Response {
    if report.is_partial() {
        let body = PartialToggleBody {
            success: false,
            error: format!(
                "Updated {} of {} chunks; {} failed",
                report.updated, report.total, report.failed
            ),
            code: "PARTIAL_UPDATE",
            partial: true,
            updated: report.updated,
            failed: report.failed,
        };
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }
    ok(report).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toggle_is_a_server_error() {
        let response = toggle_response(ToggleReport {
            total: 4,
            updated: 3,
            failed: 1,
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn complete_toggle_is_ok() {
        let response = toggle_response(ToggleReport {
            total: 4,
            updated: 4,
            failed: 0,
        });
        assert_eq!(response.status(), StatusCode::OK);
    }
}
