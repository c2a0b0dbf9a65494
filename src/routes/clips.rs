use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::operations::content;
use crate::response::{created, ok, AppError};
use crate::routes::access::{optional, owned_profile, required, ProfileQuery};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", delete(remove))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateClipRequest {
    content: Option<String>,
    source_url: Option<String>,
    profile_id: Option<String>,
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile_id = match optional(query.profile_id) {
        Some(id) => Some(owned_profile(&state, &user, &id).await?.id),
        None => None,
    };
    Ok(ok(content::list_clips(state.db(), &user.id, profile_id.as_deref()).await?))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateClipRequest>,
) -> Result<impl IntoResponse, AppError> {
    let text = required(body.content, "content")?;
    let source_url = optional(body.source_url);
    let profile_id = match optional(body.profile_id) {
        Some(id) => Some(owned_profile(&state, &user, &id).await?.id),
        None => None,
    };

    let clip = content::insert_clip(
        state.db(),
        &user.id,
        profile_id.as_deref(),
        &text,
        source_url.as_deref(),
    )
    .await?;
    Ok(created(clip))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !content::delete_clip(state.db(), &user.id, &id).await? {
        return Err(AppError::not_found("Clip not found"));
    }
    Ok(ok(serde_json::json!({ "deleted": true })))
}
