use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::operations::profile::{self, ProfileChanges};
use crate::response::{created, ok, AppError};
use crate::routes::access::{optional, owned_profile, required};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(show).put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRequest {
    display_name: Option<String>,
    grade_level: Option<String>,
    avatar: Option<String>,
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(profile::list_profiles(state.db(), &user.id).await?))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let display_name = required(body.display_name, "displayName")?;
    let grade_level = optional(body.grade_level);
    let avatar = optional(body.avatar);

    let created_profile = profile::insert_profile(
        state.db(),
        &user.id,
        &display_name,
        grade_level.as_deref(),
        avatar.as_deref(),
    )
    .await?;
    Ok(created(created_profile))
}

async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(owned_profile(&state, &user, &id).await?))
}

async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let current = owned_profile(&state, &user, &id).await?;
    let changes = ProfileChanges {
        display_name: optional(body.display_name),
        grade_level: optional(body.grade_level),
        avatar: optional(body.avatar),
    };
    Ok(ok(profile::update_profile(state.db(), &current, changes).await?))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let current = owned_profile(&state, &user, &id).await?;
    profile::delete_profile(state.db(), &user.id, &current.id).await?;
    tracing::info!(profile_id = %current.id, "profile deleted");
    Ok(ok(serde_json::json!({ "deleted": true })))
}
