//! Exam sheets, practice ladders and confusion maps share one route shape;
//! the `:kind` segment selects the table.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::operations::artifacts::{self, ArtifactKind, ArtifactRecord};
use crate::response::{created, ok, AppError};
use crate::routes::access::{
    optional, owned_profile, owned_topic, profile_from_query, required, ProfileQuery,
};
use crate::services::artifacts::{generate_artifact, ArtifactInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:kind", get(list).post(generate))
        .route("/:kind/:id", get(show).delete(remove))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    profile_id: Option<String>,
    topic_id: Option<String>,
    title: Option<String>,
    notes: Option<String>,
}

fn parse_kind(segment: &str) -> Result<ArtifactKind, AppError> {
    ArtifactKind::from_path(segment).ok_or_else(|| AppError::not_found("Unknown artifact type"))
}

async fn owned_artifact(
    state: &AppState,
    user: &AuthUser,
    kind: ArtifactKind,
    artifact_id: &str,
) -> Result<ArtifactRecord, AppError> {
    let artifact = artifacts::find_artifact(state.db(), kind, artifact_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} not found", kind.label())))?;
    owned_profile(state, user, &artifact.profile_id).await?;
    Ok(artifact)
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(kind): Path<String>,
    Query(query): Query<ProfileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let profile = profile_from_query(&state, &user, &query).await?;
    Ok(ok(artifacts::list_artifacts(state.db(), kind, &profile.id).await?))
}

/// Generates with the LLM and stores the result. The subject is either an
/// existing topic of the profile or a free-form title.
async fn generate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(kind): Path<String>,
    Json(body): Json<GenerateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let profile_id = required(body.profile_id, "profileId")?;
    let profile = owned_profile(&state, &user, &profile_id).await?;

    let (topic_id, subject) = match optional(body.topic_id) {
        Some(topic_id) => {
            let (topic, topic_profile) = owned_topic(&state, &user, &topic_id).await?;
            if topic_profile.id != profile.id {
                return Err(AppError::validation("topic does not belong to the profile"));
            }
            (Some(topic.id), topic.title)
        }
        None => (None, required(body.title, "title")?),
    };
    let notes = optional(body.notes);

    let generated = generate_artifact(
        state.llm(),
        &ArtifactInput {
            kind,
            topic_title: &subject,
            notes: notes.as_deref(),
            grade_level: profile.grade_level.as_deref(),
        },
    )
    .await?;

    let record = artifacts::insert_artifact(
        state.db(),
        kind,
        &profile.id,
        topic_id.as_deref(),
        &generated.title,
        generated.content,
    )
    .await?;
    tracing::info!(kind = kind.label(), artifact_id = %record.id, "artifact generated");
    Ok(created(record))
}

async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    Ok(ok(owned_artifact(&state, &user, kind, &id).await?))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let artifact = owned_artifact(&state, &user, kind, &id).await?;
    artifacts::delete_artifact(state.db(), &artifact).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
