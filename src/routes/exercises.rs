use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::exercises::{self, ExerciseItem, ExerciseKind, ExerciseRecord};
use crate::db::operations::proof::{self, NewProofEvent};
use crate::response::{created, ok, AppError};
use crate::routes::access::{owned_profile, profile_from_query, required, ProfileQuery};
use crate::services::exercises::{score_attempt, AttemptScore};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(show).delete(remove))
        .route("/:id/attempts", post(attempt))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExerciseRequest {
    profile_id: Option<String>,
    kind: Option<String>,
    title: Option<String>,
    #[serde(default)]
    items: Vec<ExerciseItem>,
}

#[derive(Debug, Deserialize)]
struct AttemptRequest {
    #[serde(default)]
    answers: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttemptResponse {
    exercise_id: String,
    #[serde(flatten)]
    score: AttemptScore,
    proof_event_id: String,
}

async fn owned_exercise(
    state: &AppState,
    user: &AuthUser,
    exercise_id: &str,
) -> Result<ExerciseRecord, AppError> {
    let exercise = exercises::find_exercise(state.db(), exercise_id)
        .await?
        .ok_or_else(|| AppError::not_found("Exercise not found"))?;
    owned_profile(state, user, &exercise.profile_id).await?;
    Ok(exercise)
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(&state, &user, &query).await?;
    Ok(ok(exercises::list_exercises(state.db(), &profile.id).await?))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateExerciseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile_id = required(body.profile_id, "profileId")?;
    let kind = required(body.kind, "kind")?;
    let kind = ExerciseKind::parse(&kind)
        .ok_or_else(|| AppError::validation("kind must be spelling or reading"))?;
    let title = required(body.title, "title")?;

    let items: Vec<ExerciseItem> = body
        .items
        .into_iter()
        .filter(|item| !item.prompt.trim().is_empty() && !item.answer.trim().is_empty())
        .collect();
    if items.is_empty() {
        return Err(AppError::validation("items must contain at least one prompt and answer"));
    }

    let profile = owned_profile(&state, &user, &profile_id).await?;
    let exercise = exercises::insert_exercise(state.db(), &profile.id, kind, &title, items).await?;
    Ok(created(exercise))
}

async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(owned_exercise(&state, &user, &id).await?))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let exercise = owned_exercise(&state, &user, &id).await?;
    exercises::delete_exercise(state.db(), &exercise).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

async fn attempt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<AttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exercise = owned_exercise(&state, &user, &id).await?;
    let score = score_attempt(exercise.kind, &exercise.items, &body.answers);

    let event = proof::insert_proof_event(
        state.db(),
        NewProofEvent {
            profile_id: &exercise.profile_id,
            topic_id: None,
            kind: proof::KIND_EXERCISE_ATTEMPT,
            score: Some(score.score),
            detail: Some(serde_json::json!({
                "exerciseId": exercise.id,
                "kind": exercise.kind.as_str(),
                "correct": score.correct,
                "total": score.total,
            })),
        },
    )
    .await?;

    Ok(created(AttemptResponse {
        exercise_id: exercise.id,
        score,
        proof_event_id: event.id,
    }))
}
