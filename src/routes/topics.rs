use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::proof::{self, NewProofEvent};
use crate::db::operations::topics::{self, StudyTopic, TopicSource};
use crate::response::{created, ok, AppError};
use crate::routes::access::{owned_profile, owned_topic, profile_from_query, required, ProfileQuery};
use crate::services::decay;
use crate::services::orbit::{self, OrbitState, Release, ReviewInput, TransitionError};
use crate::state::AppState;
use crate::time::now_ms;

/// UI pacing for the airlock animation; the server does not wait.
pub const RELEASE_DISPLAY_DELAY_MS: u64 = 600;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/decay", post(run_decay))
        .route("/review-queue", get(review_queue))
        .route("/edges", post(create_edge))
        .route("/edges/:id", delete(remove_edge))
        .route("/:id", get(show).delete(remove))
        .route("/:id/release", post(release))
        .route("/:id/review", post(review))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicListQuery {
    profile_id: Option<String>,
    orbit_state: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicRequest {
    profile_id: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEdgeRequest {
    profile_id: Option<String>,
    from_topic_id: Option<String>,
    to_topic_id: Option<String>,
    relation: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseResponse {
    topic: StudyTopic,
    already_active: bool,
    display_delay_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewResponse {
    topic: StudyTopic,
    #[serde(serialize_with = "orbit::serialize_code")]
    previous_state: OrbitState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecayResponse {
    decayed: Vec<StudyTopic>,
    count: usize,
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TopicListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(
        &state,
        &user,
        &ProfileQuery {
            profile_id: query.profile_id,
        },
    )
    .await?;
    let filter = match query.orbit_state {
        Some(code) => Some(
            OrbitState::from_code(code)
                .ok_or_else(|| AppError::validation("orbitState must be 0, 1, 2 or 3"))?,
        ),
        None => None,
    };
    Ok(ok(topics::list_topics(state.db(), &profile.id, filter).await?))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile_id = required(body.profile_id, "profileId")?;
    let title = required(body.title, "title")?;
    let profile = owned_profile(&state, &user, &profile_id).await?;
    let topic = topics::insert_topic(state.db(), &profile.id, &title, TopicSource::Manual).await?;
    Ok(created(topic))
}

async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (topic, _) = owned_topic(&state, &user, &id).await?;
    Ok(ok(topic))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (topic, _) = owned_topic(&state, &user, &id).await?;
    topics::delete_topic(state.db(), &topic).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

/// Airlock release: Quarantined to Active. Releasing an Active topic is a
/// no-op; Mastered and Ghost topics cannot go back through the airlock.
async fn release(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (topic, _) = owned_topic(&state, &user, &id).await?;

    let already_active = match orbit::release(topic.orbit_state) {
        Ok(Release::AlreadyActive) => true,
        Ok(Release::Released) => {
            if !topics::mark_released(state.db(), &topic.id).await? {
                return Err(AppError::conflict("Topic changed state during release"));
            }
            false
        }
        Err(err) => return Err(AppError::conflict(err.to_string())),
    };

    let topic = topics::find_topic(state.db(), &topic.id)
        .await?
        .ok_or_else(|| AppError::not_found("Topic not found"))?;
    if !already_active {
        tracing::info!(topic_id = %topic.id, "topic released from quarantine");
    }

    Ok(ok(ReleaseResponse {
        topic,
        already_active,
        display_delay_ms: RELEASE_DISPLAY_DELAY_MS,
    }))
}

async fn review(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let score = body.score.ok_or_else(|| AppError::missing_field("score"))?;
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(AppError::validation("score must be between 0 and 100"));
    }

    let (topic, profile) = owned_topic(&state, &user, &id).await?;
    let now = now_ms();
    let outcome = orbit::apply_review(ReviewInput {
        state: topic.orbit_state,
        mastery_score: topic.mastery_score,
        schedule: topic.schedule(),
        score,
        now_ms: now,
    })
    .map_err(|err: TransitionError| AppError::conflict(err.to_string()))?;

    if !topics::save_review(state.db(), &topic.id, topic.orbit_state, &outcome, now).await? {
        return Err(AppError::conflict(
            "Topic changed while the review was being saved; reload and try again",
        ));
    }
    proof::insert_proof_event(
        state.db(),
        NewProofEvent {
            profile_id: &profile.id,
            topic_id: Some(&topic.id),
            kind: proof::KIND_REVIEW,
            score: Some(score),
            detail: Some(serde_json::json!({
                "fromState": topic.orbit_state.code(),
                "toState": outcome.state.code(),
                "masteryScore": outcome.mastery_score,
                "intervalDays": outcome.schedule.interval_days,
            })),
        },
    )
    .await?;

    let previous_state = topic.orbit_state;
    let updated = StudyTopic {
        mastery_score: outcome.mastery_score,
        orbit_state: outcome.state,
        next_review_date: Some(outcome.next_review_date),
        interval_days: outcome.schedule.interval_days,
        ease_factor: outcome.schedule.ease_factor,
        repetitions: outcome.schedule.repetitions,
        updated_at: now,
        ..topic
    };

    Ok(ok(ReviewResponse {
        topic: updated,
        previous_state,
    }))
}

async fn run_decay(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(&state, &user, &query).await?;
    let decayed = decay::run_lazy_decay(state.db(), &profile.id, now_ms()).await?;
    Ok(ok(DecayResponse {
        count: decayed.len(),
        decayed,
    }))
}

async fn review_queue(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(&state, &user, &query).await?;
    Ok(ok(decay::review_queue(state.db(), &profile.id, now_ms()).await?))
}

async fn create_edge(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateEdgeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile_id = required(body.profile_id, "profileId")?;
    let from_topic_id = required(body.from_topic_id, "fromTopicId")?;
    let to_topic_id = required(body.to_topic_id, "toTopicId")?;
    let relation = body
        .relation
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "related".to_string());

    let profile = owned_profile(&state, &user, &profile_id).await?;
    if from_topic_id == to_topic_id {
        return Err(AppError::validation("an edge must join two different topics"));
    }
    for topic_id in [&from_topic_id, &to_topic_id] {
        let topic = topics::find_topic(state.db(), topic_id)
            .await?
            .ok_or_else(|| AppError::not_found("Topic not found"))?;
        if topic.profile_id != profile.id {
            return Err(AppError::validation("both topics must belong to the profile"));
        }
    }

    let edge =
        topics::insert_edge(state.db(), &profile.id, &from_topic_id, &to_topic_id, &relation)
            .await?;
    Ok(created(edge))
}

async fn remove_edge(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let edge = topics::find_edge(state.db(), &id)
        .await?
        .ok_or_else(|| AppError::not_found("Edge not found"))?;
    owned_profile(&state, &user, &edge.profile_id).await?;
    topics::delete_edge(state.db(), &edge.id).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
