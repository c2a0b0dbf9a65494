use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::db::operations::topics::{self, StudyTopic, TopicEdge};
use crate::response::{ok, AppError};
use crate::routes::access::{profile_from_query, ProfileQuery};
use crate::services::cta;
use crate::services::decay;
use crate::services::orbit::{self, OrbitState};
use crate::state::AppState;
use crate::time::now_ms;

/// Merged at the top level; these sit directly under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/galaxy", get(galaxy))
        .route("/api/cta", get(smart_cta))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GalaxyNode {
    id: String,
    title: String,
    #[serde(serialize_with = "orbit::serialize_code")]
    orbit_state: OrbitState,
    mastery_score: f64,
    #[serde(serialize_with = "crate::time::serialize_ms_opt")]
    next_review_date: Option<i64>,
}

impl From<StudyTopic> for GalaxyNode {
    fn from(topic: StudyTopic) -> Self {
        Self {
            id: topic.id,
            title: topic.title,
            orbit_state: topic.orbit_state,
            mastery_score: topic.mastery_score,
            next_review_date: topic.next_review_date,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GalaxyResponse {
    nodes: Vec<GalaxyNode>,
    edges: Vec<TopicEdge>,
    decayed: usize,
}

/// Runs lazy decay first so ghosts render on the same load that lapsed them.
async fn galaxy(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(&state, &user, &query).await?;
    let decayed = decay::run_lazy_decay(state.db(), &profile.id, now_ms()).await?;

    let nodes = topics::list_topics(state.db(), &profile.id, None)
        .await?
        .into_iter()
        .map(GalaxyNode::from)
        .collect();
    let edges = topics::list_edges(state.db(), &profile.id).await?;

    Ok(ok(GalaxyResponse {
        nodes,
        edges,
        decayed: decayed.len(),
    }))
}

async fn smart_cta(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(&state, &user, &query).await?;
    let cta = cta::calculate_smart_cta(state.db(), &profile.id, now_ms()).await?;
    Ok(ok(cta))
}
