use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::operations::proof;
use crate::response::{ok, AppError};
use crate::routes::access::{profile_from_query, ProfileQuery};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProofQuery {
    profile_id: Option<String>,
    limit: Option<i64>,
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ProofQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(
        &state,
        &user,
        &ProfileQuery {
            profile_id: query.profile_id,
        },
    )
    .await?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(ok(proof::list_proof_events(state.db(), &profile.id, limit).await?))
}
