use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

pub const KIND_REVIEW: &str = "review";
pub const KIND_EXERCISE_ATTEMPT: &str = "exercise_attempt";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofEvent {
    pub id: String,
    pub profile_id: String,
    pub topic_id: Option<String>,
    pub kind: String,
    pub score: Option<f64>,
    pub detail: Option<serde_json::Value>,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

pub struct NewProofEvent<'a> {
    pub profile_id: &'a str,
    pub topic_id: Option<&'a str>,
    pub kind: &'a str,
    pub score: Option<f64>,
    pub detail: Option<serde_json::Value>,
}

pub async fn insert_proof_event(
    proxy: &DatabaseProxy,
    event: NewProofEvent<'_>,
) -> Result<ProofEvent, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO proof_events (id, profile_id, topic_id, kind, score, detail, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&id)
    .bind(event.profile_id)
    .bind(event.topic_id)
    .bind(event.kind)
    .bind(event.score)
    .bind(event.detail.as_ref().map(|value| value.to_string()))
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(ProofEvent {
        id,
        profile_id: event.profile_id.to_string(),
        topic_id: event.topic_id.map(str::to_string),
        kind: event.kind.to_string(),
        score: event.score,
        detail: event.detail,
        created_at: now,
    })
}

/// Newest first, capped at `limit`.
pub async fn list_proof_events(
    proxy: &DatabaseProxy,
    profile_id: &str,
    limit: i64,
) -> Result<Vec<ProofEvent>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, profile_id, topic_id, kind, score, detail, created_at FROM proof_events \
         WHERE profile_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(profile_id)
    .bind(limit)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            let detail: Option<String> = row.try_get("detail")?;
            Ok(ProofEvent {
                id: row.try_get("id")?,
                profile_id: row.try_get("profile_id")?,
                topic_id: row.try_get("topic_id")?,
                kind: row.try_get("kind")?,
                score: row.try_get("score")?,
                detail: detail.and_then(|raw| serde_json::from_str(&raw).ok()),
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
