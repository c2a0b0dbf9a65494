use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::{Any, Row, Transaction};
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::services::orbit::{self, OrbitState, ReviewOutcome, Schedule};
use crate::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicSource {
    Upload,
    Email,
    Chat,
    Manual,
}

impl TopicSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Email => "email",
            Self::Chat => "chat",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyTopic {
    pub id: String,
    pub profile_id: String,
    pub title: String,
    pub source: String,
    pub mastery_score: f64,
    #[serde(serialize_with = "orbit::serialize_code")]
    pub orbit_state: OrbitState,
    #[serde(serialize_with = "crate::time::serialize_ms_opt")]
    pub next_review_date: Option<i64>,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub updated_at: i64,
}

impl StudyTopic {
    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval_days: self.interval_days,
            ease_factor: self.ease_factor,
            repetitions: self.repetitions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicEdge {
    pub id: String,
    pub profile_id: String,
    pub from_topic_id: String,
    pub to_topic_id: String,
    pub relation: String,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

const TOPIC_COLUMNS: &str = "id, profile_id, title, source, mastery_score, orbit_state, \
     next_review_date, interval_days, ease_factor, repetitions, created_at, updated_at";

/// Every new topic starts quarantined.
pub async fn insert_topic(
    proxy: &DatabaseProxy,
    profile_id: &str,
    title: &str,
    source: TopicSource,
) -> Result<StudyTopic, sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;
    let topic = insert_topic_tx(&mut tx, profile_id, title, source).await?;
    tx.commit().await?;
    Ok(topic)
}

pub async fn insert_topic_tx(
    tx: &mut Transaction<'_, Any>,
    profile_id: &str,
    title: &str,
    source: TopicSource,
) -> Result<StudyTopic, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    let schedule = Schedule::default();
    sqlx::query(
        r#"
        INSERT INTO study_topics
          (id, profile_id, title, source, mastery_score, orbit_state, next_review_date,
           interval_days, ease_factor, repetitions, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NULL, $7, $8, $9, $10, $10)
        "#,
    )
    .bind(&id)
    .bind(profile_id)
    .bind(title)
    .bind(source.as_str())
    .bind(0.0_f64)
    .bind(OrbitState::Quarantined.code())
    .bind(schedule.interval_days)
    .bind(schedule.ease_factor)
    .bind(schedule.repetitions)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(StudyTopic {
        id,
        profile_id: profile_id.to_string(),
        title: title.to_string(),
        source: source.as_str().to_string(),
        mastery_score: 0.0,
        orbit_state: OrbitState::Quarantined,
        next_review_date: None,
        interval_days: schedule.interval_days,
        ease_factor: schedule.ease_factor,
        repetitions: schedule.repetitions,
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_topic(
    proxy: &DatabaseProxy,
    topic_id: &str,
) -> Result<Option<StudyTopic>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {TOPIC_COLUMNS} FROM study_topics WHERE id = $1"))
        .bind(topic_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_topic_row).transpose()
}

pub async fn list_topics(
    proxy: &DatabaseProxy,
    profile_id: &str,
    state: Option<OrbitState>,
) -> Result<Vec<StudyTopic>, sqlx::Error> {
    let rows = match state {
        Some(state) => {
            sqlx::query(&format!(
                "SELECT {TOPIC_COLUMNS} FROM study_topics \
                 WHERE profile_id = $1 AND orbit_state = $2 ORDER BY created_at ASC"
            ))
            .bind(profile_id)
            .bind(state.code())
            .fetch_all(proxy.pool())
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {TOPIC_COLUMNS} FROM study_topics WHERE profile_id = $1 ORDER BY created_at ASC"
            ))
            .bind(profile_id)
            .fetch_all(proxy.pool())
            .await?
        }
    };
    rows.iter().map(map_topic_row).collect()
}

pub async fn delete_topic(proxy: &DatabaseProxy, topic: &StudyTopic) -> Result<(), sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;
    sqlx::query(
        "DELETE FROM topic_edges WHERE profile_id = $1 AND (from_topic_id = $2 OR to_topic_id = $2)",
    )
    .bind(&topic.profile_id)
    .bind(&topic.id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM study_topics WHERE id = $1 AND profile_id = $2")
        .bind(&topic.id)
        .bind(&topic.profile_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

/// Quarantined → Active. Returns false when the row was no longer quarantined.
pub async fn mark_released(proxy: &DatabaseProxy, topic_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE study_topics SET orbit_state = $1, updated_at = $2 WHERE id = $3 AND orbit_state = $4",
    )
    .bind(OrbitState::Active.code())
    .bind(now_ms())
    .bind(topic_id)
    .bind(OrbitState::Quarantined.code())
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Writes a review outcome only if the topic is still in `expected`. Returns
/// false when a concurrent decay, review or delete got there first.
pub async fn save_review(
    proxy: &DatabaseProxy,
    topic_id: &str,
    expected: OrbitState,
    outcome: &ReviewOutcome,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE study_topics
        SET mastery_score = $1, orbit_state = $2, next_review_date = $3,
            interval_days = $4, ease_factor = $5, repetitions = $6, updated_at = $7
        WHERE id = $8 AND orbit_state = $9
        "#,
    )
    .bind(outcome.mastery_score)
    .bind(outcome.state.code())
    .bind(outcome.next_review_date)
    .bind(outcome.schedule.interval_days)
    .bind(outcome.schedule.ease_factor)
    .bind(outcome.schedule.repetitions)
    .bind(now)
    .bind(topic_id)
    .bind(expected.code())
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Moves the given Mastered topics to Ghost inside one transaction. The
/// state guard keeps a concurrent review from being overwritten.
pub async fn mark_ghosts(
    proxy: &DatabaseProxy,
    profile_id: &str,
    topic_ids: &[String],
) -> Result<u64, sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;
    let mut updated = 0;
    for topic_id in topic_ids {
        let result = sqlx::query(
            "UPDATE study_topics SET orbit_state = $1 WHERE id = $2 AND profile_id = $3 AND orbit_state = $4",
        )
        .bind(OrbitState::Ghost.code())
        .bind(topic_id)
        .bind(profile_id)
        .bind(OrbitState::Mastered.code())
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

/// Mastered topics whose review date is at or before `now`.
pub async fn list_lapsed(
    proxy: &DatabaseProxy,
    profile_id: &str,
    now: i64,
) -> Result<Vec<StudyTopic>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {TOPIC_COLUMNS} FROM study_topics \
         WHERE profile_id = $1 AND orbit_state = $2 \
         AND next_review_date IS NOT NULL AND next_review_date <= $3 \
         ORDER BY next_review_date ASC"
    ))
    .bind(profile_id)
    .bind(OrbitState::Mastered.code())
    .bind(now)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_topic_row).collect()
}

/// Ghost topics, most overdue first.
pub async fn list_ghosts(
    proxy: &DatabaseProxy,
    profile_id: &str,
    limit: i64,
) -> Result<Vec<StudyTopic>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {TOPIC_COLUMNS} FROM study_topics \
         WHERE profile_id = $1 AND orbit_state = $2 \
         ORDER BY next_review_date ASC, created_at ASC LIMIT $3"
    ))
    .bind(profile_id)
    .bind(OrbitState::Ghost.code())
    .bind(limit)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_topic_row).collect()
}

pub async fn first_quarantined(
    proxy: &DatabaseProxy,
    profile_id: &str,
) -> Result<Option<StudyTopic>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TOPIC_COLUMNS} FROM study_topics \
         WHERE profile_id = $1 AND orbit_state = $2 \
         ORDER BY created_at ASC LIMIT 1"
    ))
    .bind(profile_id)
    .bind(OrbitState::Quarantined.code())
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_topic_row).transpose()
}

pub async fn weakest_below(
    proxy: &DatabaseProxy,
    profile_id: &str,
    mastery_floor: f64,
) -> Result<Option<StudyTopic>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TOPIC_COLUMNS} FROM study_topics \
         WHERE profile_id = $1 AND orbit_state >= $2 AND mastery_score < $3 \
         ORDER BY mastery_score ASC, created_at ASC LIMIT 1"
    ))
    .bind(profile_id)
    .bind(OrbitState::Active.code())
    .bind(mastery_floor)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_topic_row).transpose()
}

pub async fn stalest_since(
    proxy: &DatabaseProxy,
    profile_id: &str,
    mastery_floor: f64,
    updated_before: i64,
) -> Result<Option<StudyTopic>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TOPIC_COLUMNS} FROM study_topics \
         WHERE profile_id = $1 AND orbit_state >= $2 AND mastery_score >= $3 AND updated_at <= $4 \
         ORDER BY updated_at ASC LIMIT 1"
    ))
    .bind(profile_id)
    .bind(OrbitState::Active.code())
    .bind(mastery_floor)
    .bind(updated_before)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_topic_row).transpose()
}

pub async fn insert_edge(
    proxy: &DatabaseProxy,
    profile_id: &str,
    from_topic_id: &str,
    to_topic_id: &str,
    relation: &str,
) -> Result<TopicEdge, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO topic_edges (id, profile_id, from_topic_id, to_topic_id, relation, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&id)
    .bind(profile_id)
    .bind(from_topic_id)
    .bind(to_topic_id)
    .bind(relation)
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(TopicEdge {
        id,
        profile_id: profile_id.to_string(),
        from_topic_id: from_topic_id.to_string(),
        to_topic_id: to_topic_id.to_string(),
        relation: relation.to_string(),
        created_at: now,
    })
}

pub async fn find_edge(
    proxy: &DatabaseProxy,
    edge_id: &str,
) -> Result<Option<TopicEdge>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, profile_id, from_topic_id, to_topic_id, relation, created_at FROM topic_edges WHERE id = $1",
    )
    .bind(edge_id)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_edge_row).transpose()
}

pub async fn list_edges(
    proxy: &DatabaseProxy,
    profile_id: &str,
) -> Result<Vec<TopicEdge>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, profile_id, from_topic_id, to_topic_id, relation, created_at \
         FROM topic_edges WHERE profile_id = $1 ORDER BY created_at ASC",
    )
    .bind(profile_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_edge_row).collect()
}

pub async fn delete_edge(proxy: &DatabaseProxy, edge_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM topic_edges WHERE id = $1")
        .bind(edge_id)
        .execute(proxy.pool())
        .await?;
    Ok(())
}

fn map_topic_row(row: &AnyRow) -> Result<StudyTopic, sqlx::Error> {
    let code: i64 = row.try_get("orbit_state")?;
    let orbit_state = OrbitState::from_code(code)
        .ok_or_else(|| sqlx::Error::Decode(format!("invalid orbit_state {code}").into()))?;

    Ok(StudyTopic {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        title: row.try_get("title")?,
        source: row.try_get("source")?,
        mastery_score: row.try_get("mastery_score")?,
        orbit_state,
        next_review_date: row.try_get("next_review_date")?,
        interval_days: row.try_get("interval_days")?,
        ease_factor: row.try_get("ease_factor")?,
        repetitions: row.try_get("repetitions")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_edge_row(row: &AnyRow) -> Result<TopicEdge, sqlx::Error> {
    Ok(TopicEdge {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        from_topic_id: row.try_get("from_topic_id")?,
        to_topic_id: row.try_get("to_topic_id")?,
        relation: row.try_get("relation")?,
        created_at: row.try_get("created_at")?,
    })
}
