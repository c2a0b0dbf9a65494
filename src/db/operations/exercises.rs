use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Spelling,
    Reading,
}

impl ExerciseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spelling => "spelling",
            Self::Reading => "reading",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "spelling" => Some(Self::Spelling),
            "reading" => Some(Self::Reading),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseItem {
    pub prompt: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    pub id: String,
    pub profile_id: String,
    pub kind: ExerciseKind,
    pub title: String,
    pub items: Vec<ExerciseItem>,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

pub async fn insert_exercise(
    proxy: &DatabaseProxy,
    profile_id: &str,
    kind: ExerciseKind,
    title: &str,
    items: Vec<ExerciseItem>,
) -> Result<ExerciseRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    let encoded =
        serde_json::to_string(&items).map_err(|err| sqlx::Error::Encode(Box::new(err)))?;

    sqlx::query(
        r#"
        INSERT INTO exercises (id, profile_id, kind, title, items, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&id)
    .bind(profile_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(encoded)
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(ExerciseRecord {
        id,
        profile_id: profile_id.to_string(),
        kind,
        title: title.to_string(),
        items,
        created_at: now,
    })
}

pub async fn find_exercise(
    proxy: &DatabaseProxy,
    exercise_id: &str,
) -> Result<Option<ExerciseRecord>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, profile_id, kind, title, items, created_at FROM exercises WHERE id = $1",
    )
    .bind(exercise_id)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_exercise_row).transpose()
}

pub async fn list_exercises(
    proxy: &DatabaseProxy,
    profile_id: &str,
) -> Result<Vec<ExerciseRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, profile_id, kind, title, items, created_at FROM exercises \
         WHERE profile_id = $1 ORDER BY created_at DESC",
    )
    .bind(profile_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_exercise_row).collect()
}

pub async fn delete_exercise(
    proxy: &DatabaseProxy,
    exercise: &ExerciseRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exercises WHERE id = $1 AND profile_id = $2")
        .bind(&exercise.id)
        .bind(&exercise.profile_id)
        .execute(proxy.pool())
        .await?;
    Ok(())
}

fn map_exercise_row(row: &AnyRow) -> Result<ExerciseRecord, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let kind = ExerciseKind::parse(&kind)
        .ok_or_else(|| sqlx::Error::Decode(format!("invalid exercise kind {kind}").into()))?;
    let items: String = row.try_get("items")?;
    let items = serde_json::from_str(&items).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

    Ok(ExerciseRecord {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        kind,
        title: row.try_get("title")?,
        items,
        created_at: row.try_get("created_at")?,
    })
}
