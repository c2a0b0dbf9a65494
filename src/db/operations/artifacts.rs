//! LLM-generated study artifacts. The three kinds share one row shape and
//! live in separate tables.

use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    ExamSheet,
    PracticeLadder,
    ConfusionMap,
}

impl ArtifactKind {
    /// Path segment used by `/api/artifacts/:kind`.
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "exam-sheets" => Some(Self::ExamSheet),
            "practice-ladders" => Some(Self::PracticeLadder),
            "confusion-maps" => Some(Self::ConfusionMap),
            _ => None,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::ExamSheet => "exam_sheets",
            Self::PracticeLadder => "practice_sets",
            Self::ConfusionMap => "study_maps",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ExamSheet => "exam sheet",
            Self::PracticeLadder => "practice ladder",
            Self::ConfusionMap => "confusion map",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub id: String,
    pub kind: ArtifactKind,
    pub profile_id: String,
    pub topic_id: Option<String>,
    pub title: String,
    pub content: serde_json::Value,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

pub async fn insert_artifact(
    proxy: &DatabaseProxy,
    kind: ArtifactKind,
    profile_id: &str,
    topic_id: Option<&str>,
    title: &str,
    content: serde_json::Value,
) -> Result<ArtifactRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(&format!(
        "INSERT INTO {} (id, profile_id, topic_id, title, content, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
        kind.table()
    ))
    .bind(&id)
    .bind(profile_id)
    .bind(topic_id)
    .bind(title)
    .bind(content.to_string())
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(ArtifactRecord {
        id,
        kind,
        profile_id: profile_id.to_string(),
        topic_id: topic_id.map(str::to_string),
        title: title.to_string(),
        content,
        created_at: now,
    })
}

pub async fn find_artifact(
    proxy: &DatabaseProxy,
    kind: ArtifactKind,
    artifact_id: &str,
) -> Result<Option<ArtifactRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT id, profile_id, topic_id, title, content, created_at FROM {} WHERE id = $1",
        kind.table()
    ))
    .bind(artifact_id)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(|row| map_artifact_row(kind, row)).transpose()
}

pub async fn list_artifacts(
    proxy: &DatabaseProxy,
    kind: ArtifactKind,
    profile_id: &str,
) -> Result<Vec<ArtifactRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT id, profile_id, topic_id, title, content, created_at FROM {} \
         WHERE profile_id = $1 ORDER BY created_at DESC",
        kind.table()
    ))
    .bind(profile_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(|row| map_artifact_row(kind, row)).collect()
}

pub async fn delete_artifact(
    proxy: &DatabaseProxy,
    artifact: &ArtifactRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "DELETE FROM {} WHERE id = $1 AND profile_id = $2",
        artifact.kind.table()
    ))
    .bind(&artifact.id)
    .bind(&artifact.profile_id)
    .execute(proxy.pool())
    .await?;
    Ok(())
}

fn map_artifact_row(kind: ArtifactKind, row: &AnyRow) -> Result<ArtifactRecord, sqlx::Error> {
    let raw: String = row.try_get("content")?;
    Ok(ArtifactRecord {
        id: row.try_get("id")?,
        kind,
        profile_id: row.try_get("profile_id")?,
        topic_id: row.try_get("topic_id")?,
        title: row.try_get("title")?,
        content: serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)),
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_map_to_tables() {
        assert_eq!(
            ArtifactKind::from_path("exam-sheets").map(ArtifactKind::table),
            Some("exam_sheets")
        );
        assert_eq!(
            ArtifactKind::from_path("practice-ladders").map(ArtifactKind::table),
            Some("practice_sets")
        );
        assert_eq!(
            ArtifactKind::from_path("confusion-maps").map(ArtifactKind::table),
            Some("study_maps")
        );
        assert_eq!(ArtifactKind::from_path("homework"), None);
    }
}
