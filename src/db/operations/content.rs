//! Document chunks and clips: user-owned raw material.

use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::{Any, Row, Transaction};
use uuid::Uuid;

use crate::db::{flag, flag_value, DatabaseProxy};
use crate::time::now_ms;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub id: String,
    pub user_id: String,
    pub profile_id: Option<String>,
    pub filename: String,
    pub chunk_index: i64,
    pub content: String,
    pub active: bool,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

/// One row per filename for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub filename: String,
    pub chunk_count: i64,
    pub active_chunks: i64,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRecord {
    pub id: String,
    pub user_id: String,
    pub profile_id: Option<String>,
    pub content: String,
    pub source_url: Option<String>,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

/// Removes the caller's chunks for `filename` so a re-upload replaces the
/// document instead of interleaving with it.
pub async fn delete_chunks_tx(
    tx: &mut Transaction<'_, Any>,
    user_id: &str,
    filename: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE user_id = $1 AND filename = $2")
        .bind(user_id)
        .bind(filename)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_chunks_tx(
    tx: &mut Transaction<'_, Any>,
    user_id: &str,
    profile_id: Option<&str>,
    filename: &str,
    chunks: &[String],
) -> Result<Vec<DocumentChunk>, sqlx::Error> {
    let now = now_ms();
    let mut stored = Vec::with_capacity(chunks.len());

    for (index, content) in chunks.iter().enumerate() {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO documents
              (id, user_id, profile_id, filename, chunk_index, content, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(profile_id)
        .bind(filename)
        .bind(index as i64)
        .bind(content.as_str())
        .bind(flag_value(true))
        .bind(now)
        .execute(&mut **tx)
        .await?;

        stored.push(DocumentChunk {
            id,
            user_id: user_id.to_string(),
            profile_id: profile_id.map(str::to_string),
            filename: filename.to_string(),
            chunk_index: index as i64,
            content: content.clone(),
            active: true,
            created_at: now,
        });
    }

    Ok(stored)
}

pub async fn list_documents(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<DocumentSummary>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT filename,
               COUNT(*) AS chunk_count,
               CAST(SUM(active) AS BIGINT) AS active_chunks,
               MIN(created_at) AS created_at
        FROM documents
        WHERE user_id = $1
        GROUP BY filename
        ORDER BY MIN(created_at) DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            Ok(DocumentSummary {
                filename: row.try_get("filename")?,
                chunk_count: row.try_get("chunk_count")?,
                active_chunks: row.try_get::<Option<i64>, _>("active_chunks")?.unwrap_or(0),
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn list_chunks(
    proxy: &DatabaseProxy,
    user_id: &str,
    filename: &str,
) -> Result<Vec<DocumentChunk>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, user_id, profile_id, filename, chunk_index, content, active, created_at \
         FROM documents WHERE user_id = $1 AND filename = $2 ORDER BY chunk_index ASC",
    )
    .bind(user_id)
    .bind(filename)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_chunk_row).collect()
}

pub async fn chunk_ids(
    proxy: &DatabaseProxy,
    user_id: &str,
    filename: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id FROM documents WHERE user_id = $1 AND filename = $2 ORDER BY chunk_index ASC",
    )
    .bind(user_id)
    .bind(filename)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(|row| row.try_get("id")).collect()
}

/// Single-row update; the owner predicate keeps it scoped to the caller.
pub async fn set_chunk_active(
    proxy: &DatabaseProxy,
    user_id: &str,
    chunk_id: &str,
    active: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE documents SET active = $1, updated_at = $2 WHERE id = $3 AND user_id = $4",
    )
    .bind(flag_value(active))
    .bind(now_ms())
    .bind(chunk_id)
    .bind(user_id)
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_document(
    proxy: &DatabaseProxy,
    user_id: &str,
    filename: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE user_id = $1 AND filename = $2")
        .bind(user_id)
        .bind(filename)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_clip(
    proxy: &DatabaseProxy,
    user_id: &str,
    profile_id: Option<&str>,
    content: &str,
    source_url: Option<&str>,
) -> Result<ClipRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO clips (id, user_id, profile_id, content, source_url, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(profile_id)
    .bind(content)
    .bind(source_url)
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(ClipRecord {
        id,
        user_id: user_id.to_string(),
        profile_id: profile_id.map(str::to_string),
        content: content.to_string(),
        source_url: source_url.map(str::to_string),
        created_at: now,
    })
}

pub async fn list_clips(
    proxy: &DatabaseProxy,
    user_id: &str,
    profile_id: Option<&str>,
) -> Result<Vec<ClipRecord>, sqlx::Error> {
    let rows = match profile_id {
        Some(profile_id) => {
            sqlx::query(
                "SELECT id, user_id, profile_id, content, source_url, created_at FROM clips \
                 WHERE user_id = $1 AND profile_id = $2 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .bind(profile_id)
            .fetch_all(proxy.pool())
            .await?
        }
        None => {
            sqlx::query(
                "SELECT id, user_id, profile_id, content, source_url, created_at FROM clips \
                 WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(proxy.pool())
            .await?
        }
    };

    rows.iter()
        .map(|row| {
            Ok(ClipRecord {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                profile_id: row.try_get("profile_id")?,
                content: row.try_get("content")?,
                source_url: row.try_get("source_url")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn delete_clip(
    proxy: &DatabaseProxy,
    user_id: &str,
    clip_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM clips WHERE id = $1 AND user_id = $2")
        .bind(clip_id)
        .bind(user_id)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

fn map_chunk_row(row: &AnyRow) -> Result<DocumentChunk, sqlx::Error> {
    Ok(DocumentChunk {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        profile_id: row.try_get("profile_id")?,
        filename: row.try_get("filename")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        active: flag(row, "active")?,
        created_at: row.try_get("created_at")?,
    })
}
