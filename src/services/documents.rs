//! Document ingestion and per-file activation.

use futures::future::join_all;
use serde::Serialize;

use crate::db::operations::content::{self, DocumentChunk};
use crate::db::operations::topics::{self, StudyTopic, TopicSource};
use crate::db::DatabaseProxy;

pub const MAX_CHUNK_CHARS: usize = 1200;

/// One file to store. `topic_title` names the quarantined topic created
/// when a profile is given.
#[derive(Debug, Clone, Copy)]
pub struct NewDocument<'a> {
    pub profile_id: Option<&'a str>,
    pub filename: &'a str,
    pub topic_title: &'a str,
    pub text: &'a str,
    pub source: TopicSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedDocument {
    pub filename: String,
    pub chunks: Vec<DocumentChunk>,
    /// Chunks of an earlier upload under the same filename that were replaced.
    pub replaced_chunks: u64,
    pub topic: Option<StudyTopic>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleReport {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
}

impl ToggleReport {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

/// Splits text on blank lines and packs paragraphs into chunks of at most
/// `MAX_CHUNK_CHARS` characters. Paragraphs longer than the limit are cut
/// on char boundaries.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        for piece in split_long(paragraph) {
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 2 + piece.chars().count()
            };
            if needed > MAX_CHUNK_CHARS && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long(paragraph: &str) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    chars
        .chunks(MAX_CHUNK_CHARS)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Stores the chunks of one file in a single transaction. A re-upload of
/// the same filename replaces the caller's earlier chunks and keeps the
/// topic created the first time, so only a first upload quarantines a topic.
pub async fn ingest(
    proxy: &DatabaseProxy,
    user_id: &str,
    document: NewDocument<'_>,
) -> Result<IngestedDocument, sqlx::Error> {
    let pieces = chunk_text(document.text);
    let mut tx = proxy.pool().begin().await?;

    let replaced_chunks = content::delete_chunks_tx(&mut tx, user_id, document.filename).await?;
    let chunks = content::insert_chunks_tx(
        &mut tx,
        user_id,
        document.profile_id,
        document.filename,
        &pieces,
    )
    .await?;

    let topic = match document.profile_id {
        Some(profile_id) if replaced_chunks == 0 => Some(
            topics::insert_topic_tx(&mut tx, profile_id, document.topic_title, document.source)
                .await?,
        ),
        _ => None,
    };

    tx.commit().await?;

    tracing::info!(
        user_id,
        filename = document.filename,
        chunks = chunks.len(),
        replaced_chunks,
        "document ingested"
    );
    Ok(IngestedDocument {
        filename: document.filename.to_string(),
        chunks,
        replaced_chunks,
        topic,
    })
}

/// Sets the active flag on every chunk of `filename` owned by `user_id`.
/// Updates run concurrently and are not rolled back when some fail.
pub async fn set_document_active(
    proxy: &DatabaseProxy,
    user_id: &str,
    filename: &str,
    active: bool,
) -> Result<ToggleReport, sqlx::Error> {
    let ids = content::chunk_ids(proxy, user_id, filename).await?;

    let results = join_all(
        ids.iter()
            .map(|chunk_id| content::set_chunk_active(proxy, user_id, chunk_id, active)),
    )
    .await;

    let mut report = ToggleReport {
        total: ids.len(),
        ..ToggleReport::default()
    };
    for (chunk_id, result) in ids.iter().zip(results) {
        match result {
            Ok(true) => report.updated += 1,
            Ok(false) => report.failed += 1,
            Err(err) => {
                tracing::warn!(chunk_id = %chunk_id, error = %err, "chunk toggle failed");
                report.failed += 1;
            }
        }
    }

    if report.is_partial() {
        tracing::error!(
            filename,
            updated = report.updated,
            failed = report.failed,
            "partial document toggle"
        );
    }
    Ok(report)
}

/// "unit-3_fractions.pdf" -> "unit-3 fractions".
pub fn topic_title(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    let title = stem.replace('_', " ");
    let title = title.trim();
    if title.is_empty() {
        filename.to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("First.\n\nSecond."), vec!["First.\n\nSecond.".to_string()]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("  \n\n  ").is_empty());
    }

    #[test]
    fn chunks_respect_limit_and_paragraphs() {
        let paragraph = "a".repeat(700);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let chunks = chunk_text(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
    }

    #[test]
    fn oversized_paragraph_is_split() {
        let text = "é".repeat(MAX_CHUNK_CHARS * 2 + 10);
        let chunks = chunk_text(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
    }

    #[test]
    fn titles_drop_extension() {
        assert_eq!(topic_title("unit-3_fractions.pdf"), "unit-3 fractions");
        assert_eq!(topic_title("notes"), "notes");
        assert_eq!(topic_title(".env"), ".env");
    }
}
