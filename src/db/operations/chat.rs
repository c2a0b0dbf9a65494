use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    pub user_id: String,
    pub profile_id: Option<String>,
    pub title: String,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

const CHAT_COLUMNS: &str = "id, user_id, profile_id, title, created_at, updated_at";

pub async fn insert_chat(
    proxy: &DatabaseProxy,
    user_id: &str,
    profile_id: Option<&str>,
    title: &str,
) -> Result<ChatRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO chats (id, user_id, profile_id, title, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(profile_id)
    .bind(title)
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(ChatRecord {
        id,
        user_id: user_id.to_string(),
        profile_id: profile_id.map(str::to_string),
        title: title.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_chat(
    proxy: &DatabaseProxy,
    chat_id: &str,
) -> Result<Option<ChatRecord>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"))
        .bind(chat_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_chat_row).transpose()
}

pub async fn list_chats(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<ChatRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE user_id = $1 ORDER BY updated_at DESC"
    ))
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_chat_row).collect()
}

pub async fn delete_chat(proxy: &DatabaseProxy, chat: &ChatRecord) -> Result<(), sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;
    sqlx::query("DELETE FROM messages WHERE chat_id = $1")
        .bind(&chat.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chats WHERE id = $1 AND user_id = $2")
        .bind(&chat.id)
        .bind(&chat.user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

pub async fn list_messages(
    proxy: &DatabaseProxy,
    chat_id: &str,
) -> Result<Vec<MessageRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, chat_id, role, content, created_at FROM messages \
         WHERE chat_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(chat_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_message_row).collect()
}

/// Appends a message and bumps the chat's `updated_at`.
pub async fn insert_message(
    proxy: &DatabaseProxy,
    chat_id: &str,
    role: &str,
    content: &str,
) -> Result<MessageRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    let mut tx = proxy.pool().begin().await?;
    sqlx::query(
        "INSERT INTO messages (id, chat_id, role, content, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&id)
    .bind(chat_id)
    .bind(role)
    .bind(content)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE chats SET updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(MessageRecord {
        id,
        chat_id: chat_id.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        created_at: now,
    })
}

fn map_chat_row(row: &AnyRow) -> Result<ChatRecord, sqlx::Error> {
    Ok(ChatRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        profile_id: row.try_get("profile_id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_message_row(row: &AnyRow) -> Result<MessageRecord, sqlx::Error> {
    Ok(MessageRecord {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        role: row.try_get("role")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}
