use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub expires_at: i64,
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub display_name: &'a str,
    pub role: &'a str,
}

const USER_COLUMNS: &str = "id, email, password_hash, display_name, role, created_at";

pub async fn find_user_by_id(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Option<UserRecord>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_user_row).transpose()
}

pub async fn find_user_by_email(
    proxy: &DatabaseProxy,
    email: &str,
) -> Result<Option<UserRecord>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_user_row).transpose()
}

pub async fn insert_user(
    proxy: &DatabaseProxy,
    input: NewUser<'_>,
) -> Result<UserRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, display_name, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(&id)
    .bind(input.email)
    .bind(input.password_hash)
    .bind(input.display_name)
    .bind(input.role)
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(UserRecord {
        id,
        email: input.email.to_string(),
        password_hash: input.password_hash.to_string(),
        display_name: input.display_name.to_string(),
        role: input.role.to_string(),
        created_at: now,
    })
}

pub async fn insert_session(
    proxy: &DatabaseProxy,
    user_id: &str,
    token_hash: &str,
    expires_at: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(now_ms())
    .execute(proxy.pool())
    .await?;
    Ok(())
}

pub async fn find_session(
    proxy: &DatabaseProxy,
    token_hash: &str,
) -> Result<Option<SessionRecord>, sqlx::Error> {
    let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token_hash = $1")
        .bind(token_hash)
        .fetch_optional(proxy.pool())
        .await?;

    row.map(|row| {
        Ok(SessionRecord {
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
        })
    })
    .transpose()
}

pub async fn delete_session(proxy: &DatabaseProxy, token_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
        .bind(token_hash)
        .execute(proxy.pool())
        .await?;
    Ok(())
}

pub async fn delete_expired_sessions(proxy: &DatabaseProxy, now: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
        .bind(now)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected())
}

fn map_user_row(row: &AnyRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        display_name: row.try_get("display_name")?,
        role: row.try_get("role")?,
        created_at: row.try_get("created_at")?,
    })
}
