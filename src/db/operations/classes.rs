use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub subject: Option<String>,
    pub teacher_name: Option<String>,
    pub color: Option<String>,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ClassFields {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub teacher_name: Option<String>,
    pub color: Option<String>,
}

const CLASS_COLUMNS: &str =
    "id, user_id, name, subject, teacher_name, color, created_at, updated_at";

pub async fn list_classes(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<ClassRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {CLASS_COLUMNS} FROM classes WHERE user_id = $1 ORDER BY name ASC"
    ))
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_class_row).collect()
}

pub async fn find_class(
    proxy: &DatabaseProxy,
    class_id: &str,
) -> Result<Option<ClassRecord>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"))
        .bind(class_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_class_row).transpose()
}

pub async fn insert_class(
    proxy: &DatabaseProxy,
    user_id: &str,
    name: &str,
    fields: ClassFields,
) -> Result<ClassRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO classes (id, user_id, name, subject, teacher_name, color, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(name)
    .bind(fields.subject.as_deref())
    .bind(fields.teacher_name.as_deref())
    .bind(fields.color.as_deref())
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(ClassRecord {
        id,
        user_id: user_id.to_string(),
        name: name.to_string(),
        subject: fields.subject,
        teacher_name: fields.teacher_name,
        color: fields.color,
        created_at: now,
        updated_at: now,
    })
}

pub async fn update_class(
    proxy: &DatabaseProxy,
    current: &ClassRecord,
    fields: ClassFields,
) -> Result<ClassRecord, sqlx::Error> {
    let updated = ClassRecord {
        name: fields.name.unwrap_or_else(|| current.name.clone()),
        subject: fields.subject.or_else(|| current.subject.clone()),
        teacher_name: fields.teacher_name.or_else(|| current.teacher_name.clone()),
        color: fields.color.or_else(|| current.color.clone()),
        updated_at: now_ms(),
        ..current.clone()
    };

    sqlx::query(
        r#"
        UPDATE classes SET name = $1, subject = $2, teacher_name = $3, color = $4, updated_at = $5
        WHERE id = $6 AND user_id = $7
        "#,
    )
    .bind(&updated.name)
    .bind(updated.subject.as_deref())
    .bind(updated.teacher_name.as_deref())
    .bind(updated.color.as_deref())
    .bind(updated.updated_at)
    .bind(&updated.id)
    .bind(&updated.user_id)
    .execute(proxy.pool())
    .await?;

    Ok(updated)
}

/// Removes the class and detaches it from homework that referenced it.
pub async fn delete_class(proxy: &DatabaseProxy, class: &ClassRecord) -> Result<(), sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;
    sqlx::query("UPDATE homework_tasks SET class_id = NULL WHERE class_id = $1")
        .bind(&class.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM classes WHERE id = $1 AND user_id = $2")
        .bind(&class.id)
        .bind(&class.user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

fn map_class_row(row: &AnyRow) -> Result<ClassRecord, sqlx::Error> {
    Ok(ClassRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        subject: row.try_get("subject")?,
        teacher_name: row.try_get("teacher_name")?,
        color: row.try_get("color")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
