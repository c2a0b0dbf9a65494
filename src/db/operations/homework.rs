use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkTask {
    pub id: String,
    pub profile_id: String,
    pub class_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub due_at: i64,
    pub status: TaskStatus,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkPlan {
    pub id: String,
    pub profile_id: String,
    pub task_id: String,
    pub content: serde_json::Value,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
}

pub struct NewTask<'a> {
    pub profile_id: &'a str,
    pub class_id: Option<&'a str>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub due_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub class_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_at: Option<i64>,
    pub status: Option<TaskStatus>,
}

const TASK_COLUMNS: &str =
    "id, profile_id, class_id, title, description, due_at, status, created_at, updated_at";

pub async fn insert_task(
    proxy: &DatabaseProxy,
    input: NewTask<'_>,
) -> Result<HomeworkTask, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO homework_tasks
          (id, profile_id, class_id, title, description, due_at, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
        "#,
    )
    .bind(&id)
    .bind(input.profile_id)
    .bind(input.class_id)
    .bind(input.title)
    .bind(input.description)
    .bind(input.due_at)
    .bind(TaskStatus::Pending.as_str())
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(HomeworkTask {
        id,
        profile_id: input.profile_id.to_string(),
        class_id: input.class_id.map(str::to_string),
        title: input.title.to_string(),
        description: input.description.map(str::to_string),
        due_at: input.due_at,
        status: TaskStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_task(
    proxy: &DatabaseProxy,
    task_id: &str,
) -> Result<Option<HomeworkTask>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM homework_tasks WHERE id = $1"))
        .bind(task_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_task_row).transpose()
}

pub async fn list_tasks(
    proxy: &DatabaseProxy,
    profile_id: &str,
    include_completed: bool,
) -> Result<Vec<HomeworkTask>, sqlx::Error> {
    let rows = if include_completed {
        sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM homework_tasks WHERE profile_id = $1 ORDER BY due_at ASC"
        ))
        .bind(profile_id)
        .fetch_all(proxy.pool())
        .await?
    } else {
        sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM homework_tasks \
             WHERE profile_id = $1 AND status <> $2 ORDER BY due_at ASC"
        ))
        .bind(profile_id)
        .bind(TaskStatus::Completed.as_str())
        .fetch_all(proxy.pool())
        .await?
    };
    rows.iter().map(map_task_row).collect()
}

/// The open task with the earliest due date at or before `due_before`.
pub async fn earliest_open_due_before(
    proxy: &DatabaseProxy,
    profile_id: &str,
    due_before: i64,
) -> Result<Option<HomeworkTask>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM homework_tasks \
         WHERE profile_id = $1 AND status <> $2 AND due_at <= $3 \
         ORDER BY due_at ASC, created_at ASC LIMIT 1"
    ))
    .bind(profile_id)
    .bind(TaskStatus::Completed.as_str())
    .bind(due_before)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_task_row).transpose()
}

pub async fn update_task(
    proxy: &DatabaseProxy,
    current: &HomeworkTask,
    changes: TaskChanges,
) -> Result<HomeworkTask, sqlx::Error> {
    let updated = HomeworkTask {
        class_id: changes.class_id.or_else(|| current.class_id.clone()),
        title: changes.title.unwrap_or_else(|| current.title.clone()),
        description: changes.description.or_else(|| current.description.clone()),
        due_at: changes.due_at.unwrap_or(current.due_at),
        status: changes.status.unwrap_or(current.status),
        updated_at: now_ms(),
        ..current.clone()
    };

    sqlx::query(
        r#"
        UPDATE homework_tasks
        SET class_id = $1, title = $2, description = $3, due_at = $4, status = $5, updated_at = $6
        WHERE id = $7 AND profile_id = $8
        "#,
    )
    .bind(updated.class_id.as_deref())
    .bind(&updated.title)
    .bind(updated.description.as_deref())
    .bind(updated.due_at)
    .bind(updated.status.as_str())
    .bind(updated.updated_at)
    .bind(&updated.id)
    .bind(&updated.profile_id)
    .execute(proxy.pool())
    .await?;

    Ok(updated)
}

pub async fn delete_task(proxy: &DatabaseProxy, task: &HomeworkTask) -> Result<(), sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;
    sqlx::query("DELETE FROM homework_plans WHERE task_id = $1 AND profile_id = $2")
        .bind(&task.id)
        .bind(&task.profile_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM homework_tasks WHERE id = $1 AND profile_id = $2")
        .bind(&task.id)
        .bind(&task.profile_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

pub async fn insert_plan(
    proxy: &DatabaseProxy,
    task: &HomeworkTask,
    content: &serde_json::Value,
) -> Result<HomeworkPlan, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO homework_plans (id, profile_id, task_id, content, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&id)
    .bind(&task.profile_id)
    .bind(&task.id)
    .bind(content.to_string())
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(HomeworkPlan {
        id,
        profile_id: task.profile_id.clone(),
        task_id: task.id.clone(),
        content: content.clone(),
        created_at: now,
    })
}

pub async fn list_plans(
    proxy: &DatabaseProxy,
    task_id: &str,
) -> Result<Vec<HomeworkPlan>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, profile_id, task_id, content, created_at FROM homework_plans \
         WHERE task_id = $1 ORDER BY created_at DESC",
    )
    .bind(task_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            let raw: String = row.try_get("content")?;
            Ok(HomeworkPlan {
                id: row.try_get("id")?,
                profile_id: row.try_get("profile_id")?,
                task_id: row.try_get("task_id")?,
                content: serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)),
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

fn map_task_row(row: &AnyRow) -> Result<HomeworkTask, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| sqlx::Error::Decode(format!("invalid task status {status}").into()))?;

    Ok(HomeworkTask {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        class_id: row.try_get("class_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        due_at: row.try_get("due_at")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
