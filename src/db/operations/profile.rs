use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::time::now_ms;

/// Tables keyed by `profile_id`, removed together with the profile.
const PROFILE_SCOPED_TABLES: [&str; 9] = [
    "study_topics",
    "topic_edges",
    "homework_tasks",
    "homework_plans",
    "exercises",
    "proof_events",
    "exam_sheets",
    "practice_sets",
    "study_maps",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: String,
    pub owner_id: String,
    pub display_name: String,
    pub grade_level: Option<String>,
    pub avatar: Option<String>,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub created_at: i64,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub grade_level: Option<String>,
    pub avatar: Option<String>,
}

const PROFILE_COLUMNS: &str =
    "id, owner_id, display_name, grade_level, avatar, created_at, updated_at";

pub async fn find_profile(
    proxy: &DatabaseProxy,
    profile_id: &str,
) -> Result<Option<StudentProfile>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PROFILE_COLUMNS} FROM student_profiles WHERE id = $1"
    ))
    .bind(profile_id)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_profile_row).transpose()
}

pub async fn list_profiles(
    proxy: &DatabaseProxy,
    owner_id: &str,
) -> Result<Vec<StudentProfile>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {PROFILE_COLUMNS} FROM student_profiles WHERE owner_id = $1 ORDER BY created_at ASC"
    ))
    .bind(owner_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_profile_row).collect()
}

/// Every profile id, for sweeps that are not scoped to one owner.
pub async fn list_all_profile_ids(proxy: &DatabaseProxy) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query("SELECT id FROM student_profiles ORDER BY created_at ASC")
        .fetch_all(proxy.pool())
        .await?;
    rows.iter().map(|row| row.try_get("id")).collect()
}

pub async fn insert_profile(
    proxy: &DatabaseProxy,
    owner_id: &str,
    display_name: &str,
    grade_level: Option<&str>,
    avatar: Option<&str>,
) -> Result<StudentProfile, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO student_profiles (id, owner_id, display_name, grade_level, avatar, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(&id)
    .bind(owner_id)
    .bind(display_name)
    .bind(grade_level)
    .bind(avatar)
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(StudentProfile {
        id,
        owner_id: owner_id.to_string(),
        display_name: display_name.to_string(),
        grade_level: grade_level.map(str::to_string),
        avatar: avatar.map(str::to_string),
        created_at: now,
        updated_at: now,
    })
}

pub async fn update_profile(
    proxy: &DatabaseProxy,
    current: &StudentProfile,
    changes: ProfileChanges,
) -> Result<StudentProfile, sqlx::Error> {
    let now = now_ms();
    let updated = StudentProfile {
        display_name: changes
            .display_name
            .unwrap_or_else(|| current.display_name.clone()),
        grade_level: changes.grade_level.or_else(|| current.grade_level.clone()),
        avatar: changes.avatar.or_else(|| current.avatar.clone()),
        updated_at: now,
        ..current.clone()
    };

    sqlx::query(
        r#"
        UPDATE student_profiles
        SET display_name = $1, grade_level = $2, avatar = $3, updated_at = $4
        WHERE id = $5 AND owner_id = $6
        "#,
    )
    .bind(&updated.display_name)
    .bind(updated.grade_level.as_deref())
    .bind(updated.avatar.as_deref())
    .bind(now)
    .bind(&updated.id)
    .bind(&updated.owner_id)
    .execute(proxy.pool())
    .await?;

    Ok(updated)
}

/// Deletes the profile and every row scoped to it in one transaction.
pub async fn delete_profile(
    proxy: &DatabaseProxy,
    owner_id: &str,
    profile_id: &str,
) -> Result<bool, sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;

    for table in PROFILE_SCOPED_TABLES {
        sqlx::query(&format!("DELETE FROM {table} WHERE profile_id = $1"))
            .bind(profile_id)
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query("DELETE FROM student_profiles WHERE id = $1 AND owner_id = $2")
        .bind(profile_id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

fn map_profile_row(row: &AnyRow) -> Result<StudentProfile, sqlx::Error> {
    Ok(StudentProfile {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        display_name: row.try_get("display_name")?,
        grade_level: row.try_get("grade_level")?,
        avatar: row.try_get("avatar")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
