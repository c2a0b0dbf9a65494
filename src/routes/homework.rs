use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::operations::homework::{self, HomeworkTask, NewTask, TaskChanges, TaskStatus};
use crate::response::{created, ok, AppError};
use crate::routes::access::{optional, owned_profile, profile_from_query, required, ProfileQuery};
use crate::routes::classes::owned_class;
use crate::services::artifacts;
use crate::state::AppState;
use crate::time::parse_datetime_ms;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", put(update).delete(remove))
        .route("/:id/complete", post(complete))
        .route("/:id/plan", post(generate_plan))
        .route("/:id/plans", get(list_plans))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HomeworkListQuery {
    profile_id: Option<String>,
    include_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    profile_id: Option<String>,
    class_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    due_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskRequest {
    class_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    due_at: Option<String>,
    status: Option<String>,
}

async fn owned_task(
    state: &AppState,
    user: &AuthUser,
    task_id: &str,
) -> Result<HomeworkTask, AppError> {
    let task = homework::find_task(state.db(), task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Homework not found"))?;
    owned_profile(state, user, &task.profile_id).await?;
    Ok(task)
}

fn parse_due(value: &str) -> Result<i64, AppError> {
    parse_datetime_ms(value)
        .ok_or_else(|| AppError::validation("dueAt must be a date or timestamp"))
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HomeworkListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = profile_from_query(
        &state,
        &user,
        &ProfileQuery {
            profile_id: query.profile_id,
        },
    )
    .await?;
    let tasks =
        homework::list_tasks(state.db(), &profile.id, query.include_completed.unwrap_or(true))
            .await?;
    Ok(ok(tasks))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile_id = required(body.profile_id, "profileId")?;
    let title = required(body.title, "title")?;
    let due_at = parse_due(&required(body.due_at, "dueAt")?)?;
    let description = optional(body.description);
    let class_id = optional(body.class_id);

    let profile = owned_profile(&state, &user, &profile_id).await?;
    if let Some(class_id) = class_id.as_deref() {
        owned_class(&state, &user, class_id).await?;
    }

    let task = homework::insert_task(
        state.db(),
        NewTask {
            profile_id: &profile.id,
            class_id: class_id.as_deref(),
            title: &title,
            description: description.as_deref(),
            due_at,
        },
    )
    .await?;
    Ok(created(task))
}

async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let current = owned_task(&state, &user, &id).await?;

    let class_id = optional(body.class_id);
    if let Some(class_id) = class_id.as_deref() {
        owned_class(&state, &user, class_id).await?;
    }
    let due_at = match optional(body.due_at) {
        Some(raw) => Some(parse_due(&raw)?),
        None => None,
    };
    let status = match optional(body.status) {
        Some(raw) => Some(TaskStatus::parse(&raw).ok_or_else(|| {
            AppError::validation("status must be pending, in_progress or completed")
        })?),
        None => None,
    };

    let changes = TaskChanges {
        class_id,
        title: optional(body.title),
        description: optional(body.description),
        due_at,
        status,
    };
    Ok(ok(homework::update_task(state.db(), &current, changes).await?))
}

async fn complete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let current = owned_task(&state, &user, &id).await?;
    let changes = TaskChanges {
        status: Some(TaskStatus::Completed),
        ..TaskChanges::default()
    };
    Ok(ok(homework::update_task(state.db(), &current, changes).await?))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let current = owned_task(&state, &user, &id).await?;
    homework::delete_task(state.db(), &current).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

async fn generate_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let task = owned_task(&state, &user, &id).await?;
    let profile = owned_profile(&state, &user, &task.profile_id).await?;

    let content =
        artifacts::generate_homework_plan(state.llm(), &task, profile.grade_level.as_deref())
            .await?;
    let plan = homework::insert_plan(state.db(), &task, &content).await?;
    tracing::info!(task_id = %task.id, plan_id = %plan.id, "homework plan generated");
    Ok(created(plan))
}

async fn list_plans(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let task = owned_task(&state, &user, &id).await?;
    Ok(ok(homework::list_plans(state.db(), &task.id).await?))
}
