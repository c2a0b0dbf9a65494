use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::operations::classes::{self, ClassFields, ClassRecord};
use crate::response::{created, ok, AppError};
use crate::routes::access::{optional, required};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassRequest {
    name: Option<String>,
    subject: Option<String>,
    teacher_name: Option<String>,
    color: Option<String>,
}

impl ClassRequest {
    fn into_fields(self) -> ClassFields {
        ClassFields {
            name: optional(self.name),
            subject: optional(self.subject),
            teacher_name: optional(self.teacher_name),
            color: optional(self.color),
        }
    }
}

/// 404 for a missing class, 403 for one owned by another account.
pub(crate) async fn owned_class(
    state: &AppState,
    user: &AuthUser,
    class_id: &str,
) -> Result<ClassRecord, AppError> {
    let class = classes::find_class(state.db(), class_id)
        .await?
        .ok_or_else(|| AppError::not_found("Class not found"))?;
    if class.user_id != user.id {
        return Err(AppError::forbidden("Class belongs to another account"));
    }
    Ok(class)
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(classes::list_classes(state.db(), &user.id).await?))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut fields = body.into_fields();
    let name = required(fields.name.take(), "name")?;
    let class = classes::insert_class(state.db(), &user.id, &name, fields).await?;
    Ok(created(class))
}

async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    let current = owned_class(&state, &user, &id).await?;
    let updated = classes::update_class(state.db(), &current, body.into_fields()).await?;
    Ok(ok(updated))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let current = owned_class(&state, &user, &id).await?;
    classes::delete_class(state.db(), &current).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
