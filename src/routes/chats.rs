use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::chat::{self, ChatRecord, MessageRecord};
use crate::db::operations::topics::{self, TopicSource};
use crate::response::{created, ok, AppError};
use crate::routes::access::{optional, owned_profile, required};
use crate::services::artifacts;
use crate::state::AppState;

const DEFAULT_CHAT_TITLE: &str = "New chat";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(show).delete(remove))
        .route("/:id/messages", post(send_message))
        .route("/:id/topics", post(create_topic))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatRequest {
    title: Option<String>,
    profile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatTopicRequest {
    profile_id: Option<String>,
    title: Option<String>,
}

#[derive(Serialize)]
struct ChatDetail {
    #[serde(flatten)]
    chat: ChatRecord,
    messages: Vec<MessageRecord>,
}

#[derive(Serialize)]
struct ExchangeResponse {
    user: MessageRecord,
    assistant: MessageRecord,
}

async fn owned_chat(
    state: &AppState,
    user: &AuthUser,
    chat_id: &str,
) -> Result<ChatRecord, AppError> {
    let chat = chat::find_chat(state.db(), chat_id)
        .await?
        .ok_or_else(|| AppError::not_found("Chat not found"))?;
    if chat.user_id != user.id {
        return Err(AppError::forbidden("Chat belongs to another account"));
    }
    Ok(chat)
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(chat::list_chats(state.db(), &user.id).await?))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = optional(body.title).unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string());
    let profile_id = match optional(body.profile_id) {
        Some(id) => Some(owned_profile(&state, &user, &id).await?.id),
        None => None,
    };
    let record = chat::insert_chat(state.db(), &user.id, profile_id.as_deref(), &title).await?;
    Ok(created(record))
}

async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = owned_chat(&state, &user, &id).await?;
    let messages = chat::list_messages(state.db(), &record.id).await?;
    Ok(ok(ChatDetail {
        chat: record,
        messages,
    }))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = owned_chat(&state, &user, &id).await?;
    chat::delete_chat(state.db(), &record).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

/// Stores the user's message, asks the tutor model for a reply over the
/// chat history and stores that too.
async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let content = required(body.content, "content")?;
    let record = owned_chat(&state, &user, &id).await?;
    if !state.llm().is_available() {
        return Err(AppError::service_unavailable("AI generation is not configured"));
    }

    let user_message = chat::insert_message(state.db(), &record.id, "user", &content).await?;
    let history = chat::list_messages(state.db(), &record.id).await?;
    let reply = artifacts::tutor_reply(state.llm(), &history).await?;
    let assistant = chat::insert_message(state.db(), &record.id, "assistant", &reply).await?;

    Ok(created(ExchangeResponse {
        user: user_message,
        assistant,
    }))
}

/// Turns something discussed in a chat into a quarantined topic.
async fn create_topic(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ChatTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = required(body.title, "title")?;
    let record = owned_chat(&state, &user, &id).await?;
    let profile_id = optional(body.profile_id)
        .or_else(|| record.profile_id.clone())
        .ok_or_else(|| AppError::missing_field("profileId"))?;
    let profile = owned_profile(&state, &user, &profile_id).await?;

    let topic = topics::insert_topic(state.db(), &profile.id, &title, TopicSource::Chat).await?;
    tracing::info!(chat_id = %record.id, topic_id = %topic.id, "topic created from chat");
    Ok(created(topic))
}
