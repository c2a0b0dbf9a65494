//! Ownership checks shared by the handlers. Every check runs before the
//! handler reads or writes anything else.

use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::operations::profile::{self, StudentProfile};
use crate::db::operations::topics::{self, StudyTopic};
use crate::response::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileQuery {
    pub profile_id: Option<String>,
}

/// 404 when the profile does not exist, 403 when another account owns it.
pub async fn owned_profile(
    state: &AppState,
    user: &AuthUser,
    profile_id: &str,
) -> Result<StudentProfile, AppError> {
    let profile = profile::find_profile(state.db(), profile_id)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    if profile.owner_id != user.id {
        return Err(AppError::forbidden("Profile belongs to another account"));
    }
    Ok(profile)
}

pub async fn profile_from_query(
    state: &AppState,
    user: &AuthUser,
    query: &ProfileQuery,
) -> Result<StudentProfile, AppError> {
    let profile_id = query
        .profile_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::missing_field("profileId"))?;
    owned_profile(state, user, profile_id).await
}

/// Resolves the topic, then checks its profile belongs to the caller.
pub async fn owned_topic(
    state: &AppState,
    user: &AuthUser,
    topic_id: &str,
) -> Result<(StudyTopic, StudentProfile), AppError> {
    let topic = topics::find_topic(state.db(), topic_id)
        .await?
        .ok_or_else(|| AppError::not_found("Topic not found"))?;
    let profile = owned_profile(state, user, &topic.profile_id).await?;
    Ok((topic, profile))
}

/// A trimmed, non-empty string field.
pub fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::missing_field(field))
}

pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
