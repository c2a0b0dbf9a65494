//! Prompt builders for the LLM-backed study artifacts.
//!
//! Each generator makes one provider call and returns the JSON object the
//! model produced. Persistence is the caller's job.

use serde_json::Value;

use crate::db::operations::artifacts::ArtifactKind;
use crate::db::operations::chat::MessageRecord;
use crate::db::operations::homework::HomeworkTask;
use crate::services::llm_provider::{ChatMessage, LLMError, LLMProvider};
use crate::time::format_ms;

/// Chat turns sent back to the tutor; older turns are dropped.
const TUTOR_HISTORY_LIMIT: usize = 20;

const TUTOR_SYSTEM_PROMPT: &str = "You are ForgeStudy's tutor. Guide the student toward the \
answer with short explanations and questions. Never just hand over homework answers. Keep \
replies under 200 words.";

pub struct ArtifactInput<'a> {
    pub kind: ArtifactKind,
    pub topic_title: &'a str,
    pub notes: Option<&'a str>,
    pub grade_level: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub title: String,
    pub content: Value,
}

pub fn artifact_prompts(input: &ArtifactInput<'_>) -> (String, String) {
    let shape = match input.kind {
        ArtifactKind::ExamSheet => {
            r#"{"title": string, "sections": [{"heading": string, "questions": [{"question": string, "answer": string}]}]}"#
        }
        ArtifactKind::PracticeLadder => {
            r#"{"title": string, "rungs": [{"level": number, "problem": string, "hint": string, "answer": string}]}"#
        }
        ArtifactKind::ConfusionMap => {
            r#"{"title": string, "pairs": [{"a": string, "b": string, "difference": string, "example": string}]}"#
        }
    };
    let goal = match input.kind {
        ArtifactKind::ExamSheet => "a one-page exam revision sheet",
        ArtifactKind::PracticeLadder => {
            "a practice ladder of problems ordered from easiest to hardest"
        }
        ArtifactKind::ConfusionMap => "a confusion map of concepts students commonly mix up",
    };

    let system = format!(
        "You create study material for school students. Respond with JSON only, matching \
         this shape: {shape}"
    );

    let mut user = format!("Create {goal} for the topic \"{}\".", input.topic_title);
    if let Some(grade) = input.grade_level {
        user.push_str(&format!(" The student is in grade {grade}."));
    }
    if let Some(notes) = input.notes.filter(|notes| !notes.trim().is_empty()) {
        user.push_str("\n\nStudent notes:\n");
        user.push_str(notes);
    }
    (system, user)
}

pub async fn generate_artifact(
    llm: &LLMProvider,
    input: &ArtifactInput<'_>,
) -> Result<GeneratedArtifact, LLMError> {
    let (system, user) = artifact_prompts(input);
    let content = llm.complete_json(&system, &user).await?;
    let title = title_from(&content).unwrap_or_else(|| {
        format!("{} {}", capitalize(input.kind.label()), input.topic_title)
    });
    Ok(GeneratedArtifact { title, content })
}

pub async fn generate_homework_plan(
    llm: &LLMProvider,
    task: &HomeworkTask,
    grade_level: Option<&str>,
) -> Result<Value, LLMError> {
    let system = "You plan homework sessions for school students. Respond with JSON only: \
                  {\"summary\": string, \"steps\": [{\"title\": string, \"minutes\": number, \"detail\": string}]}";

    let mut user = format!(
        "Plan the homework \"{}\" due {}.",
        task.title,
        format_ms(task.due_at)
    );
    if let Some(description) = task.description.as_deref() {
        user.push_str(&format!("\nDetails: {description}"));
    }
    if let Some(grade) = grade_level {
        user.push_str(&format!("\nThe student is in grade {grade}."));
    }

    llm.complete_json(system, &user).await
}

/// Replies to the latest user turn using the recent chat history.
pub async fn tutor_reply(llm: &LLMProvider, history: &[MessageRecord]) -> Result<String, LLMError> {
    let skip = history.len().saturating_sub(TUTOR_HISTORY_LIMIT);
    let mut messages = Vec::with_capacity(history.len() - skip + 1);
    messages.push(ChatMessage::system(TUTOR_SYSTEM_PROMPT));
    messages.extend(history.iter().skip(skip).map(|message| ChatMessage {
        role: message.role.clone(),
        content: message.content.clone(),
    }));

    let response = llm.chat(&messages).await?;
    response
        .first_content()
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(LLMError::EmptyChoices)
}

fn title_from(content: &Value) -> Option<String> {
    content
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_carry_topic_grade_and_notes() {
        let (system, user) = artifact_prompts(&ArtifactInput {
            kind: ArtifactKind::PracticeLadder,
            topic_title: "Fractions",
            notes: Some("halves and quarters"),
            grade_level: Some("4"),
        });
        assert!(system.contains("rungs"));
        assert!(user.contains("\"Fractions\""));
        assert!(user.contains("grade 4"));
        assert!(user.contains("halves and quarters"));
    }

    #[test]
    fn blank_notes_are_skipped() {
        let (_, user) = artifact_prompts(&ArtifactInput {
            kind: ArtifactKind::ExamSheet,
            topic_title: "Volcanoes",
            notes: Some("   "),
            grade_level: None,
        });
        assert!(!user.contains("Student notes"));
    }

    #[test]
    fn title_falls_back_when_missing() {
        assert_eq!(title_from(&serde_json::json!({"title": " Map "})), Some("Map".to_string()));
        assert_eq!(title_from(&serde_json::json!({"pairs": []})), None);
        assert_eq!(capitalize("confusion map"), "Confusion map");
    }
}
