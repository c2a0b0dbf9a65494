use serde::Serialize;

use crate::db::operations::exercises::{ExerciseItem, ExerciseKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub prompt: String,
    pub expected: String,
    pub given: String,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptScore {
    pub correct: usize,
    pub total: usize,
    pub score: f64,
    pub results: Vec<ItemResult>,
}

/// Grades answers position by position; missing answers count as wrong.
pub fn score_attempt(
    kind: ExerciseKind,
    items: &[ExerciseItem],
    answers: &[String],
) -> AttemptScore {
    let results: Vec<ItemResult> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let given = answers.get(index).cloned().unwrap_or_default();
            let correct = normalize(kind, &given) == normalize(kind, &item.answer);
            ItemResult {
                prompt: item.prompt.clone(),
                expected: item.answer.clone(),
                given,
                correct,
            }
        })
        .collect();

    let total = results.len();
    let correct = results.iter().filter(|result| result.correct).count();
    let score = if total == 0 {
        0.0
    } else {
        (100.0 * correct as f64 / total as f64).round()
    };

    AttemptScore {
        correct,
        total,
        score,
        results,
    }
}

fn normalize(kind: ExerciseKind, value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    match kind {
        ExerciseKind::Spelling => lowered,
        ExerciseKind::Reading => lowered
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(prompt: &str, answer: &str) -> ExerciseItem {
        ExerciseItem {
            prompt: prompt.to_string(),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn spelling_ignores_case_and_outer_space() {
        let items = [item("cat", "Cat"), item("dog", "dog"), item("emu", "emu")];
        let answers = vec![" cat ".to_string(), "Dgo".to_string(), "EMU".to_string()];
        let scored = score_attempt(ExerciseKind::Spelling, &items, &answers);
        assert_eq!(scored.correct, 2);
        assert_eq!(scored.total, 3);
        assert_eq!(scored.score, 67.0);
        assert!(!scored.results[1].correct);
    }

    #[test]
    fn spelling_keeps_punctuation_significant() {
        let items = [item("its", "it's")];
        let scored = score_attempt(ExerciseKind::Spelling, &items, &["its".to_string()]);
        assert_eq!(scored.correct, 0);
    }

    #[test]
    fn reading_ignores_punctuation_and_spacing() {
        let items = [item("q1", "The sun is a star.")];
        let scored =
            score_attempt(ExerciseKind::Reading, &items, &["the  sun is a   star".to_string()]);
        assert_eq!(scored.score, 100.0);
    }

    #[test]
    fn missing_answers_are_wrong() {
        let items = [item("a", "a"), item("b", "b")];
        let scored = score_attempt(ExerciseKind::Spelling, &items, &["a".to_string()]);
        assert_eq!(scored.score, 50.0);
    }

    #[test]
    fn empty_exercise_scores_zero() {
        let scored = score_attempt(ExerciseKind::Reading, &[], &[]);
        assert_eq!(scored.score, 0.0);
        assert_eq!(scored.total, 0);
    }
}
