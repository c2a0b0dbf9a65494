//! Orbit-state lifecycle of a study topic and the review scheduler that
//! drives it.
//!
//! A topic enters in [`OrbitState::Quarantined`], is released into
//! [`OrbitState::Active`] by the student, becomes [`OrbitState::Mastered`]
//! once its mastery crosses [`MASTERY_THRESHOLD`], and decays into
//! [`OrbitState::Ghost`] when its review date lapses. Nothing else may
//! write the state column.

use serde::{Deserialize, Serialize, Serializer};

use crate::time::DAY_MS;

pub const MASTERY_THRESHOLD: f64 = 80.0;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
const MASTERY_RETAIN_WEIGHT: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbitState {
    Quarantined,
    Active,
    Mastered,
    Ghost,
}

impl OrbitState {
    pub fn code(self) -> i64 {
        match self {
            Self::Quarantined => 0,
            Self::Active => 1,
            Self::Mastered => 2,
            Self::Ghost => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Quarantined),
            1 => Some(Self::Active),
            2 => Some(Self::Mastered),
            3 => Some(Self::Ghost),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quarantined => "quarantined",
            Self::Active => "active",
            Self::Mastered => "mastered",
            Self::Ghost => "ghost",
        }
    }
}

/// Serializes a state as its integer code, the shape clients store.
pub fn serialize_code<S: Serializer>(state: &OrbitState, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(state.code())
}

pub fn serialize_code_opt<S: Serializer>(
    state: &Option<OrbitState>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match state {
        Some(state) => serializer.serialize_i64(state.code()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("topic is {} and cannot be released", .0.as_str())]
    NotReleasable(OrbitState),
    #[error("topic is still quarantined; release it before studying")]
    StillQuarantined,
}

/// Outcome of an airlock release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Released,
    AlreadyActive,
}

pub fn release(current: OrbitState) -> Result<Release, TransitionError> {
    match current {
        OrbitState::Quarantined => Ok(Release::Released),
        OrbitState::Active => Ok(Release::AlreadyActive),
        other => Err(TransitionError::NotReleasable(other)),
    }
}

/// Whether a Mastered topic has lapsed at `now_ms`.
pub fn has_lapsed(state: OrbitState, next_review_date: Option<i64>, now_ms: i64) -> bool {
    state == OrbitState::Mastered && next_review_date.is_some_and(|due| due <= now_ms)
}

/// Spaced-repetition bookkeeping stored alongside a topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval_days: 0,
            ease_factor: DEFAULT_EASE_FACTOR,
            repetitions: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewInput {
    pub state: OrbitState,
    pub mastery_score: f64,
    pub schedule: Schedule,
    pub score: f64,
    pub now_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewOutcome {
    pub state: OrbitState,
    pub mastery_score: f64,
    pub schedule: Schedule,
    pub next_review_date: i64,
}

/// Applies one study session scored 0..=100.
pub fn apply_review(input: ReviewInput) -> Result<ReviewOutcome, TransitionError> {
    if input.state == OrbitState::Quarantined {
        return Err(TransitionError::StillQuarantined);
    }

    let score = input.score.clamp(0.0, 100.0);
    let mastery_score = round_tenth(
        (input.mastery_score * MASTERY_RETAIN_WEIGHT + score * (1.0 - MASTERY_RETAIN_WEIGHT))
            .clamp(0.0, 100.0),
    );
    let schedule = next_schedule(input.schedule, score);

    let state = if mastery_score >= MASTERY_THRESHOLD {
        OrbitState::Mastered
    } else {
        OrbitState::Active
    };

    Ok(ReviewOutcome {
        state,
        mastery_score,
        schedule,
        next_review_date: input.now_ms + schedule.interval_days * DAY_MS,
    })
}

/// SM-2 style update with quality `score / 20` on a 0..=5 scale.
pub fn next_schedule(previous: Schedule, score: f64) -> Schedule {
    let quality = (score / 20.0).clamp(0.0, 5.0);
    let miss = 5.0 - quality;
    let ease_factor =
        (previous.ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE_FACTOR);

    if quality < 3.0 {
        return Schedule {
            interval_days: 1,
            ease_factor,
            repetitions: 0,
        };
    }

    let repetitions = previous.repetitions + 1;
    let interval_days = match repetitions {
        1 => 1,
        2 => 6,
        _ => ((previous.interval_days.max(1) as f64) * ease_factor).round() as i64,
    };

    Schedule {
        interval_days,
        ease_factor,
        repetitions,
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(state: OrbitState, mastery: f64, score: f64) -> ReviewInput {
        ReviewInput {
            state,
            mastery_score: mastery,
            schedule: Schedule::default(),
            score,
            now_ms: 1_000,
        }
    }

    #[test]
    fn codes_round_trip() {
        for state in [
            OrbitState::Quarantined,
            OrbitState::Active,
            OrbitState::Mastered,
            OrbitState::Ghost,
        ] {
            assert_eq!(OrbitState::from_code(state.code()), Some(state));
        }
        assert_eq!(OrbitState::from_code(7), None);
    }

    #[test]
    fn release_only_leaves_quarantine() {
        assert_eq!(release(OrbitState::Quarantined), Ok(Release::Released));
        assert_eq!(release(OrbitState::Active), Ok(Release::AlreadyActive));
        assert_eq!(
            release(OrbitState::Mastered),
            Err(TransitionError::NotReleasable(OrbitState::Mastered))
        );
        assert!(release(OrbitState::Ghost).is_err());
    }

    #[test]
    fn quarantined_topics_cannot_be_reviewed() {
        let err = apply_review(input(OrbitState::Quarantined, 0.0, 100.0)).unwrap_err();
        assert_eq!(err, TransitionError::StillQuarantined);
    }

    #[test]
    fn crossing_threshold_masters_with_future_review() {
        let outcome = apply_review(input(OrbitState::Active, 75.0, 100.0)).unwrap();
        assert_eq!(outcome.mastery_score, 85.0);
        assert_eq!(outcome.state, OrbitState::Mastered);
        assert!(outcome.next_review_date > 1_000);
    }

    #[test]
    fn weak_review_of_mastered_topic_falls_back_to_active() {
        let outcome = apply_review(input(OrbitState::Mastered, 82.0, 20.0)).unwrap();
        assert_eq!(outcome.state, OrbitState::Active);
        assert_eq!(outcome.schedule.repetitions, 0);
        assert_eq!(outcome.schedule.interval_days, 1);
    }

    #[test]
    fn strong_review_renews_ghost() {
        let outcome = apply_review(input(OrbitState::Ghost, 90.0, 95.0)).unwrap();
        assert_eq!(outcome.state, OrbitState::Mastered);
    }

    #[test]
    fn intervals_grow_across_successful_reviews() {
        let first = next_schedule(Schedule::default(), 100.0);
        let second = next_schedule(first, 100.0);
        let third = next_schedule(second, 100.0);
        assert_eq!(first.interval_days, 1);
        assert_eq!(second.interval_days, 6);
        assert!(third.interval_days > 6);
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let mut schedule = Schedule::default();
        for _ in 0..20 {
            schedule = next_schedule(schedule, 0.0);
        }
        assert_eq!(schedule.ease_factor, MIN_EASE_FACTOR);
    }

    #[test]
    fn lapse_requires_mastered_and_past_due() {
        assert!(has_lapsed(OrbitState::Mastered, Some(10), 10));
        assert!(!has_lapsed(OrbitState::Mastered, Some(11), 10));
        assert!(!has_lapsed(OrbitState::Mastered, None, 10));
        assert!(!has_lapsed(OrbitState::Active, Some(0), 10));
    }
}
