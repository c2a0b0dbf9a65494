//! Smart CTA: the single "next best action" shown on the dashboard.
//!
//! Five tiers are checked in a fixed order and the first one with a match
//! wins. Every tier is a read; the cascade never writes. Tiers below a
//! match are not queried.

use serde::Serialize;

use crate::db::operations::homework::{self, HomeworkTask};
use crate::db::operations::topics::{self, StudyTopic};
use crate::db::DatabaseProxy;
use crate::services::orbit::{self, OrbitState};
use crate::time::{DAY_MS, HOUR_MS};

/// Homework due within this window (or already overdue) takes priority.
pub const DEADLINE_WINDOW_MS: i64 = 48 * HOUR_MS;
/// Released topics below this mastery are "struggling".
pub const LOW_MASTERY_THRESHOLD: f64 = 30.0;
/// Released topics untouched for this long are "fading".
pub const DECAY_AGE_MS: i64 = 7 * DAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CtaReason {
    Deadline,
    Quarantine,
    LowMastery,
    Decay,
    Default,
}

impl CtaReason {
    /// 1 is the most urgent.
    pub fn priority(self) -> u8 {
        match self {
            Self::Deadline => 1,
            Self::Quarantine => 2,
            Self::LowMastery => 3,
            Self::Decay => 4,
            Self::Default => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartCta {
    pub label: String,
    pub href: String,
    pub reason: CtaReason,
    pub priority: u8,
    pub topic_id: Option<String>,
    #[serde(serialize_with = "orbit::serialize_code_opt")]
    pub orbit_state: Option<OrbitState>,
    pub task_id: Option<String>,
}

impl SmartCta {
    fn for_task(task: &HomeworkTask, now: i64) -> Self {
        let label = if task.due_at <= now {
            format!("Overdue: {}", task.title)
        } else {
            format!("Due soon: {}", task.title)
        };
        Self {
            label,
            href: format!("/homework/{}", task.id),
            reason: CtaReason::Deadline,
            priority: CtaReason::Deadline.priority(),
            topic_id: None,
            orbit_state: None,
            task_id: Some(task.id.clone()),
        }
    }

    fn for_topic(reason: CtaReason, topic: &StudyTopic) -> Self {
        let (label, href) = match reason {
            CtaReason::Quarantine => (
                format!("Review new material: {}", topic.title),
                format!("/airlock?topic={}", topic.id),
            ),
            CtaReason::LowMastery => (
                format!("Strengthen {}", topic.title),
                format!("/study/{}", topic.id),
            ),
            _ => (
                format!("Refresh {}", topic.title),
                format!("/study/{}", topic.id),
            ),
        };
        Self {
            label,
            href,
            reason,
            priority: reason.priority(),
            topic_id: Some(topic.id.clone()),
            orbit_state: Some(topic.orbit_state),
            task_id: None,
        }
    }

    fn start_studying() -> Self {
        Self {
            label: "Start Studying".to_string(),
            href: "/study".to_string(),
            reason: CtaReason::Default,
            priority: CtaReason::Default.priority(),
            topic_id: None,
            orbit_state: None,
            task_id: None,
        }
    }
}

/// Runs the cascade for one profile at `now` (epoch ms). A storage error
/// aborts the whole cascade; lower tiers are not tried as a fallback.
pub async fn calculate_smart_cta(
    proxy: &DatabaseProxy,
    profile_id: &str,
    now: i64,
) -> Result<SmartCta, sqlx::Error> {
    if let Some(task) =
        homework::earliest_open_due_before(proxy, profile_id, now + DEADLINE_WINDOW_MS).await?
    {
        return Ok(SmartCta::for_task(&task, now));
    }

    if let Some(topic) = topics::first_quarantined(proxy, profile_id).await? {
        return Ok(SmartCta::for_topic(CtaReason::Quarantine, &topic));
    }

    if let Some(topic) = topics::weakest_below(proxy, profile_id, LOW_MASTERY_THRESHOLD).await? {
        return Ok(SmartCta::for_topic(CtaReason::LowMastery, &topic));
    }

    if let Some(topic) =
        topics::stalest_since(proxy, profile_id, LOW_MASTERY_THRESHOLD, now - DECAY_AGE_MS).await?
    {
        return Ok(SmartCta::for_topic(CtaReason::Decay, &topic));
    }

    Ok(SmartCta::start_studying())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_follow_tier_order() {
        let order = [
            CtaReason::Deadline,
            CtaReason::Quarantine,
            CtaReason::LowMastery,
            CtaReason::Decay,
            CtaReason::Default,
        ];
        let ranks: Vec<u8> = order.iter().map(|reason| reason.priority()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn default_cta_serializes_without_targets() {
        let value = serde_json::to_value(SmartCta::start_studying()).unwrap();
        assert_eq!(value["label"], "Start Studying");
        assert_eq!(value["reason"], "default");
        assert_eq!(value["priority"], 5);
        assert!(value["topicId"].is_null());
        assert!(value["orbitState"].is_null());
    }
}
