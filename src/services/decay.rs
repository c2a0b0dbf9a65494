use serde::Serialize;

use crate::db::operations::topics::{self, StudyTopic};
use crate::db::DatabaseProxy;
use crate::services::orbit::{has_lapsed, OrbitState};
use crate::time::DAY_MS;

pub const REVIEW_QUEUE_LIMIT: i64 = 5;
/// Fixed session length shown next to the queue.
pub const ESTIMATED_REVIEW_MINUTES: u32 = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueItem {
    #[serde(flatten)]
    pub topic: StudyTopic,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueue {
    pub items: Vec<ReviewQueueItem>,
    pub estimated_minutes: u32,
    pub decayed: usize,
}

/// Moves every lapsed Mastered topic of the profile to Ghost and returns
/// the topics that changed. `updated_at` is left alone so the decay tier
/// of the CTA cascade still sees the last real study date.
pub async fn run_lazy_decay(
    proxy: &DatabaseProxy,
    profile_id: &str,
    now: i64,
) -> Result<Vec<StudyTopic>, sqlx::Error> {
    let lapsed: Vec<StudyTopic> = topics::list_lapsed(proxy, profile_id, now)
        .await?
        .into_iter()
        .filter(|topic| has_lapsed(topic.orbit_state, topic.next_review_date, now))
        .collect();
    if lapsed.is_empty() {
        return Ok(lapsed);
    }

    let ids: Vec<String> = lapsed.iter().map(|topic| topic.id.clone()).collect();
    let updated = topics::mark_ghosts(proxy, profile_id, &ids).await?;
    tracing::debug!(profile_id, decayed = updated, "lazy decay applied");

    Ok(lapsed
        .into_iter()
        .map(|topic| StudyTopic {
            orbit_state: OrbitState::Ghost,
            ..topic
        })
        .collect())
}

/// Decays first, then returns the most overdue Ghost topics.
pub async fn review_queue(
    proxy: &DatabaseProxy,
    profile_id: &str,
    now: i64,
) -> Result<ReviewQueue, sqlx::Error> {
    let decayed = run_lazy_decay(proxy, profile_id, now).await?;
    let ghosts = topics::list_ghosts(proxy, profile_id, REVIEW_QUEUE_LIMIT).await?;

    let items = ghosts
        .into_iter()
        .map(|topic| ReviewQueueItem {
            days_overdue: days_overdue(topic.next_review_date, now),
            topic,
        })
        .collect();

    Ok(ReviewQueue {
        items,
        estimated_minutes: ESTIMATED_REVIEW_MINUTES,
        decayed: decayed.len(),
    })
}

/// Whole days past the review date, never negative.
pub fn days_overdue(next_review_date: Option<i64>, now: i64) -> i64 {
    next_review_date
        .map(|due| ((now - due) / DAY_MS).max(0))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_overdue_floors_and_clamps() {
        let now = 10 * DAY_MS;
        assert_eq!(days_overdue(Some(now - 3 * DAY_MS - 5), now), 3);
        assert_eq!(days_overdue(Some(now - DAY_MS + 1), now), 0);
        assert_eq!(days_overdue(Some(now + DAY_MS), now), 0);
        assert_eq!(days_overdue(None, now), 0);
    }
}
