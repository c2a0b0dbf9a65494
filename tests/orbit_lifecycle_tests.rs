use proptest::prelude::*;

use forgestudy_backend::db::operations::{profile, topics};
use forgestudy_backend::services::cta::{calculate_smart_cta, CtaReason, DECAY_AGE_MS};
use forgestudy_backend::services::decay::{review_queue, run_lazy_decay, REVIEW_QUEUE_LIMIT};
use forgestudy_backend::services::orbit::{apply_review, OrbitState, ReviewInput};
use forgestudy_backend::time::{now_ms, DAY_MS, HOUR_MS};
use forgestudy_backend::workers::sweep_all_profiles;

mod common;

use common::{complete_homework, seed_homework, seed_topic, test_db, SeedTopic};

const PROFILE: &str = "profile-under-test";

fn topic<'a>(title: &'a str, orbit_state: i64, mastery_score: f64) -> SeedTopic<'a> {
    SeedTopic {
        profile_id: PROFILE,
        title,
        orbit_state,
        mastery_score,
        next_review_date: None,
        updated_at: now_ms(),
    }
}

#[tokio::test]
async fn deadline_outranks_quarantine() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    let task_id = seed_homework(&db, PROFILE, "Science poster", now + 24 * HOUR_MS).await;
    seed_topic(&db, topic("Cells", 0, 0.0)).await;

    let cta = calculate_smart_cta(&db, PROFILE, now).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Deadline);
    assert_eq!(cta.priority, 1);
    assert_eq!(cta.task_id.as_deref(), Some(task_id.as_str()));
    assert_eq!(cta.label, "Due soon: Science poster");
}

#[tokio::test]
async fn homework_outside_window_is_ignored() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    seed_homework(&db, PROFILE, "Book report", now + 72 * HOUR_MS).await;

    let cta = calculate_smart_cta(&db, PROFILE, now).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Default);
}

#[tokio::test]
async fn quarantine_outranks_low_mastery() {
    let (db, _dir) = test_db().await;
    let quarantined = seed_topic(&db, topic("Volcanoes", 0, 0.0)).await;
    seed_topic(&db, topic("Long division", 1, 12.0)).await;

    let cta = calculate_smart_cta(&db, PROFILE, now_ms()).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Quarantine);
    assert_eq!(cta.topic_id.as_deref(), Some(quarantined.as_str()));
    assert_eq!(cta.orbit_state, Some(OrbitState::Quarantined));
    assert_eq!(cta.href, format!("/airlock?topic={quarantined}"));
}

#[tokio::test]
async fn lapsed_mastered_topic_becomes_ghost_and_is_queued() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    let mastered = seed_topic(
        &db,
        SeedTopic {
            next_review_date: Some(now - 2 * DAY_MS),
            ..topic("Photosynthesis", 2, 88.0)
        },
    )
    .await;
    seed_topic(
        &db,
        SeedTopic {
            next_review_date: Some(now + 3 * DAY_MS),
            ..topic("Fractions", 2, 91.0)
        },
    )
    .await;

    let decayed = run_lazy_decay(&db, PROFILE, now).await.unwrap();
    assert_eq!(decayed.len(), 1);
    assert_eq!(decayed[0].id, mastered);
    assert_eq!(decayed[0].orbit_state, OrbitState::Ghost);

    let again = run_lazy_decay(&db, PROFILE, now).await.unwrap();
    assert!(again.is_empty());

    let queue = review_queue(&db, PROFILE, now).await.unwrap();
    assert_eq!(queue.items.len(), 1);
    assert_eq!(queue.items[0].topic.id, mastered);
    assert_eq!(queue.items[0].days_overdue, 2);
    assert_eq!(queue.estimated_minutes, 10);
}

#[tokio::test]
async fn review_queue_caps_at_five_most_overdue_first() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    for days in 1..=7 {
        seed_topic(
            &db,
            SeedTopic {
                next_review_date: Some(now - days * DAY_MS),
                ..topic("Ghost", 3, 85.0)
            },
        )
        .await;
    }

    let queue = review_queue(&db, PROFILE, now).await.unwrap();
    assert_eq!(queue.items.len() as i64, REVIEW_QUEUE_LIMIT);

    let overdue: Vec<i64> = queue.items.iter().map(|item| item.days_overdue).collect();
    assert_eq!(overdue, vec![7, 6, 5, 4, 3]);
}

#[tokio::test]
async fn deadline_tier_picks_earliest_due_including_overdue() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    seed_homework(&db, PROFILE, "Reading log", now + 30 * HOUR_MS).await;
    let overdue = seed_homework(&db, PROFILE, "Maths sheet", now - 5 * HOUR_MS).await;
    seed_homework(&db, PROFILE, "Poem", now + 2 * HOUR_MS).await;

    let cta = calculate_smart_cta(&db, PROFILE, now).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Deadline);
    assert_eq!(cta.task_id.as_deref(), Some(overdue.as_str()));
}

#[tokio::test]
async fn completed_homework_is_skipped() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    let done = seed_homework(&db, PROFILE, "Already handed in", now + HOUR_MS).await;
    complete_homework(&db, &done).await;

    let cta = calculate_smart_cta(&db, PROFILE, now).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Default);

    let open = seed_homework(&db, PROFILE, "Still open", now + 40 * HOUR_MS).await;
    let cta = calculate_smart_cta(&db, PROFILE, now).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Deadline);
    assert_eq!(cta.task_id.as_deref(), Some(open.as_str()));
}

#[tokio::test]
async fn quarantine_tier_picks_oldest_created() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    let mut ids = Vec::new();
    for (title, age) in [("Newest", HOUR_MS), ("Oldest", 3 * DAY_MS), ("Middle", DAY_MS)] {
        let id = seed_topic(
            &db,
            SeedTopic {
                updated_at: now - age,
                ..topic(title, 0, 0.0)
            },
        )
        .await;
        ids.push(id);
    }
    let oldest = &ids[1];

    let cta = calculate_smart_cta(&db, PROFILE, now).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Quarantine);
    assert_eq!(cta.topic_id.as_deref(), Some(oldest.as_str()));
}

#[tokio::test]
async fn low_mastery_tier_picks_weakest_topic() {
    let (db, _dir) = test_db().await;
    seed_topic(&db, topic("Decimals", 1, 25.0)).await;
    let weakest = seed_topic(&db, topic("Long division", 1, 5.0)).await;
    seed_topic(&db, topic("Angles", 3, 18.0)).await;
    seed_topic(&db, topic("Place value", 1, 45.0)).await;

    let cta = calculate_smart_cta(&db, PROFILE, now_ms()).await.unwrap();
    assert_eq!(cta.reason, CtaReason::LowMastery);
    assert_eq!(cta.topic_id.as_deref(), Some(weakest.as_str()));
}

#[tokio::test]
async fn decay_tier_picks_least_recently_updated() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    for days in [8, 20, 10] {
        seed_topic(
            &db,
            SeedTopic {
                updated_at: now - days * DAY_MS,
                ..topic("Stale", 1, 70.0)
            },
        )
        .await;
    }
    let stalest = seed_topic(
        &db,
        SeedTopic {
            updated_at: now - 30 * DAY_MS,
            ..topic("Forgotten", 2, 90.0)
        },
    )
    .await;
    seed_topic(&db, topic("Fresh", 1, 70.0)).await;

    let cta = calculate_smart_cta(&db, PROFILE, now).await.unwrap();
    assert_eq!(cta.reason, CtaReason::Decay);
    assert_eq!(cta.topic_id.as_deref(), Some(stalest.as_str()));
}

#[tokio::test]
async fn sweep_decays_every_profile() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    let first = profile::insert_profile(&db, "owner-1", "Ava", None, None)
        .await
        .unwrap();
    let second = profile::insert_profile(&db, "owner-2", "Ben", None, Some("fox"))
        .await
        .unwrap();

    for (profile_id, days) in [(&first.id, 1), (&first.id, 4), (&second.id, 2)] {
        seed_topic(
            &db,
            SeedTopic {
                profile_id: profile_id.as_str(),
                next_review_date: Some(now - days * DAY_MS),
                ..topic("Lapsed", 2, 90.0)
            },
        )
        .await;
    }
    seed_topic(
        &db,
        SeedTopic {
            profile_id: second.id.as_str(),
            next_review_date: Some(now + DAY_MS),
            ..topic("Not yet due", 2, 90.0)
        },
    )
    .await;

    assert_eq!(sweep_all_profiles(&db).await.unwrap(), 3);
    assert_eq!(sweep_all_profiles(&db).await.unwrap(), 0);

    let queue = review_queue(&db, &second.id, now).await.unwrap();
    assert_eq!(queue.items.len(), 1);
    assert_eq!(queue.items[0].days_overdue, 2);
}

#[tokio::test]
async fn review_is_not_saved_over_a_changed_state() {
    let (db, _dir) = test_db().await;
    let now = now_ms();
    let id = seed_topic(
        &db,
        SeedTopic {
            next_review_date: Some(now - DAY_MS),
            ..topic("Photosynthesis", 2, 88.0)
        },
    )
    .await;
    let before = topics::find_topic(&db, &id).await.unwrap().unwrap();

    // Decay lands between reading the topic and saving the review.
    run_lazy_decay(&db, PROFILE, now).await.unwrap();

    let outcome = apply_review(ReviewInput {
        state: before.orbit_state,
        mastery_score: before.mastery_score,
        schedule: before.schedule(),
        score: 100.0,
        now_ms: now,
    })
    .unwrap();
    let saved = topics::save_review(&db, &id, before.orbit_state, &outcome, now)
        .await
        .unwrap();
    assert!(!saved);

    let after = topics::find_topic(&db, &id).await.unwrap().unwrap();
    assert_eq!(after.orbit_state, OrbitState::Ghost);
    assert_eq!(after.mastery_score, 88.0);

    let saved = topics::save_review(&db, &id, OrbitState::Ghost, &outcome, now)
        .await
        .unwrap();
    assert!(saved);
}

#[derive(Debug, Clone, Copy)]
struct Tiers {
    deadline: bool,
    quarantine: bool,
    low_mastery: bool,
    stale: bool,
}

fn expected_reason(tiers: Tiers) -> CtaReason {
    if tiers.deadline {
        CtaReason::Deadline
    } else if tiers.quarantine {
        CtaReason::Quarantine
    } else if tiers.low_mastery {
        CtaReason::LowMastery
    } else if tiers.stale {
        CtaReason::Decay
    } else {
        CtaReason::Default
    }
}

async fn cascade_reason(tiers: Tiers) -> CtaReason {
    let (db, _dir) = test_db().await;
    let now = now_ms();

    if tiers.deadline {
        seed_homework(&db, PROFILE, "Worksheet", now + HOUR_MS).await;
    }
    if tiers.quarantine {
        seed_topic(&db, topic("New chapter", 0, 0.0)).await;
    }
    if tiers.low_mastery {
        seed_topic(&db, topic("Weak spot", 1, 15.0)).await;
    }
    if tiers.stale {
        seed_topic(
            &db,
            SeedTopic {
                updated_at: now - DECAY_AGE_MS - DAY_MS,
                ..topic("Old favourite", 1, 70.0)
            },
        )
        .await;
    }

    calculate_smart_cta(&db, PROFILE, now).await.unwrap().reason
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn cta_picks_the_highest_present_tier(
        deadline in any::<bool>(),
        quarantine in any::<bool>(),
        low_mastery in any::<bool>(),
        stale in any::<bool>(),
    ) {
        let tiers = Tiers { deadline, quarantine, low_mastery, stale };
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let reason = runtime.block_on(cascade_reason(tiers));
        prop_assert_eq!(reason, expected_reason(tiers));
    }
}
