// SPDX-License-Identifier: MIT

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running, with
//! FIRESTORE_EMULATOR_HOST pointing at it. They are skipped otherwise.
//!
//! Each test uses its own user id, so runs never interfere.

use chrono::{NaiveDate, TimeZone, Utc};
use live_activity::db::{ActivityStore, CasOutcome, RolloverCommit};
use live_activity::models::{DailyArchiveEntry, LiveActivitySnapshot, UserProfile};

mod common;
use common::test_db;

/// Generate a unique user ID for test isolation.
fn unique_user_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// SNAPSHOT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_snapshot_compare_and_swap() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("cas");

    assert!(db.load_snapshot(&user_id).await.unwrap().is_none());

    let mut first = LiveActivitySnapshot::empty(day(1));
    first.steps = 120;
    first.revision = 1;
    assert_eq!(
        db.compare_and_swap_snapshot(&user_id, None, &first)
            .await
            .unwrap(),
        CasOutcome::Committed
    );

    // Stale writer
    let mut stale = first.clone();
    stale.steps = 1;
    assert_eq!(
        db.compare_and_swap_snapshot(&user_id, None, &stale)
            .await
            .unwrap(),
        CasOutcome::Conflict
    );

    let mut second = first.clone();
    second.steps = 300;
    second.revision = 2;
    assert_eq!(
        db.compare_and_swap_snapshot(&user_id, Some(1), &second)
            .await
            .unwrap(),
        CasOutcome::Committed
    );

    let stored = db.load_snapshot(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.steps, 300);
    assert_eq!(stored.revision, 2);
}

#[tokio::test]
async fn test_concurrent_compare_and_swap_commits_once() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("cas-race");

    let mut base = LiveActivitySnapshot::empty(day(1));
    base.revision = 1;
    db.compare_and_swap_snapshot(&user_id, None, &base)
        .await
        .unwrap();

    let mut from_watch = base.clone();
    from_watch.steps = 500;
    from_watch.revision = 2;
    let mut from_phone = base.clone();
    from_phone.steps = 520;
    from_phone.revision = 2;

    let (a, b) = tokio::join!(
        db.compare_and_swap_snapshot(&user_id, Some(1), &from_watch),
        db.compare_and_swap_snapshot(&user_id, Some(1), &from_phone),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let committed = outcomes
        .iter()
        .filter(|o| **o == CasOutcome::Committed)
        .count();
    assert_eq!(committed, 1, "outcomes: {:?}", outcomes);

    let stored = db.load_snapshot(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.revision, 2);
    let winner = if outcomes[0] == CasOutcome::Committed {
        500
    } else {
        520
    };
    assert_eq!(stored.steps, winner);
}

#[tokio::test]
async fn test_first_write_requires_absent_document() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("cas-create");

    let mut first = LiveActivitySnapshot::empty(day(1));
    first.revision = 1;
    let mut second = first.clone();
    second.steps = 40;

    let (a, b) = tokio::join!(
        db.compare_and_swap_snapshot(&user_id, None, &first),
        db.compare_and_swap_snapshot(&user_id, None, &second),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == CasOutcome::Committed)
            .count(),
        1,
        "outcomes: {:?}",
        outcomes
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// ROLLOVER / ARCHIVE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_rollover_is_write_once() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("rollover");
    let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 1, 0).unwrap();

    let mut old = LiveActivitySnapshot::empty(day(1));
    old.steps = 8000;
    old.revision = 1;
    db.compare_and_swap_snapshot(&user_id, None, &old)
        .await
        .unwrap();

    let archive = DailyArchiveEntry::from_snapshot(&user_id, &old, Some(70.0), now);
    let mut reset = LiveActivitySnapshot::empty(day(2));
    reset.revision = 2;

    let outcome = db
        .commit_rollover(&user_id, Some(1), &archive, &reset)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RolloverCommit::Applied {
            archive_created: true
        }
    );

    // A second rollover of the same snapshot loses the revision race.
    let outcome = db
        .commit_rollover(&user_id, Some(1), &archive, &reset)
        .await
        .unwrap();
    assert_eq!(outcome, RolloverCommit::Conflict);

    let stored = db.get_archive(&user_id, day(1)).await.unwrap().unwrap();
    assert_eq!(stored.steps, 8000);
    assert_eq!(stored.weight_kg, Some(70.0));

    let live = db.load_snapshot(&user_id).await.unwrap().unwrap();
    assert_eq!(live.date, day(2));
    assert_eq!(live.steps, 0);
}

#[tokio::test]
async fn test_concurrent_rollovers_archive_once() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("rollover-race");

    let mut old = LiveActivitySnapshot::empty(day(1));
    old.steps = 6400;
    old.revision = 1;
    db.compare_and_swap_snapshot(&user_id, None, &old)
        .await
        .unwrap();

    let early = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap();
    let late = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 2).unwrap();
    let first = DailyArchiveEntry::from_snapshot(&user_id, &old, Some(70.0), early);
    let second = DailyArchiveEntry::from_snapshot(&user_id, &old, Some(70.0), late);
    let mut reset = LiveActivitySnapshot::empty(day(2));
    reset.revision = 2;

    let (a, b) = tokio::join!(
        db.commit_rollover(&user_id, Some(1), &first, &reset),
        db.commit_rollover(&user_id, Some(1), &second, &reset),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let applied: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, RolloverCommit::Applied { .. }))
        .collect();
    assert_eq!(applied.len(), 1, "outcomes: {:?}", outcomes);

    let stored = db.get_archive(&user_id, day(1)).await.unwrap().unwrap();
    let expected_at = if matches!(outcomes[0], RolloverCommit::Applied { .. }) {
        early
    } else {
        late
    };
    assert_eq!(stored.archived_at, expected_at);
    assert_eq!(stored.steps, 6400);
}

#[tokio::test]
async fn test_list_archive_newest_first() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("history");
    let now = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();

    let mut revision = 0;
    for d in [1, 2, 3] {
        let mut snapshot = LiveActivitySnapshot::empty(day(d));
        snapshot.steps = d as u64 * 1000;
        let expected = if revision == 0 { None } else { Some(revision) };
        revision += 1;
        snapshot.revision = revision;
        db.compare_and_swap_snapshot(&user_id, expected, &snapshot)
            .await
            .unwrap();

        let archive = DailyArchiveEntry::from_snapshot(&user_id, &snapshot, None, now);
        let mut reset = LiveActivitySnapshot::empty(day(d + 1));
        revision += 1;
        reset.revision = revision;
        db.commit_rollover(&user_id, Some(revision - 1), &archive, &reset)
            .await
            .unwrap();
    }

    let entries = db.list_archive(&user_id, 2).await.unwrap();
    let dates: Vec<_> = entries.iter().map(|e| e.date).collect();
    assert_eq!(dates, vec![day(3), day(2)]);
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_profile_upsert() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("profile");

    assert!(db.get_profile(&user_id).await.unwrap().is_none());

    let mut profile = UserProfile::new(user_id.as_str());
    profile.body_weight_kg = Some(81.0);
    db.upsert_profile(&profile).await.unwrap();

    profile.step_goal = 12_000;
    db.upsert_profile(&profile).await.unwrap();

    let stored = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.body_weight_kg, Some(81.0));
    assert_eq!(stored.step_goal, 12_000);
}
