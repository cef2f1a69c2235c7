mod support;

use std::collections::HashSet;
use std::sync::Arc;

use common::lease::LeaseError;
use common::models::{SlotSkipReason, SlotState};
use scheduler::SchedulerError;
use storage::repositories::{CommitOutcome, SignalRepository, SlotRepository, SqliteLeaseService};
use support::*;

#[tokio::test]
async fn test_fill_takes_top_candidates_and_closes_at_capacity() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);
    let now = at(0, 5);
    let candidates = vec![scored("A", 0.9, now), scored("B", 0.8, now), scored("C", 0.7, now)];

    let outcome = scheduler.fill_slot(slot(0), &candidates, 2, now).await.unwrap();

    assert_eq!(outcome.skipped, None);
    let filled: Vec<&str> = outcome.filled.iter().map(|s| s.instrument.as_str()).collect();
    assert_eq!(filled, vec!["A", "B"]);
    assert!(outcome.filled.iter().all(|s| s.slot_key() == slot(0) && s.valid));
    assert_eq!(outcome.filled[0].expires_at, Some(now + chrono::Duration::minutes(240)));

    let stored = SlotRepository::load_or_create(&pool, slot(0), now).await.unwrap();
    assert_eq!(stored.fill_count, 2);
    assert_eq!(stored.state, SlotState::Closed);
}

#[tokio::test]
async fn test_closed_slot_is_never_regenerated() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);
    let now = at(0, 5);
    let candidates = vec![scored("A", 0.9, now), scored("B", 0.8, now), scored("C", 0.7, now)];

    scheduler.fill_slot(slot(0), &candidates, 2, now).await.unwrap();
    let rerun = scheduler
        .fill_slot(slot(0), &[scored("D", 0.99, now)], 2, at(0, 30))
        .await
        .unwrap();

    assert_eq!(rerun.skipped, Some(SlotSkipReason::SlotFull));
    assert!(rerun.filled.is_empty());
    let signals = SignalRepository::for_date(&pool, day()).await.unwrap();
    assert_eq!(signals.len(), 2);
}

#[tokio::test]
async fn test_instrument_is_signaled_at_most_once_per_day() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);

    let first = vec![scored("A", 0.9, at(0, 5)), scored("B", 0.8, at(0, 5)), scored("C", 0.7, at(0, 5))];
    scheduler.fill_slot(slot(0), &first, 2, at(0, 5)).await.unwrap();

    let second = vec![scored("A", 0.99, at(1, 5)), scored("C", 0.95, at(1, 5))];
    let outcome = scheduler.fill_slot(slot(1), &second, 2, at(1, 5)).await.unwrap();

    let filled: Vec<&str> = outcome.filled.iter().map(|s| s.instrument.as_str()).collect();
    assert_eq!(filled, vec!["C"]);
    assert_eq!(outcome.skipped, None);

    let slot_one = SlotRepository::load_or_create(&pool, slot(1), at(1, 5)).await.unwrap();
    assert_eq!(slot_one.state, SlotState::Filling);
    assert_eq!(slot_one.fill_count, 1);

    assert_eq!(SignalRepository::count_for_instrument_on(&pool, "A", day()).await.unwrap(), 1);
    let ledger = SlotRepository::day_ledger(&pool, day()).await.unwrap();
    assert_eq!(ledger, HashSet::from(["A".to_string(), "B".to_string(), "C".to_string()]));
}

#[tokio::test]
async fn test_partial_slot_is_topped_up_later() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);

    let outcome = scheduler
        .fill_slot(slot(3), &[scored("A", 0.9, at(3, 0))], 3, at(3, 0))
        .await
        .unwrap();
    assert_eq!(outcome.filled.len(), 1);

    let outcome = scheduler
        .fill_slot(
            slot(3),
            &[scored("A", 0.9, at(3, 20)), scored("B", 0.8, at(3, 20)), scored("C", 0.7, at(3, 20))],
            3,
            at(3, 20),
        )
        .await
        .unwrap();
    let filled: Vec<&str> = outcome.filled.iter().map(|s| s.instrument.as_str()).collect();
    assert_eq!(filled, vec!["B", "C"]);

    let stored = SlotRepository::load_or_create(&pool, slot(3), at(3, 30)).await.unwrap();
    assert_eq!(stored.state, SlotState::Closed);
    assert_eq!(stored.fill_count, 3);
}

#[tokio::test]
async fn test_no_candidates_after_exclusion() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);

    scheduler.fill_slot(slot(0), &[scored("A", 0.9, at(0, 0))], 2, at(0, 0)).await.unwrap();
    let outcome = scheduler
        .fill_slot(slot(1), &[scored("A", 0.9, at(1, 0))], 2, at(1, 0))
        .await
        .unwrap();
    assert_eq!(outcome.skipped, Some(SlotSkipReason::NoEligibleCandidates));

    let empty = scheduler.fill_slot(slot(2), &[], 2, at(2, 0)).await.unwrap();
    assert_eq!(empty.skipped, Some(SlotSkipReason::NoEligibleCandidates));
}

#[tokio::test]
async fn test_duplicate_instrument_in_pool_is_taken_once() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);
    let now = at(5, 0);

    let outcome = scheduler
        .fill_slot(slot(5), &[scored("A", 0.9, now), scored("A", 0.85, now), scored("B", 0.5, now)], 2, now)
        .await
        .unwrap();

    let filled: Vec<(&str, f64)> = outcome.filled.iter().map(|s| (s.instrument.as_str(), s.score)).collect();
    assert_eq!(filled, vec![("A", 0.9), ("B", 0.5)]);
}

#[tokio::test]
async fn test_held_lease_skips_with_locked() {
    let pool = temp_pool().await;
    let mut lease = MockLease::new();
    lease
        .expect_try_acquire()
        .withf(|key, _| key.to_string() == "slot:2025-03-01:0")
        .times(1)
        .returning(|_, _| Ok(false));
    lease.expect_release().never();

    let scheduler = scheduler_with(&pool, Arc::new(lease));
    let outcome = scheduler
        .fill_slot(slot(0), &[scored("A", 0.9, at(0, 0))], 2, at(0, 0))
        .await
        .unwrap();

    assert_eq!(outcome.skipped, Some(SlotSkipReason::Locked));
    assert!(SignalRepository::for_date(&pool, day()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lease_backend_failure_aborts_the_pass() {
    let pool = temp_pool().await;
    let mut lease = MockLease::new();
    lease
        .expect_try_acquire()
        .returning(|_, _| Err(LeaseError::Unavailable("connection refused".to_string())));

    let scheduler = scheduler_with(&pool, Arc::new(lease));
    let err = scheduler
        .fill_slot(slot(0), &[scored("A", 0.9, at(0, 0))], 2, at(0, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::Lease(_)));
}

#[tokio::test]
async fn test_lease_is_released_after_fill() {
    let pool = temp_pool().await;
    let mut lease = MockLease::new();
    lease.expect_try_acquire().times(1).returning(|_, _| Ok(true));
    lease
        .expect_release()
        .withf(|key| key.to_string() == "slot:2025-03-01:4")
        .times(1)
        .returning(|_| Ok(()));

    let scheduler = scheduler_with(&pool, Arc::new(lease));
    let outcome = scheduler
        .fill_slot(slot(4), &[scored("A", 0.9, at(4, 0))], 2, at(4, 0))
        .await
        .unwrap();
    assert_eq!(outcome.filled.len(), 1);
}

#[tokio::test]
async fn test_concurrent_passes_on_same_slot_never_exceed_capacity() {
    let pool = temp_pool().await;
    let now = at(6, 0);
    let candidates = vec![scored("A", 0.9, now), scored("B", 0.8, now), scored("C", 0.7, now)];

    let mut handles = Vec::new();
    for _ in 0..4 {
        let scheduler = scheduler_with(&pool, Arc::new(SqliteLeaseService::new(pool.clone())));
        let candidates = candidates.clone();
        handles.push(tokio::spawn(async move {
            scheduler.fill_slot(slot(6), &candidates, 2, now).await.unwrap()
        }));
    }

    let mut filled = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        filled += outcome.filled.len();
        if outcome.filled.is_empty() {
            assert!(matches!(
                outcome.skipped,
                Some(SlotSkipReason::Locked | SlotSkipReason::SlotFull | SlotSkipReason::RaceLost)
            ));
        }
    }

    assert_eq!(filled, 2);
    let stored = SlotRepository::load_or_create(&pool, slot(6), now).await.unwrap();
    assert_eq!(stored.fill_count, 2);
    assert_eq!(SignalRepository::for_date(&pool, day()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_slots_share_the_day_ledger() {
    let pool = temp_pool().await;
    let candidates = vec![scored("A", 0.9, at(7, 0)), scored("B", 0.8, at(7, 0))];

    let mut handles = Vec::new();
    for index in [7, 8] {
        let scheduler = scheduler(&pool);
        let candidates = candidates.clone();
        handles.push(tokio::spawn(async move {
            scheduler.fill_slot(slot(index), &candidates, 2, at(index, 0)).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let signals = SignalRepository::for_date(&pool, day()).await.unwrap();
    let instruments: HashSet<&str> = signals.iter().map(|s| s.instrument.as_str()).collect();
    assert_eq!(signals.len(), instruments.len());
    assert_eq!(instruments, HashSet::from(["A", "B"]));
}

#[tokio::test]
async fn test_integrity_sweep_keeps_most_recent_per_instrument_and_side() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);

    scheduler.fill_slot(slot(0), &[scored("A", 0.9, at(0, 0))], 2, at(0, 0)).await.unwrap();
    let tomorrow = chrono::NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
    let next_day = common::models::SlotKey::new(tomorrow, 0);
    let later = at(0, 0) + chrono::Duration::days(1);
    scheduler.fill_slot(next_day, &[scored("A", 0.7, later)], 2, later).await.unwrap();

    let invalidated = scheduler.integrity_sweep().await.unwrap();
    assert_eq!(invalidated.len(), 1);
    assert_eq!(invalidated[0].slot_date, day());
    assert_eq!(invalidated[0].invalidation_reason.as_deref(), Some("SUPERSEDED"));

    let valid = SignalRepository::valid(&pool).await.unwrap();
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].slot_date, tomorrow);

    assert!(scheduler.integrity_sweep().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_against_stale_fill_count_writes_nothing() {
    let pool = temp_pool().await;
    let now = at(10, 0);
    scheduler(&pool)
        .fill_slot(slot(10), &[scored("A", 0.9, now)], 3, now)
        .await
        .unwrap();

    let stale = SlotRepository::commit_fill(&pool, slot(10), 0, 3, &[new_signal("B", slot(10), now)], now)
        .await
        .unwrap();
    assert!(matches!(stale, CommitOutcome::Conflict));

    let stored = SlotRepository::load_or_create(&pool, slot(10), now).await.unwrap();
    assert_eq!(stored.fill_count, 1);
    assert_eq!(SignalRepository::for_date(&pool, day()).await.unwrap().len(), 1);
    assert_eq!(SlotRepository::day_ledger(&pool, day()).await.unwrap(), HashSet::from(["A".to_string()]));

    let fresh = SlotRepository::commit_fill(&pool, slot(10), 1, 3, &[new_signal("B", slot(10), now)], now)
        .await
        .unwrap();
    assert!(matches!(fresh, CommitOutcome::Committed(ref signals) if signals.len() == 1));
}

#[tokio::test]
async fn test_ledger_conflict_rolls_back_earlier_picks() {
    let pool = temp_pool().await;
    scheduler(&pool)
        .fill_slot(slot(0), &[scored("A", 0.9, at(0, 0))], 2, at(0, 0))
        .await
        .unwrap();

    let now = at(1, 0);
    SlotRepository::load_or_create(&pool, slot(1), now).await.unwrap();
    let picks = [new_signal("B", slot(1), now), new_signal("A", slot(1), now)];
    let outcome = SlotRepository::commit_fill(&pool, slot(1), 0, 2, &picks, now).await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Conflict));

    let stored = SlotRepository::load_or_create(&pool, slot(1), now).await.unwrap();
    assert_eq!(stored.fill_count, 0);
    assert_eq!(stored.state, SlotState::Empty);
    let signals = SignalRepository::for_date(&pool, day()).await.unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].instrument, "A");
    assert_eq!(SlotRepository::day_ledger(&pool, day()).await.unwrap(), HashSet::from(["A".to_string()]));
}
