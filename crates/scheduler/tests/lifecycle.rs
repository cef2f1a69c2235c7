mod support;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::config::LifecycleConfig;
use common::events::SignalEvent;
use common::models::{Side, Signal, SignalStatus};
use market_data::MarketDataError;
use market_data::services::{CandleExecutionVerifier, SqliteSnapshotProvider};
use market_data::traits::{ExecutionOutcome, ExecutionVerifier};
use mockall::mock;
use scheduler::services::{LifecycleManager, SignalFeed, SlotScheduler};
use sqlx::SqlitePool;
use storage::repositories::{SignalRepository, SqliteLeaseService};
use support::*;

mock! {
    pub Verifier {}

    #[async_trait]
    impl ExecutionVerifier for Verifier {
        async fn verify(
            &self,
            signal: &Signal,
            until: DateTime<Utc>,
        ) -> Result<ExecutionOutcome, MarketDataError>;
    }
}

fn still_open() -> MockVerifier {
    let mut verifier = MockVerifier::new();
    verifier.expect_verify().returning(|_, _| Ok(ExecutionOutcome::StillOpen));
    verifier
}

fn manager(pool: &SqlitePool, verifier: MockVerifier, config: LifecycleConfig) -> LifecycleManager {
    LifecycleManager::new(pool.clone(), Arc::new(verifier), config)
}

fn candle_verifier(pool: &SqlitePool) -> Arc<CandleExecutionVerifier> {
    Arc::new(CandleExecutionVerifier::new(Arc::new(SqliteSnapshotProvider::new(
        pool.clone(),
    ))))
}

fn scheduler_without_ttl(pool: &SqlitePool) -> SlotScheduler {
    SlotScheduler::new(
        pool.clone(),
        Arc::new(SqliteLeaseService::new(pool.clone())),
        std::time::Duration::from_secs(3600),
        LifecycleConfig {
            signal_ttl: None,
            ..LifecycleConfig::default()
        },
    )
}

#[tokio::test]
async fn test_expiry_sweep_flips_past_due_signals() {
    let pool = temp_pool().await;
    let created = at(0, 0);
    scheduler(&pool)
        .fill_slot(slot(0), &[scored("A", 0.9, created), scored("B", 0.8, created)], 2, created)
        .await
        .unwrap();

    let lifecycle = manager(&pool, still_open(), lifecycle_config());
    assert_eq!(lifecycle.active(at(3, 59)).await.unwrap().len(), 2);
    assert!(lifecycle.expire_sweep(at(3, 59)).await.unwrap().is_empty());

    let events = lifecycle.expire_sweep(at(4, 0)).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, SignalEvent::Expired { .. })));
    assert!(lifecycle.active(at(4, 0)).await.unwrap().is_empty());

    let stored = SignalRepository::for_date(&pool, day()).await.unwrap();
    assert!(stored.iter().all(|s| !s.valid && s.status == SignalStatus::Expired));
}

#[tokio::test]
async fn test_signal_without_expiry_uses_max_age() {
    let pool = temp_pool().await;
    let created = at(1, 0);
    scheduler_without_ttl(&pool)
        .fill_slot(slot(1), &[scored("A", 0.9, created)], 2, created)
        .await
        .unwrap();

    let config = LifecycleConfig {
        signal_ttl: None,
        max_age: Duration::hours(2),
        best_of_day_top_n: 10,
    };
    let lifecycle = manager(&pool, still_open(), config);

    let active = lifecycle.active(at(2, 59)).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].expires_at, None);
    assert!(active[0].is_active(at(2, 59), Duration::hours(2)));

    assert_eq!(lifecycle.expire_sweep(at(3, 0)).await.unwrap().len(), 1);
    assert!(lifecycle.active(at(3, 0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_execution_is_stamped_once() {
    let pool = temp_pool().await;
    let created = at(2, 0);
    scheduler(&pool)
        .fill_slot(
            slot(2),
            &[scored("A", 0.9, created), scored("B", 0.8, created), scored("C", 0.7, created)],
            3,
            created,
        )
        .await
        .unwrap();

    let mut verifier = MockVerifier::new();
    verifier
        .expect_verify()
        .returning(|signal, _| match signal.instrument.as_str() {
            "A" => Ok(ExecutionOutcome::TargetHit {
                price: signal.target_price,
                at: signal.created_at + Duration::minutes(45),
            }),
            "B" => Ok(ExecutionOutcome::StillOpen),
            _ => Err(MarketDataError::Response("no candles".to_string())),
        });
    let lifecycle = manager(&pool, verifier, lifecycle_config());

    let events = lifecycle.execution_sweep(at(3, 0)).await.unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        SignalEvent::Executed {
            instrument,
            price,
            profit_or_loss,
            ..
        } => {
            assert_eq!(instrument, "A");
            assert_eq!(*price, 104.0);
            assert!((profit_or_loss - 4.0).abs() < 1e-9);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let stored = SignalRepository::for_date(&pool, day()).await.unwrap();
    let a = stored.iter().find(|s| s.instrument == "A").unwrap();
    assert!(a.executed && !a.valid);
    assert_eq!(a.status, SignalStatus::Executed);
    assert_eq!(a.executed_at, Some(created + Duration::minutes(45)));
    assert!(stored.iter().filter(|s| s.instrument != "A").all(|s| s.valid));

    assert!(!SignalRepository::mark_executed(&pool, a.id, 99.0, at(3, 30), -1.0).await.unwrap());
    assert!(lifecycle.execution_sweep(at(3, 30)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_supersede_requires_newer_and_better_score() {
    let pool = temp_pool().await;
    let scheduler = scheduler_without_ttl(&pool);
    let first = at(0, 0);
    let second = first + Duration::days(1);
    let third = second + Duration::days(1);

    scheduler.fill_slot(slot(0), &[scored("A", 0.6, first)], 2, first).await.unwrap();
    let next = common::models::SlotKey::new(second.date_naive(), 0);
    scheduler.fill_slot(next, &[scored("A", 0.8, second)], 2, second).await.unwrap();

    let lifecycle = manager(&pool, still_open(), lifecycle_config());
    let events = lifecycle.supersede("A", Side::Long).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], SignalEvent::Invalidated { reason, .. } if reason == "SUPERSEDED"));

    let after = common::models::SlotKey::new(third.date_naive(), 0);
    scheduler.fill_slot(after, &[scored("A", 0.5, third)], 2, third).await.unwrap();
    assert!(lifecycle.supersede("A", Side::Long).await.unwrap().is_empty());
    assert!(lifecycle.supersede("A", Side::Short).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_best_of_day_is_read_only_dense_rank() {
    let pool = temp_pool().await;
    let scheduler = scheduler(&pool);
    scheduler
        .fill_slot(slot(0), &[scored("A", 0.9, at(0, 0)), scored("C", 0.8, at(0, 0))], 2, at(0, 0))
        .await
        .unwrap();
    scheduler
        .fill_slot(slot(1), &[scored("B", 0.8, at(1, 0)), scored("D", 0.4, at(1, 0))], 2, at(1, 0))
        .await
        .unwrap();

    let config = LifecycleConfig {
        best_of_day_top_n: 3,
        ..LifecycleConfig::default()
    };
    let lifecycle = manager(&pool, still_open(), config);
    let best = lifecycle.best_of_day(day()).await.unwrap();

    let ranked: Vec<(&str, Option<u32>)> = best
        .iter()
        .map(|s| (s.instrument.as_str(), s.best_of_day_rank))
        .collect();
    assert_eq!(ranked, vec![("A", Some(1)), ("B", Some(2)), ("C", Some(2))]);
    assert!(best.iter().all(|s| s.valid));

    let feed = SignalFeed::new(pool.clone(), Duration::hours(24));
    assert_eq!(feed.best_of_day(day()).await.unwrap(), best);

    let slots = feed.slots_for_day(day()).await.unwrap();
    assert_eq!(slots.len(), 2);
    let members: Vec<Vec<&str>> = slots
        .iter()
        .map(|d| d.signals.iter().map(|s| s.instrument.as_str()).collect())
        .collect();
    assert_eq!(members, vec![vec!["A", "C"], vec!["B", "D"]]);

    let again = lifecycle.best_of_day(day()).await.unwrap();
    assert_eq!(again, best);
}

#[tokio::test]
async fn test_untouched_signal_expires_instead_of_executing() {
    let pool = temp_pool().await;
    let created = at(4, 0);
    scheduler(&pool)
        .fill_slot(slot(4), &[scored("A", 0.9, created)], 2, created)
        .await
        .unwrap();
    seed_m15(&pool, "A", at(3, 45), at(9, 0), None).await;

    let lifecycle = LifecycleManager::new(pool.clone(), candle_verifier(&pool), lifecycle_config());
    assert!(lifecycle.execution_sweep(at(9, 0)).await.unwrap().is_empty());
    let expired = lifecycle.expire_sweep(at(9, 0)).await.unwrap();
    assert_eq!(expired.len(), 1);

    let stored = SignalRepository::for_date(&pool, day()).await.unwrap();
    assert_eq!(stored[0].status, SignalStatus::Expired);
    assert!(!stored[0].executed);
    assert_eq!(stored[0].profit_or_loss, None);
}

#[tokio::test]
async fn test_target_touched_after_expiry_is_not_an_execution() {
    let pool = temp_pool().await;
    let created = at(4, 0);
    scheduler(&pool)
        .fill_slot(slot(4), &[scored("A", 0.9, created), scored("B", 0.8, created)], 2, created)
        .await
        .unwrap();
    seed_m15(&pool, "A", at(3, 45), at(14, 0), Some(at(10, 0))).await;
    seed_m15(&pool, "B", at(3, 45), at(14, 0), Some(at(6, 0))).await;

    let lifecycle = LifecycleManager::new(pool.clone(), candle_verifier(&pool), lifecycle_config());
    let executed = lifecycle.execution_sweep(at(14, 0)).await.unwrap();
    assert_eq!(executed.len(), 1);
    assert!(matches!(&executed[0], SignalEvent::Executed { instrument, .. } if instrument == "B"));

    let expired = lifecycle.expire_sweep(at(14, 0)).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert!(matches!(&expired[0], SignalEvent::Expired { instrument, .. } if instrument == "A"));

    let stored = SignalRepository::for_date(&pool, day()).await.unwrap();
    let a = stored.iter().find(|s| s.instrument == "A").unwrap();
    assert_eq!(a.status, SignalStatus::Expired);
    assert_eq!(a.execution_price, None);
    let b = stored.iter().find(|s| s.instrument == "B").unwrap();
    assert_eq!(b.status, SignalStatus::Executed);
    assert_eq!(b.executed_at, Some(at(6, 0)));
}
