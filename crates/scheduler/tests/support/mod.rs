#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use common::config::LifecycleConfig;
use common::lease::{LeaseError, LeaseService};
use common::models::{Candidate, KlineInsert, NewSignal, ScoredCandidate, Side, SlotKey, Timeframe};
use mockall::mock;
use scheduler::services::SlotScheduler;
use sqlx::SqlitePool;
use storage::repositories::{KlinesRepository, SqliteLeaseService};

mock! {
    pub Lease {}

    #[async_trait]
    impl LeaseService for Lease {
        async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseError>;
        async fn release(&self, key: &str) -> Result<(), LeaseError>;
    }
}

pub async fn temp_pool() -> SqlitePool {
    let path = std::env::temp_dir().join(format!("scheduler-{}.db", uuid::Uuid::new_v4()));
    storage::db::connect(path.to_str().unwrap()).await.unwrap()
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

pub fn slot(index: u32) -> SlotKey {
    SlotKey::new(day(), index)
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
}

pub fn scored(instrument: &str, score: f64, generated_at: DateTime<Utc>) -> ScoredCandidate {
    ScoredCandidate {
        candidate: Candidate {
            instrument: instrument.to_string(),
            side: Side::Long,
            entry_price: 100.0,
            target_price: 104.0,
            stop_price: 98.0,
            timeframe: Timeframe::M15,
            confidence: score,
            quality: 0.5,
            risk_reward: 2.0,
            generated_at,
            rationale: vec!["bias:long".to_string()],
        },
        score,
    }
}

pub fn new_signal(instrument: &str, key: SlotKey, now: DateTime<Utc>) -> NewSignal {
    NewSignal {
        scored: scored(instrument, 0.5, now),
        slot: key,
        created_at: now,
        expires_at: None,
    }
}

pub fn lifecycle_config() -> LifecycleConfig {
    LifecycleConfig::default()
}

pub fn scheduler_with(pool: &SqlitePool, lease: Arc<dyn LeaseService>) -> SlotScheduler {
    SlotScheduler::new(pool.clone(), lease, Duration::from_secs(3600), lifecycle_config())
}

pub fn scheduler(pool: &SqlitePool) -> SlotScheduler {
    scheduler_with(pool, Arc::new(SqliteLeaseService::new(pool.clone())))
}

/// 120 bars per timeframe ending just before `now`, moving `step` per bar.
pub async fn seed_klines(pool: &SqlitePool, instrument: &str, start: f64, step: f64, now: DateTime<Utc>) {
    let mut klines = Vec::new();
    for timeframe in Timeframe::ALL {
        let bar = timeframe.duration();
        for i in 0..120i32 {
            let open_time = now - bar * (120 - i);
            let close = start + step * f64::from(i);
            klines.push(KlineInsert {
                instrument: instrument.to_string(),
                interval: timeframe,
                start_time: open_time.timestamp_millis(),
                close_time: (open_time + bar).timestamp_millis() - 1,
                open_price: close,
                close_price: close,
                high_price: close + 0.2,
                low_price: close - 0.2,
                volume: 10.0,
            });
        }
    }
    KlinesRepository::insert_batch(pool, &klines).await.unwrap();
}

/// 15m bars for `[from, to)` trading flat around 100. From `spike_at` on the
/// bars reach 105, above the target of `scored` candidates.
pub async fn seed_m15(
    pool: &SqlitePool,
    instrument: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    spike_at: Option<DateTime<Utc>>,
) {
    let bar = Timeframe::M15.duration();
    let mut klines = Vec::new();
    let mut open_time = from;
    while open_time < to {
        let spiked = spike_at.is_some_and(|t| open_time >= t);
        let (high, close) = if spiked { (105.0, 104.5) } else { (100.5, 100.0) };
        klines.push(KlineInsert {
            instrument: instrument.to_string(),
            interval: Timeframe::M15,
            start_time: open_time.timestamp_millis(),
            close_time: (open_time + bar).timestamp_millis() - 1,
            open_price: 100.0,
            close_price: close,
            high_price: high,
            low_price: 99.5,
            volume: 10.0,
        });
        open_time += bar;
    }
    KlinesRepository::insert_batch(pool, &klines).await.unwrap();
}
