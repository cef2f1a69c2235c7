use chrono::{DateTime, Utc};
use common::events::SignalEvent;
use common::models::SlotKey;
use sqlx::SqlitePool;
use storage::repositories::InstrumentRepository;
use strategy::services::{EvaluationReport, StrategyService};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::SchedulerError;
use crate::services::lifecycle::invalidated_event;
use crate::services::{EligibilitySync, FillOutcome, SlotScheduler};
use crate::slot::SlotClock;

#[derive(Debug, Clone)]
pub struct PassSummary {
    pub slot: SlotKey,
    pub report: EvaluationReport,
    pub outcome: FillOutcome,
    pub purged: usize,
    pub superseded: usize,
}

/// One scheduling pass: eligibility refresh, evaluation over the schedulable
/// universe, slot fill, integrity sweep.
pub struct SlotPass {
    pool: SqlitePool,
    eligibility: EligibilitySync,
    strategy: StrategyService,
    scheduler: SlotScheduler,
    clock: SlotClock,
    capacity: u32,
    events: broadcast::Sender<SignalEvent>,
}

impl SlotPass {
    pub fn new(
        pool: SqlitePool,
        eligibility: EligibilitySync,
        strategy: StrategyService,
        scheduler: SlotScheduler,
        clock: SlotClock,
        capacity: u32,
        events: broadcast::Sender<SignalEvent>,
    ) -> Self {
        Self {
            pool,
            eligibility,
            strategy,
            scheduler,
            clock,
            capacity,
            events,
        }
    }

    pub fn clock(&self) -> &SlotClock {
        &self.clock
    }

    /// Runs the pass for the slot `now` falls in.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<PassSummary, SchedulerError> {
        self.run_for(self.clock.slot_for(now), now).await
    }

    pub async fn run_for(&self, key: SlotKey, now: DateTime<Utc>) -> Result<PassSummary, SchedulerError> {
        let purged = match self.eligibility.refresh(now).await {
            Ok(events) => {
                let purged = events.len();
                self.publish(events);
                purged
            }
            Err(SchedulerError::MarketData(e)) => {
                warn!("Eligibility source unavailable, using stored flags: {}", e);
                0
            }
            Err(e) => return Err(e),
        };

        let instruments: Vec<String> = InstrumentRepository::list_schedulable(&self.pool)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();

        let (candidates, report) = self.strategy.candidate_pool(&instruments, now).await;
        let outcome = self
            .scheduler
            .fill_slot(key, &candidates, self.capacity, now)
            .await?;
        self.publish(outcome.filled.iter().cloned().map(SignalEvent::Filled));

        let superseded = self.scheduler.integrity_sweep().await?;
        let superseded_count = superseded.len();
        self.publish(superseded.into_iter().map(invalidated_event));

        info!(
            "Pass for slot {}: {} instruments, {} candidates, {} filled, skipped={}",
            key,
            instruments.len(),
            candidates.len(),
            outcome.filled.len(),
            outcome.skipped.map(|r| r.as_str()).unwrap_or("-")
        );

        Ok(PassSummary {
            slot: key,
            report,
            outcome,
            purged,
            superseded: superseded_count,
        })
    }

    fn publish(&self, events: impl IntoIterator<Item = SignalEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}
