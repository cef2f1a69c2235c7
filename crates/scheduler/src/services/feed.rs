use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::models::{Signal, Slot};
use sqlx::SqlitePool;
use storage::repositories::{SignalRepository, SlotRepository};

use crate::SchedulerError;

#[derive(Debug, Clone, PartialEq)]
pub struct DaySlot {
    pub slot: Slot,
    pub signals: Vec<Signal>,
}

/// Read side offered to consumers.
#[derive(Clone)]
pub struct SignalFeed {
    pool: SqlitePool,
    max_age: Duration,
}

impl SignalFeed {
    pub fn new(pool: SqlitePool, max_age: Duration) -> Self {
        Self { pool, max_age }
    }

    pub async fn active(&self, now: DateTime<Utc>) -> Result<Vec<Signal>, SchedulerError> {
        Ok(SignalRepository::active(&self.pool, now, self.max_age).await?)
    }

    /// Every slot of `date` that was touched, with the signals it holds.
    pub async fn slots_for_day(&self, date: NaiveDate) -> Result<Vec<DaySlot>, SchedulerError> {
        let slots = SlotRepository::for_date(&self.pool, date).await?;
        let mut signals = SignalRepository::for_date(&self.pool, date).await?;

        Ok(slots
            .into_iter()
            .map(|slot| {
                let (mine, rest): (Vec<Signal>, Vec<Signal>) = std::mem::take(&mut signals)
                    .into_iter()
                    .partition(|s| s.slot_index == slot.key.index);
                signals = rest;
                DaySlot { slot, signals: mine }
            })
            .collect())
    }

    pub async fn best_of_day(&self, date: NaiveDate) -> Result<Vec<Signal>, SchedulerError> {
        Ok(SignalRepository::best_of_day(&self.pool, date).await?)
    }
}
