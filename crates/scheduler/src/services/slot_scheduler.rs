use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::LifecycleConfig;
use common::lease::LeaseService;
use common::models::{NewSignal, ScoredCandidate, Side, Signal, SlotKey, SlotSkipReason};
use sqlx::SqlitePool;
use storage::repositories::{CommitOutcome, SignalRepository, SlotRepository};
use tracing::{debug, info, warn};

use crate::SchedulerError;

pub const SUPERSEDED_REASON: &str = "SUPERSEDED";

#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub filled: Vec<Signal>,
    pub skipped: Option<SlotSkipReason>,
}

impl FillOutcome {
    fn skipped(reason: SlotSkipReason) -> Self {
        Self {
            filled: Vec::new(),
            skipped: Some(reason),
        }
    }
}

/// Fills slots from a ranked, deduplicated candidate pool.
///
/// Per slot key the work is serialized by a lease; the write itself is one
/// transaction guarded by a compare-and-set on the slot's fill count and by the
/// day-ledger primary key.
pub struct SlotScheduler {
    pool: SqlitePool,
    lease: Arc<dyn LeaseService>,
    lease_ttl: Duration,
    lifecycle: LifecycleConfig,
}

impl SlotScheduler {
    pub fn new(
        pool: SqlitePool,
        lease: Arc<dyn LeaseService>,
        lease_ttl: Duration,
        lifecycle: LifecycleConfig,
    ) -> Self {
        Self {
            pool,
            lease,
            lease_ttl,
            lifecycle,
        }
    }

    pub async fn fill_slot(
        &self,
        key: SlotKey,
        candidates: &[ScoredCandidate],
        capacity: u32,
        now: DateTime<Utc>,
    ) -> Result<FillOutcome, SchedulerError> {
        let lease_key = key.lease_key();
        if !self.lease.try_acquire(&lease_key, self.lease_ttl).await? {
            info!("Slot {} is being filled elsewhere, skipping", key);
            return Ok(FillOutcome::skipped(SlotSkipReason::Locked));
        }

        let result = self.fill_locked(key, candidates, capacity, now).await;

        if let Err(e) = self.lease.release(&lease_key).await {
            warn!("Failed to release lease {}: {}. It will lapse on expiry", lease_key, e);
        }
        result
    }

    async fn fill_locked(
        &self,
        key: SlotKey,
        candidates: &[ScoredCandidate],
        capacity: u32,
        now: DateTime<Utc>,
    ) -> Result<FillOutcome, SchedulerError> {
        let slot = SlotRepository::load_or_create(&self.pool, key, now).await?;
        if slot.fill_count >= capacity {
            debug!("Slot {} already holds {} signals", key, slot.fill_count);
            return Ok(FillOutcome::skipped(SlotSkipReason::SlotFull));
        }

        let excluded = SlotRepository::day_ledger(&self.pool, key.date).await?;
        let remaining = (capacity - slot.fill_count) as usize;
        let expires_at = self.lifecycle.signal_ttl.map(|ttl| now + ttl);

        let mut chosen = HashSet::new();
        let picks: Vec<NewSignal> = candidates
            .iter()
            .filter(|c| !excluded.contains(c.instrument()))
            .filter(|c| chosen.insert(c.instrument().to_string()))
            .take(remaining)
            .map(|c| NewSignal {
                scored: c.clone(),
                slot: key,
                created_at: now,
                expires_at,
            })
            .collect();

        if picks.is_empty() {
            debug!(
                "Slot {}: no candidates left after excluding {} instruments",
                key,
                excluded.len()
            );
            return Ok(FillOutcome::skipped(SlotSkipReason::NoEligibleCandidates));
        }

        match SlotRepository::commit_fill(&self.pool, key, slot.fill_count, capacity, &picks, now).await? {
            CommitOutcome::Committed(filled) => {
                info!(
                    "Slot {} filled with {} signals ({} / {})",
                    key,
                    filled.len(),
                    slot.fill_count as usize + filled.len(),
                    capacity
                );
                Ok(FillOutcome {
                    filled,
                    skipped: None,
                })
            }
            CommitOutcome::Conflict => {
                info!("Slot {} commit lost a race, retrying next cadence", key);
                Ok(FillOutcome::skipped(SlotSkipReason::RaceLost))
            }
        }
    }

    /// Keeps only the most recent valid signal per (instrument, side) and
    /// invalidates the rest. Returns what was invalidated.
    pub async fn integrity_sweep(&self) -> Result<Vec<Signal>, SchedulerError> {
        let valid = SignalRepository::valid(&self.pool).await?;

        let mut groups: BTreeMap<(String, Side), Vec<Signal>> = BTreeMap::new();
        for signal in valid {
            groups
                .entry((signal.instrument.clone(), signal.side))
                .or_default()
                .push(signal);
        }

        let stale: Vec<i64> = groups
            .into_values()
            .filter(|group| group.len() > 1)
            .flat_map(|mut group| {
                group.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
                group.into_iter().skip(1).map(|s| s.id)
            })
            .collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let invalidated = SignalRepository::invalidate(&self.pool, &stale, SUPERSEDED_REASON).await?;
        info!("Integrity sweep invalidated {} superseded signals", invalidated.len());
        Ok(invalidated)
    }
}
