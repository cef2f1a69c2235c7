use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use common::config::LifecycleConfig;
use common::events::SignalEvent;
use common::models::{Side, Signal};
use market_data::traits::{ExecutionOutcome, ExecutionVerifier};
use sqlx::SqlitePool;
use storage::repositories::SignalRepository;
use tracing::{debug, info, warn};

use crate::SchedulerError;
use crate::services::slot_scheduler::SUPERSEDED_REASON;

/// Moves signals out of VALID and maintains the best-of-day ranking.
pub struct LifecycleManager {
    pool: SqlitePool,
    verifier: Arc<dyn ExecutionVerifier>,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(pool: SqlitePool, verifier: Arc<dyn ExecutionVerifier>, config: LifecycleConfig) -> Self {
        Self {
            pool,
            verifier,
            config,
        }
    }

    pub async fn active(&self, now: DateTime<Utc>) -> Result<Vec<Signal>, SchedulerError> {
        Ok(SignalRepository::active(&self.pool, now, self.config.max_age).await?)
    }

    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> Result<Vec<SignalEvent>, SchedulerError> {
        let expired = SignalRepository::expire_due(&self.pool, now, self.config.max_age).await?;
        if !expired.is_empty() {
            info!("Expired {} signals", expired.len());
        }
        Ok(expired
            .into_iter()
            .map(|s| SignalEvent::Expired {
                id: s.id,
                instrument: s.instrument,
            })
            .collect())
    }

    /// Asks the verifier about every valid signal and stamps the ones whose
    /// target or stop was touched before the signal's deadline. A verifier
    /// error skips that signal only; an untouched past-due signal is left to
    /// `expire_sweep`.
    pub async fn execution_sweep(&self, now: DateTime<Utc>) -> Result<Vec<SignalEvent>, SchedulerError> {
        let mut events = Vec::new();

        for signal in SignalRepository::valid(&self.pool).await? {
            let until = now.min(self.deadline(&signal));
            let outcome = match self.verifier.verify(&signal, until).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Could not verify signal #{} {}: {}", signal.id, signal.instrument, e);
                    continue;
                }
            };

            let (price, at) = match outcome {
                ExecutionOutcome::TargetHit { price, at } | ExecutionOutcome::StopHit { price, at } => {
                    (price, at)
                }
                ExecutionOutcome::ClosedAt { .. } | ExecutionOutcome::StillOpen => continue,
            };

            let profit_or_loss = signal.profit_pct(price);
            if SignalRepository::mark_executed(&self.pool, signal.id, price, at, profit_or_loss).await? {
                debug!("Signal #{} executed at {} ({:+.2}%)", signal.id, price, profit_or_loss);
                events.push(SignalEvent::Executed {
                    id: signal.id,
                    instrument: signal.instrument,
                    price,
                    profit_or_loss,
                });
            }
        }

        if !events.is_empty() {
            info!("Execution sweep stamped {} signals", events.len());
        }
        Ok(events)
    }

    /// End of a signal's life: its explicit expiry, or creation plus the max age.
    fn deadline(&self, signal: &Signal) -> DateTime<Utc> {
        signal
            .expires_at
            .unwrap_or(signal.created_at + self.config.max_age)
    }

    /// Invalidates valid signals of `instrument`/`side` for which a newer,
    /// better-scored valid signal exists.
    pub async fn supersede(&self, instrument: &str, side: Side) -> Result<Vec<SignalEvent>, SchedulerError> {
        let same: Vec<Signal> = SignalRepository::valid(&self.pool)
            .await?
            .into_iter()
            .filter(|s| s.instrument == instrument && s.side == side)
            .collect();

        let stale: Vec<i64> = same
            .iter()
            .filter(|s| {
                same.iter()
                    .any(|newer| newer.created_at > s.created_at && newer.score > s.score)
            })
            .map(|s| s.id)
            .collect();

        let invalidated = SignalRepository::invalidate(&self.pool, &stale, SUPERSEDED_REASON).await?;
        Ok(invalidated.into_iter().map(invalidated_event).collect())
    }

    /// Dense-ranks the top N signals of `date` by score and returns them in rank
    /// order. Touches only the rank column.
    pub async fn best_of_day(&self, date: NaiveDate) -> Result<Vec<Signal>, SchedulerError> {
        let mut signals = SignalRepository::for_date(&self.pool, date).await?;
        signals.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.instrument.cmp(&b.instrument))
                .then(a.id.cmp(&b.id))
        });
        signals.truncate(self.config.best_of_day_top_n);

        let ranks = dense_ranks(&signals);
        SignalRepository::replace_best_of_day(&self.pool, date, &ranks).await?;
        Ok(SignalRepository::best_of_day(&self.pool, date).await?)
    }
}

/// Equal scores share a rank; the next distinct score takes the next integer.
fn dense_ranks(sorted: &[Signal]) -> Vec<(i64, u32)> {
    let mut ranks = Vec::with_capacity(sorted.len());
    let mut rank = 0u32;
    let mut previous: Option<f64> = None;
    for signal in sorted {
        if previous != Some(signal.score) {
            rank += 1;
            previous = Some(signal.score);
        }
        ranks.push((signal.id, rank));
    }
    ranks
}

pub fn invalidated_event(signal: Signal) -> SignalEvent {
    SignalEvent::Invalidated {
        id: signal.id,
        reason: signal.invalidation_reason.unwrap_or_default(),
        instrument: signal.instrument,
    }
}
