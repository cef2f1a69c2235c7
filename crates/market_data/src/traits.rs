use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{Candle, Signal, Timeframe};

use crate::MarketDataError;

/// OHLCV history source. Unknown instruments yield an empty vector, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn get_history(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, MarketDataError>;
}

/// Instruments tradable on the execution venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EligibilitySource: Send + Sync {
    async fn list_eligible_instruments(&self) -> Result<HashSet<String>, MarketDataError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    TargetHit { price: f64, at: DateTime<Utc> },
    StopHit { price: f64, at: DateTime<Utc> },
    StillOpen,
    ClosedAt { price: f64, at: DateTime<Utc> },
}

/// Reports whether price reached a signal's levels in bars opened between its
/// creation and `until` (exclusive).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionVerifier: Send + Sync {
    async fn verify(
        &self,
        signal: &Signal,
        until: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, MarketDataError>;
}
