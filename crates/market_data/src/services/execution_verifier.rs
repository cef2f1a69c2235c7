use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{Side, Signal, Timeframe};

use crate::MarketDataError;
use crate::traits::{ExecutionOutcome, ExecutionVerifier, SnapshotProvider};

/// Walks bars from signal creation forward and reports the first level touched.
///
/// When a single bar spans both stop and target the stop wins.
pub struct CandleExecutionVerifier {
    provider: Arc<dyn SnapshotProvider>,
    timeframe: Timeframe,
}

impl CandleExecutionVerifier {
    pub fn new(provider: Arc<dyn SnapshotProvider>) -> Self {
        Self {
            provider,
            timeframe: Timeframe::M15,
        }
    }
}

#[async_trait]
impl ExecutionVerifier for CandleExecutionVerifier {
    async fn verify(
        &self,
        signal: &Signal,
        until: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, MarketDataError> {
        let bar = self.timeframe.duration();
        let candles = self
            .provider
            .get_history(&signal.instrument, self.timeframe, signal.created_at - bar, until)
            .await?;

        // Bars that closed before the signal existed, or opened at or after
        // `until`, cannot fill it.
        let live = candles
            .iter()
            .filter(|c| c.open_time + bar > signal.created_at && c.open_time < until);

        let mut last = None;
        for candle in live {
            let (stop_touched, target_touched) = match signal.side {
                Side::Long => (candle.low <= signal.stop_price, candle.high >= signal.target_price),
                Side::Short => (candle.high >= signal.stop_price, candle.low <= signal.target_price),
            };

            if stop_touched {
                return Ok(ExecutionOutcome::StopHit {
                    price: signal.stop_price,
                    at: candle.open_time,
                });
            }
            if target_touched {
                return Ok(ExecutionOutcome::TargetHit {
                    price: signal.target_price,
                    at: candle.open_time,
                });
            }
            last = Some(candle);
        }

        match (signal.expires_at, last) {
            (Some(expires_at), Some(candle)) if until >= expires_at => Ok(ExecutionOutcome::ClosedAt {
                price: candle.close,
                at: (candle.open_time + bar).min(until),
            }),
            _ => Ok(ExecutionOutcome::StillOpen),
        }
    }
}
