use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::config::GeneratorConfig;
use common::models::{Candidate, Candle, Side, SkipReason, Timeframe};
use market_data::traits::SnapshotProvider;
use tracing::debug;

use crate::indicators::{self, Pivots, Trend};

/// Bars per timeframe as of one evaluation instant.
#[derive(Debug, Clone, Default)]
pub struct MultiTimeframeSnapshot {
    frames: BTreeMap<Timeframe, Vec<Candle>>,
}

impl MultiTimeframeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timeframe: Timeframe, candles: Vec<Candle>) {
        self.frames.insert(timeframe, candles);
    }

    pub fn get(&self, timeframe: Timeframe) -> &[Candle] {
        self.frames.get(&timeframe).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Stop and target around an entry, with the ratio they imply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub stop: f64,
    pub target: f64,
    pub risk_reward: f64,
}

const BIAS_TIMEFRAMES: [Timeframe; 2] = [Timeframe::D1, Timeframe::H4];
const CONFIRMATION_TIMEFRAMES: [Timeframe; 2] = [Timeframe::H1, Timeframe::M15];
const CHECKS_PER_TIMEFRAME: usize = 3;

#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    config: GeneratorConfig,
}

impl CandidateGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Fetches and evaluates one instrument.
    pub async fn evaluate(
        &self,
        provider: &dyn SnapshotProvider,
        instrument: &str,
        now: DateTime<Utc>,
    ) -> Result<Candidate, SkipReason> {
        let snapshot = self.fetch_snapshot(provider, instrument, now).await?;
        self.evaluate_snapshot(instrument, &snapshot, now)
    }

    pub async fn fetch_snapshot(
        &self,
        provider: &dyn SnapshotProvider,
        instrument: &str,
        now: DateTime<Utc>,
    ) -> Result<MultiTimeframeSnapshot, SkipReason> {
        let mut snapshot = MultiTimeframeSnapshot::new();
        let bars = i32::try_from(self.config.history_bars).unwrap_or(i32::MAX);

        for timeframe in Timeframe::ALL {
            let from = now - timeframe.duration() * bars;
            let candles = provider
                .get_history(instrument, timeframe, from, now)
                .await
                .map_err(|e| SkipReason::ProviderError(e.to_string()))?;
            snapshot.insert(timeframe, candles);
        }
        Ok(snapshot)
    }

    /// Rules over an already-fetched snapshot. Deterministic for a given input.
    pub fn evaluate_snapshot(
        &self,
        instrument: &str,
        snapshot: &MultiTimeframeSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Candidate, SkipReason> {
        let cfg = &self.config;
        self.check_history(snapshot)?;

        let side = self.bias(snapshot)?;
        let mut rationale = vec![format!("bias:{}", side.as_str().to_lowercase())];

        let mut fired = 0usize;
        let mut confirming = Vec::new();
        let mut extremity: f64 = 0.0;

        for timeframe in CONFIRMATION_TIMEFRAMES {
            let candles = snapshot.get(timeframe);
            let mut confirmed = false;

            if indicators::breakout(candles, cfg.breakout_lookback, side) {
                fired += 1;
                confirmed = true;
                rationale.push(format!("breakout:{}", timeframe));
            }

            if let Some(rsi) = indicators::rsi(candles, cfg.rsi_period) {
                let beyond = match side {
                    Side::Long => (rsi - cfg.rsi_neutral_high) / (100.0 - cfg.rsi_neutral_high),
                    Side::Short => (cfg.rsi_neutral_low - rsi) / cfg.rsi_neutral_low,
                };
                if beyond > 0.0 {
                    fired += 1;
                    confirmed = true;
                    extremity = extremity.max(beyond.clamp(0.0, 1.0));
                    rationale.push(format!("rsi:{}", timeframe));
                }
            }

            if let Some(pattern) = indicators::entry_pattern(candles, side) {
                fired += 1;
                confirmed = true;
                rationale.push(format!("pattern:{}:{}", pattern.as_str(), timeframe));
            }

            if confirmed {
                confirming.push(timeframe);
            }
        }

        // The finest confirming timeframe is the one the entry is taken on.
        let Some(entry_timeframe) = confirming.iter().min().copied() else {
            return Err(SkipReason::NoConfirmation);
        };

        let entry = snapshot
            .get(Timeframe::M15)
            .last()
            .map(|c| c.close)
            .ok_or(SkipReason::InsufficientHistory {
                timeframe: Timeframe::M15,
                bars: 0,
            })?;

        let pivots = indicators::pivots(snapshot.get(Timeframe::H1), cfg.pivot_strength);
        let levels = price_levels(side, entry, &pivots, cfg)?;
        if levels.risk_reward < cfg.min_risk_reward {
            return Err(SkipReason::PoorRiskReward {
                ratio: levels.risk_reward,
            });
        }

        let confidence = (cfg.base_confidence
            + cfg.extremity_weight * extremity
            + cfg.confirmation_bonus * confirming.len() as f64)
            .clamp(0.0, 1.0);
        let quality = fired as f64 / (CHECKS_PER_TIMEFRAME * CONFIRMATION_TIMEFRAMES.len()) as f64;

        debug!(
            "{} {} candidate: entry={:.4} stop={:.4} target={:.4} rr={:.2} conf={:.2}",
            instrument, side, entry, levels.stop, levels.target, levels.risk_reward, confidence
        );

        Ok(Candidate {
            instrument: instrument.to_string(),
            side,
            entry_price: entry,
            target_price: levels.target,
            stop_price: levels.stop,
            timeframe: entry_timeframe,
            confidence,
            quality,
            risk_reward: levels.risk_reward,
            generated_at: now,
            rationale,
        })
    }

    fn check_history(&self, snapshot: &MultiTimeframeSnapshot) -> Result<(), SkipReason> {
        let cfg = &self.config;
        let lower_min = (cfg.rsi_period + 1)
            .max(cfg.breakout_lookback + 1)
            .max(2 * cfg.pivot_strength + 1);

        for timeframe in Timeframe::ALL {
            let required = if BIAS_TIMEFRAMES.contains(&timeframe) {
                cfg.trend_slow_period
            } else {
                lower_min
            };
            let bars = snapshot.get(timeframe).len();
            if bars < required {
                return Err(SkipReason::InsufficientHistory { timeframe, bars });
            }
        }
        Ok(())
    }

    fn bias(&self, snapshot: &MultiTimeframeSnapshot) -> Result<Side, SkipReason> {
        let cfg = &self.config;
        let trends: Vec<Option<Trend>> = BIAS_TIMEFRAMES
            .iter()
            .map(|tf| indicators::trend(snapshot.get(*tf), cfg.trend_fast_period, cfg.trend_slow_period))
            .collect();

        match trends.as_slice() {
            [Some(Trend::Bullish), Some(Trend::Bullish)] => Ok(Side::Long),
            [Some(Trend::Bearish), Some(Trend::Bearish)] => Ok(Side::Short),
            _ => Err(SkipReason::NoBias),
        }
    }
}

/// Stop at the nearest opposing pivot, target at the nearest favourable one,
/// each falling back to a fixed percentage offset from entry.
pub fn price_levels(
    side: Side,
    entry: f64,
    pivots: &Pivots,
    cfg: &GeneratorConfig,
) -> Result<Levels, SkipReason> {
    let stop_offset = entry * cfg.fallback_stop_pct / 100.0;
    let target_offset = entry * cfg.fallback_target_pct / 100.0;

    let (stop, target) = match side {
        Side::Long => (
            pivots.support_below(entry).unwrap_or(entry - stop_offset),
            pivots.resistance_above(entry).unwrap_or(entry + target_offset),
        ),
        Side::Short => (
            pivots.resistance_above(entry).unwrap_or(entry + stop_offset),
            pivots.support_below(entry).unwrap_or(entry - target_offset),
        ),
    };

    let ordered = match side {
        Side::Long => stop < entry && entry < target,
        Side::Short => target < entry && entry < stop,
    };
    if !entry.is_finite() || !ordered {
        return Err(SkipReason::InvalidLevels);
    }

    let risk = (entry - stop).abs();
    let reward = (target - entry).abs();
    Ok(Levels {
        stop,
        target,
        risk_reward: reward / risk,
    })
}
