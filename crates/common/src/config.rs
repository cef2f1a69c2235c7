use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Slot cadence and capacity. The per-day cap is `capacity * slots_per_day`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub capacity: u32,
    pub slots_per_day: u32,
}

impl SchedulerConfig {
    pub fn slot_period(&self) -> Duration {
        Duration::minutes(24 * 60 / i64::from(self.slots_per_day.max(1)))
    }

    pub fn daily_cap(&self) -> u32 {
        self.capacity * self.slots_per_day
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            slots_per_day: 24,
        }
    }
}

/// Rule parameters for the multi-timeframe candidate generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub history_bars: usize,
    pub trend_fast_period: usize,
    pub trend_slow_period: usize,
    pub rsi_period: usize,
    pub rsi_neutral_low: f64,
    pub rsi_neutral_high: f64,
    pub breakout_lookback: usize,
    pub pivot_strength: usize,
    pub fallback_stop_pct: f64,
    pub fallback_target_pct: f64,
    pub min_risk_reward: f64,
    pub base_confidence: f64,
    pub extremity_weight: f64,
    pub confirmation_bonus: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            history_bars: 120,
            trend_fast_period: 20,
            trend_slow_period: 50,
            rsi_period: 14,
            rsi_neutral_low: 45.0,
            rsi_neutral_high: 55.0,
            breakout_lookback: 20,
            pivot_strength: 3,
            fallback_stop_pct: 2.0,
            fallback_target_pct: 4.0,
            min_risk_reward: 1.5,
            base_confidence: 0.4,
            extremity_weight: 0.3,
            confirmation_bonus: 0.1,
        }
    }
}

/// Weights of the composite ranking score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub confidence: f64,
    pub quality: f64,
    pub risk_reward: f64,
    /// Upper bound on `risk_reward * ratio`.
    pub reward_cap: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            quality: 0.3,
            risk_reward: 0.2,
            reward_cap: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    pub window: Duration,
    pub price_tolerance_pct: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: Duration::minutes(60),
            price_tolerance_pct: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Explicit expiry stamped on new signals; `None` leaves `expires_at` unset.
    pub signal_ttl: Option<Duration>,
    /// Age after which a signal without `expires_at` stops being active.
    pub max_age: Duration,
    pub best_of_day_top_n: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            signal_ttl: Some(Duration::minutes(240)),
            max_age: Duration::hours(24),
            best_of_day_top_n: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityConfig {
    pub base_url: String,
    pub quote_asset: Option<String>,
    pub refresh_interval: StdDuration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_folder: String,
    pub instruments: Vec<String>,
    pub scheduler: SchedulerConfig,
    pub generator: GeneratorConfig,
    pub weights: ScoreWeights,
    pub dedup: DedupConfig,
    pub lifecycle: LifecycleConfig,
    pub eligibility: EligibilityConfig,
    pub evaluation_concurrency: usize,
    pub snapshot_cache_ttl: StdDuration,
    pub pass_timeout: StdDuration,
    pub telegram: Option<TelegramConfig>,
}

const DEFAULT_INSTRUMENTS: &str = "BTCUSDT,ETHUSDT,BNBUSDT,SOLUSDT,XRPUSDT,ADAUSDT,AVAXUSDT,DOGEUSDT,DOTUSDT,NEARUSDT";

impl Settings {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_folder = lookup("WORKDIR").ok_or(ConfigError::Missing("WORKDIR"))?;

        let instruments = lookup("INSTRUMENTS")
            .unwrap_or_else(|| DEFAULT_INSTRUMENTS.to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let scheduler = SchedulerConfig {
            capacity: parse_or(&lookup, "SLOT_CAPACITY", 5)?,
            slots_per_day: parse_or(&lookup, "SLOTS_PER_DAY", 24)?,
        };
        if scheduler.capacity == 0 {
            return Err(invalid("SLOT_CAPACITY", "0", "capacity must be positive"));
        }
        if scheduler.slots_per_day == 0 || 1440 % scheduler.slots_per_day != 0 {
            return Err(invalid(
                "SLOTS_PER_DAY",
                &scheduler.slots_per_day.to_string(),
                "must divide a day into whole minutes",
            ));
        }

        let mut generator = GeneratorConfig::default();
        generator.min_risk_reward = parse_or(&lookup, "MIN_RISK_REWARD", generator.min_risk_reward)?;
        generator.rsi_neutral_low = parse_or(&lookup, "RSI_NEUTRAL_LOW", generator.rsi_neutral_low)?;
        generator.rsi_neutral_high = parse_or(&lookup, "RSI_NEUTRAL_HIGH", generator.rsi_neutral_high)?;
        for (key, bound) in [
            ("RSI_NEUTRAL_LOW", generator.rsi_neutral_low),
            ("RSI_NEUTRAL_HIGH", generator.rsi_neutral_high),
        ] {
            if !(bound > 0.0 && bound < 100.0) {
                return Err(invalid(key, &bound.to_string(), "must lie strictly between 0 and 100"));
            }
        }
        if generator.rsi_neutral_low >= generator.rsi_neutral_high {
            return Err(invalid(
                "RSI_NEUTRAL_LOW",
                &generator.rsi_neutral_low.to_string(),
                "must be below RSI_NEUTRAL_HIGH",
            ));
        }

        let dedup = DedupConfig {
            window: Duration::minutes(parse_or(&lookup, "DEDUP_WINDOW_MINUTES", 60)?),
            price_tolerance_pct: parse_or(&lookup, "DEDUP_PRICE_TOLERANCE_PCT", 1.0)?,
        };

        let ttl_minutes: i64 = parse_or(&lookup, "SIGNAL_TTL_MINUTES", 240)?;
        let lifecycle = LifecycleConfig {
            signal_ttl: (ttl_minutes > 0).then(|| Duration::minutes(ttl_minutes)),
            max_age: Duration::hours(parse_or(&lookup, "SIGNAL_MAX_AGE_HOURS", 24)?),
            best_of_day_top_n: parse_or(&lookup, "BEST_OF_DAY_TOP_N", 10)?,
        };

        let eligibility = EligibilityConfig {
            base_url: lookup("BINANCE_BASE_URL")
                .unwrap_or_else(|| "https://api.binance.com".to_string()),
            quote_asset: lookup("ELIGIBILITY_QUOTE_ASSET").filter(|s| !s.is_empty()),
            refresh_interval: StdDuration::from_secs(parse_or(
                &lookup,
                "ELIGIBILITY_REFRESH_SECS",
                900,
            )?),
        };

        let telegram = match (lookup("TELEGRAM_BOT_TOKEN"), lookup("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                token,
                chat_id: chat_id
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid("TELEGRAM_CHAT_ID", &chat_id, e))?,
            }),
            _ => None,
        };

        Ok(Self {
            data_folder,
            instruments,
            scheduler,
            generator,
            weights: ScoreWeights::default(),
            dedup,
            lifecycle,
            eligibility,
            evaluation_concurrency: parse_or(&lookup, "EVALUATION_CONCURRENCY", 8)?,
            snapshot_cache_ttl: StdDuration::from_secs(parse_or(
                &lookup,
                "SNAPSHOT_CACHE_TTL_SECS",
                60,
            )?),
            pass_timeout: StdDuration::from_secs(parse_or(&lookup, "PASS_TIMEOUT_SECS", 120)?),
            telegram,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(key, &raw, e)),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
