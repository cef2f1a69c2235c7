use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{ParseLabelError, ScoredCandidate, Side, SlotKey, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStatus {
    Valid,
    Expired,
    Executed,
    Invalidated,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Expired => "EXPIRED",
            Self::Executed => "EXECUTED",
            Self::Invalidated => "INVALIDATED",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALID" => Ok(Self::Valid),
            "EXPIRED" => Ok(Self::Expired),
            "EXECUTED" => Ok(Self::Executed),
            "INVALIDATED" => Ok(Self::Invalidated),
            other => Err(ParseLabelError {
                kind: "signal status",
                value: other.to_string(),
            }),
        }
    }
}

/// A candidate that won a slot, with its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub instrument: String,
    pub side: Side,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_price: f64,
    pub timeframe: Timeframe,
    pub confidence: f64,
    pub quality: f64,
    pub risk_reward: f64,
    pub score: f64,
    pub rationale: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub slot_date: NaiveDate,
    pub slot_index: u32,
    pub valid: bool,
    pub status: SignalStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub executed: bool,
    pub execution_price: Option<f64>,
    pub executed_at: Option<DateTime<Utc>>,
    pub profit_or_loss: Option<f64>,
    pub best_of_day_rank: Option<u32>,
    pub invalidation_reason: Option<String>,
}

impl Signal {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.slot_date, self.slot_index)
    }

    /// In-memory twin of the active-signal SQL predicate in the signal repository.
    pub fn is_active(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.valid
            && match self.expires_at {
                Some(expires_at) => expires_at > now,
                None => self.created_at > now - max_age,
            }
    }

    /// Percentage return of closing at `exit_price`, signed by side.
    pub fn profit_pct(&self, exit_price: f64) -> f64 {
        let raw = (exit_price - self.entry_price) / self.entry_price * 100.0;
        match self.side {
            Side::Long => raw,
            Side::Short => -raw,
        }
    }
}

/// Insert payload for a signal won in a slot pass.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub scored: ScoredCandidate,
    pub slot: SlotKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
