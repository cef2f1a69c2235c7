use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ParseLabelError, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            other => Err(ParseLabelError {
                kind: "side",
                value: other.to_string(),
            }),
        }
    }
}

/// A proposed trade produced by one evaluation pass. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub instrument: String,
    pub side: Side,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_price: f64,
    /// Timeframe the entry was confirmed on.
    pub timeframe: Timeframe,
    pub confidence: f64,
    pub quality: f64,
    pub risk_reward: f64,
    pub generated_at: DateTime<Utc>,
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn instrument(&self) -> &str {
        &self.candidate.instrument
    }
}
