use std::fmt;

use super::Timeframe;

/// Why an instrument produced no candidate in a pass.
///
/// Only `ProviderError` counts as a failure; every other variant is an ordinary
/// outcome of the rules.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientHistory { timeframe: Timeframe, bars: usize },
    NoBias,
    NoConfirmation,
    InvalidLevels,
    PoorRiskReward { ratio: f64 },
    ProviderError(String),
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::NoBias => "no_bias",
            Self::NoConfirmation => "no_confirmation",
            Self::InvalidLevels => "invalid_levels",
            Self::PoorRiskReward { .. } => "poor_risk_reward",
            Self::ProviderError(_) => "provider_error",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ProviderError(_))
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory { timeframe, bars } => {
                write!(f, "insufficient history on {} ({} bars)", timeframe, bars)
            }
            Self::NoBias => write!(f, "higher timeframes disagree"),
            Self::NoConfirmation => write!(f, "no lower timeframe confirmation"),
            Self::InvalidLevels => write!(f, "stop/target on the wrong side of entry"),
            Self::PoorRiskReward { ratio } => write!(f, "risk/reward {:.2} below minimum", ratio),
            Self::ProviderError(e) => write!(f, "snapshot provider error: {}", e),
        }
    }
}

/// Why a slot pass wrote nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotSkipReason {
    Locked,
    SlotFull,
    RaceLost,
    NoEligibleCandidates,
}

impl SlotSkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::SlotFull => "SLOT_FULL",
            Self::RaceLost => "RACE_LOST",
            Self::NoEligibleCandidates => "NO_ELIGIBLE_CANDIDATES",
        }
    }
}

impl fmt::Display for SlotSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
