use std::fmt;

use crate::models::Signal;

/// Lifecycle notifications broadcast to downstream consumers.
#[derive(Debug, Clone)]
pub enum SignalEvent {
    Filled(Signal),
    Expired { id: i64, instrument: String },
    Executed {
        id: i64,
        instrument: String,
        price: f64,
        profit_or_loss: f64,
    },
    Invalidated {
        id: i64,
        instrument: String,
        reason: String,
    },
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filled(s) => write!(
                f,
                "NEW {} {} @ {:.6} | TP {:.6} | SL {:.6} | RR {:.2} | slot {}",
                s.side,
                s.instrument,
                s.entry_price,
                s.target_price,
                s.stop_price,
                s.risk_reward,
                s.slot_key()
            ),
            Self::Expired { id, instrument } => write!(f, "EXPIRED #{} {}", id, instrument),
            Self::Executed {
                id,
                instrument,
                price,
                profit_or_loss,
            } => write!(
                f,
                "EXECUTED #{} {} @ {:.6} ({:+.2}%)",
                id, instrument, price, profit_or_loss
            ),
            Self::Invalidated {
                id,
                instrument,
                reason,
            } => write!(f, "INVALIDATED #{} {} ({})", id, instrument, reason),
        }
    }
}
