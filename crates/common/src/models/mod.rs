pub mod candidate;
pub mod candle;
pub mod instrument;
pub mod signal;
pub mod skip;
pub mod slot;
pub mod timeframe;

pub use candidate::{Candidate, ScoredCandidate, Side};
pub use candle::{Candle, KlineInsert};
pub use instrument::Instrument;
pub use signal::{NewSignal, Signal, SignalStatus};
pub use skip::{SkipReason, SlotSkipReason};
pub use slot::{Slot, SlotKey, SlotState};
pub use timeframe::Timeframe;

/// Error returned when a stored enum label does not match any variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} label: {value}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}
