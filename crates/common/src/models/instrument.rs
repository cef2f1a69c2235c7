use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub active: bool,
    /// Tradable on the execution venue; flipped by the eligibility sync.
    pub eligible: bool,
}

impl Instrument {
    pub fn is_schedulable(&self) -> bool {
        self.active && self.eligible
    }
}
