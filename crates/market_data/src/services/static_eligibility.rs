use std::collections::HashSet;

use async_trait::async_trait;

use crate::MarketDataError;
use crate::traits::EligibilitySource;

/// Fixed tradable set, for offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticEligibilitySource {
    instruments: HashSet<String>,
}

impl StaticEligibilitySource {
    pub fn new<I, S>(instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instruments: instruments.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EligibilitySource for StaticEligibilitySource {
    async fn list_eligible_instruments(&self) -> Result<HashSet<String>, MarketDataError> {
        Ok(self.instruments.clone())
    }
}
