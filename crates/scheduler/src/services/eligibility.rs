use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::events::SignalEvent;
use market_data::traits::EligibilitySource;
use sqlx::SqlitePool;
use storage::repositories::{InstrumentRepository, SignalRepository};
use tracing::{info, warn};

use crate::SchedulerError;
use crate::services::lifecycle::invalidated_event;

pub const INELIGIBLE_REASON: &str = "INELIGIBLE";

/// Mirrors the venue's tradable set into the instrument registry and purges
/// valid signals of instruments that fell out of it.
pub struct EligibilitySync {
    pool: SqlitePool,
    source: Arc<dyn EligibilitySource>,
}

impl EligibilitySync {
    pub fn new(pool: SqlitePool, source: Arc<dyn EligibilitySource>) -> Self {
        Self { pool, source }
    }

    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<Vec<SignalEvent>, SchedulerError> {
        let eligible = self.source.list_eligible_instruments().await?;
        let dropped = InstrumentRepository::sync_eligibility(&self.pool, &eligible, now).await?;
        if !dropped.is_empty() {
            warn!("Instruments no longer eligible: {:?}", dropped);
        }

        let purged = SignalRepository::invalidate_ineligible(&self.pool, INELIGIBLE_REASON).await?;
        if !purged.is_empty() {
            info!("Purged {} signals of ineligible instruments", purged.len());
        }
        Ok(purged.into_iter().map(invalidated_event).collect())
    }
}
