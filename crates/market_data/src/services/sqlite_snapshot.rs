use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{Candle, Timeframe};
use sqlx::SqlitePool;
use storage::repositories::KlinesRepository;

use crate::MarketDataError;
use crate::traits::SnapshotProvider;

/// Serves history from the `klines` table filled by the ingestion side.
#[derive(Clone)]
pub struct SqliteSnapshotProvider {
    pool: SqlitePool,
}

impl SqliteSnapshotProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotProvider for SqliteSnapshotProvider {
    async fn get_history(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, MarketDataError> {
        Ok(KlinesRepository::fetch_range(&self.pool, instrument, timeframe, from, to).await?)
    }
}
