use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{Candle, Timeframe};
use tokio::sync::Mutex;
use tracing::debug;

use crate::MarketDataError;
use crate::traits::SnapshotProvider;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    instrument: String,
    timeframe: Timeframe,
    from: DateTime<Utc>,
    as_of: DateTime<Utc>,
}

/// Read-through cache in front of a provider, keyed by (instrument, timeframe, as-of).
///
/// Bounds are snapped to bar opens first (`from` up, `to` down), which selects
/// the same bars, so passes a few seconds apart share an entry. Failed lookups
/// are not cached.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<dyn SnapshotProvider>,
    ttl: Duration,
    cache: Arc<Mutex<HashMap<CacheKey, (Instant, Arc<Vec<Candle>>)>>>,
}

impl SnapshotCache {
    pub fn new(inner: Arc<dyn SnapshotProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl SnapshotProvider for SnapshotCache {
    async fn get_history(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let from = ceil_to_bar(from, timeframe);
        let to = floor_to_bar(to, timeframe);
        let key = CacheKey {
            instrument: instrument.to_string(),
            timeframe,
            from,
            as_of: to,
        };

        {
            let cache = self.cache.lock().await;
            if let Some((stored_at, candles)) = cache.get(&key) {
                if stored_at.elapsed() < self.ttl {
                    return Ok(candles.as_ref().clone());
                }
            }
        }

        let candles = Arc::new(self.inner.get_history(instrument, timeframe, from, to).await?);

        let mut cache = self.cache.lock().await;
        let ttl = self.ttl;
        cache.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        cache.insert(key, (Instant::now(), candles.clone()));
        debug!("Cached {} {} bars for {}", candles.len(), timeframe, instrument);

        Ok(candles.as_ref().clone())
    }
}

fn floor_to_bar(time: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let step = timeframe.duration().num_milliseconds();
    let millis = time.timestamp_millis();
    DateTime::from_timestamp_millis(millis - millis.rem_euclid(step)).unwrap_or(time)
}

fn ceil_to_bar(time: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let floored = floor_to_bar(time, timeframe);
    if floored == time {
        time
    } else {
        floored + timeframe.duration()
    }
}
