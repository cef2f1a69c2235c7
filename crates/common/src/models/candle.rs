use chrono::{DateTime, Utc};

use super::Timeframe;

/// One OHLCV bar as served by a snapshot provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A bar as written to the `klines` table by the ingestion side.
#[derive(Debug, Clone)]
pub struct KlineInsert {
    pub instrument: String,
    pub interval: Timeframe,
    pub start_time: i64,
    pub close_time: i64,
    pub open_price: f64,
    pub close_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: f64,
}
