use chrono::{DateTime, Utc};
use common::models::{Candle, KlineInsert, Timeframe};
use sqlx::SqlitePool;

use crate::db::{from_millis, to_millis};

pub struct KlinesRepository;

impl KlinesRepository {
    /// Upserts bars; a bar re-sent while still open replaces the stored one.
    pub async fn insert_batch(pool: &SqlitePool, klines: &[KlineInsert]) -> Result<(), sqlx::Error> {
        if klines.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await?;

        for kline in klines {
            sqlx::query(
                r#"
                    INSERT INTO klines (
                        instrument, interval, start_time, close_time, open_price, close_price,
                        high_price, low_price, volume
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(instrument, interval, start_time) DO UPDATE SET
                        close_time = excluded.close_time,
                        open_price = excluded.open_price,
                        close_price = excluded.close_price,
                        high_price = excluded.high_price,
                        low_price = excluded.low_price,
                        volume = excluded.volume
                "#,
            )
            .bind(&kline.instrument)
            .bind(kline.interval.as_str())
            .bind(kline.start_time)
            .bind(kline.close_time)
            .bind(kline.open_price)
            .bind(kline.close_price)
            .bind(kline.high_price)
            .bind(kline.low_price)
            .bind(kline.volume)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Bars opened in `[from, to]`, oldest first.
    pub async fn fetch_range(
        pool: &SqlitePool,
        instrument: &str,
        interval: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, sqlx::Error> {
        let rows: Vec<(i64, f64, f64, f64, f64, f64)> = sqlx::query_as(
            r#"
                SELECT start_time, open_price, high_price, low_price, close_price, volume
                FROM klines
                WHERE instrument = ? AND interval = ? AND start_time >= ? AND start_time <= ?
                ORDER BY start_time ASC
            "#,
        )
        .bind(instrument)
        .bind(interval.as_str())
        .bind(to_millis(from))
        .bind(to_millis(to))
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(start, open, high, low, close, volume)| Candle {
                open_time: from_millis(start),
                open,
                high,
                low,
                close,
                volume,
            })
            .collect())
    }
}
