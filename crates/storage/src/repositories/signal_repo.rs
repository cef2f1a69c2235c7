use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::models::{NewSignal, Side, Signal, SignalStatus, Timeframe};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::db::{date_key, from_millis, parse_date_key, to_millis};

/// Active signal: valid, and either unexpired or (without expiry) younger than the max age.
/// Binds: now, max-age cutoff.
const ACTIVE_PREDICATE: &str = "valid = 1 AND ((expires_at IS NOT NULL AND expires_at > ?) OR (expires_at IS NULL AND created_at > ?))";

/// Complement of `ACTIVE_PREDICATE` among valid signals. Binds: now, max-age cutoff.
const EXPIRED_PREDICATE: &str = "valid = 1 AND ((expires_at IS NOT NULL AND expires_at <= ?) OR (expires_at IS NULL AND created_at <= ?))";

#[derive(Debug, FromRow)]
struct SignalRow {
    id: i64,
    instrument: String,
    side: String,
    entry_price: f64,
    target_price: f64,
    stop_price: f64,
    timeframe: String,
    confidence: f64,
    quality: f64,
    risk_reward: f64,
    score: f64,
    rationale: String,
    generated_at: i64,
    created_at: i64,
    slot_date: String,
    slot_index: i64,
    valid: bool,
    status: String,
    expires_at: Option<i64>,
    executed: bool,
    execution_price: Option<f64>,
    executed_at: Option<i64>,
    profit_or_loss: Option<f64>,
    best_of_day_rank: Option<i64>,
    invalidation_reason: Option<String>,
}

impl TryFrom<SignalRow> for Signal {
    type Error = sqlx::Error;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        let decode = |e: Box<dyn std::error::Error + Send + Sync>| sqlx::Error::Decode(e);

        Ok(Signal {
            id: row.id,
            side: row.side.parse::<Side>().map_err(|e| decode(Box::new(e)))?,
            timeframe: row.timeframe.parse::<Timeframe>().map_err(|e| decode(Box::new(e)))?,
            status: row.status.parse::<SignalStatus>().map_err(|e| decode(Box::new(e)))?,
            rationale: serde_json::from_str::<Vec<String>>(&row.rationale).map_err(|e| decode(Box::new(e)))?,
            slot_date: parse_date_key(&row.slot_date)?,
            slot_index: u32::try_from(row.slot_index).map_err(|e| decode(Box::new(e)))?,
            instrument: row.instrument,
            entry_price: row.entry_price,
            target_price: row.target_price,
            stop_price: row.stop_price,
            confidence: row.confidence,
            quality: row.quality,
            risk_reward: row.risk_reward,
            score: row.score,
            generated_at: from_millis(row.generated_at),
            created_at: from_millis(row.created_at),
            valid: row.valid,
            expires_at: row.expires_at.map(from_millis),
            executed: row.executed,
            execution_price: row.execution_price,
            executed_at: row.executed_at.map(from_millis),
            profit_or_loss: row.profit_or_loss,
            best_of_day_rank: row.best_of_day_rank.and_then(|r| u32::try_from(r).ok()),
            invalidation_reason: row.invalidation_reason,
        })
    }
}

fn into_signals(rows: Vec<SignalRow>) -> Result<Vec<Signal>, sqlx::Error> {
    rows.into_iter().map(Signal::try_from).collect()
}

pub struct SignalRepository;

impl SignalRepository {
    /// Inserts inside the caller's transaction; the slot row must already exist.
    pub async fn insert(conn: &mut SqliteConnection, new: &NewSignal) -> Result<Signal, sqlx::Error> {
        let candidate = &new.scored.candidate;
        let rationale =
            serde_json::to_string(&candidate.rationale).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let row: SignalRow = sqlx::query_as(
            r#"
                INSERT INTO signals (
                    instrument, side, entry_price, target_price, stop_price, timeframe,
                    confidence, quality, risk_reward, score, rationale, generated_at,
                    created_at, slot_date, slot_index, valid, status, expires_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 'VALID', ?)
                RETURNING *
            "#,
        )
        .bind(&candidate.instrument)
        .bind(candidate.side.as_str())
        .bind(candidate.entry_price)
        .bind(candidate.target_price)
        .bind(candidate.stop_price)
        .bind(candidate.timeframe.as_str())
        .bind(candidate.confidence)
        .bind(candidate.quality)
        .bind(candidate.risk_reward)
        .bind(new.scored.score)
        .bind(rationale)
        .bind(to_millis(candidate.generated_at))
        .bind(to_millis(new.created_at))
        .bind(date_key(new.slot.date))
        .bind(i64::from(new.slot.index))
        .bind(new.expires_at.map(to_millis))
        .fetch_one(&mut *conn)
        .await?;

        row.try_into()
    }

    /// Every signal currently surfaced as active, best score first.
    pub async fn active(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Vec<Signal>, sqlx::Error> {
        let rows: Vec<SignalRow> = sqlx::query_as(&format!(
            "SELECT * FROM signals WHERE {} ORDER BY score DESC, instrument ASC, id ASC",
            ACTIVE_PREDICATE
        ))
        .bind(to_millis(now))
        .bind(to_millis(now - max_age))
        .fetch_all(pool)
        .await?;
        into_signals(rows)
    }

    pub async fn valid(pool: &SqlitePool) -> Result<Vec<Signal>, sqlx::Error> {
        let rows: Vec<SignalRow> =
            sqlx::query_as("SELECT * FROM signals WHERE valid = 1 ORDER BY id ASC")
                .fetch_all(pool)
                .await?;
        into_signals(rows)
    }

    pub async fn for_date(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<Signal>, sqlx::Error> {
        let rows: Vec<SignalRow> = sqlx::query_as(
            "SELECT * FROM signals WHERE slot_date = ? ORDER BY slot_index ASC, score DESC, id ASC",
        )
        .bind(date_key(date))
        .fetch_all(pool)
        .await?;
        into_signals(rows)
    }

    pub async fn count_for_instrument_on(
        pool: &SqlitePool,
        instrument: &str,
        date: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM signals WHERE instrument = ? AND slot_date = ?")
            .bind(instrument)
            .bind(date_key(date))
            .fetch_one(pool)
            .await
    }

    /// Flips every past-due valid signal to EXPIRED and returns them.
    pub async fn expire_due(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Vec<Signal>, sqlx::Error> {
        let rows: Vec<SignalRow> = sqlx::query_as(&format!(
            "UPDATE signals SET valid = 0, status = 'EXPIRED' WHERE {} RETURNING *",
            EXPIRED_PREDICATE
        ))
        .bind(to_millis(now))
        .bind(to_millis(now - max_age))
        .fetch_all(pool)
        .await?;
        into_signals(rows)
    }

    /// One-shot: only a still-valid, unexecuted signal can be stamped.
    pub async fn mark_executed(
        pool: &SqlitePool,
        id: i64,
        price: f64,
        executed_at: DateTime<Utc>,
        profit_or_loss: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
                UPDATE signals
                SET executed = 1, execution_price = ?, executed_at = ?, profit_or_loss = ?,
                    valid = 0, status = 'EXECUTED'
                WHERE id = ? AND valid = 1 AND executed = 0
            "#,
        )
        .bind(price)
        .bind(to_millis(executed_at))
        .bind(profit_or_loss)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Invalidates the given signals in one transaction; returns the ones that were still valid.
    pub async fn invalidate(
        pool: &SqlitePool,
        ids: &[i64],
        reason: &str,
    ) -> Result<Vec<Signal>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = pool.begin().await?;
        let mut invalidated = Vec::with_capacity(ids.len());
        for id in ids {
            let row: Option<SignalRow> = sqlx::query_as(
                r#"
                    UPDATE signals SET valid = 0, status = 'INVALIDATED', invalidation_reason = ?
                    WHERE id = ? AND valid = 1
                    RETURNING *
                "#,
            )
            .bind(reason)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = row {
                invalidated.push(row.try_into()?);
            }
        }
        tx.commit().await?;
        Ok(invalidated)
    }

    /// Invalidates valid signals whose instrument is registered but no longer eligible.
    pub async fn invalidate_ineligible(pool: &SqlitePool, reason: &str) -> Result<Vec<Signal>, sqlx::Error> {
        let rows: Vec<SignalRow> = sqlx::query_as(
            r#"
                UPDATE signals SET valid = 0, status = 'INVALIDATED', invalidation_reason = ?
                WHERE valid = 1 AND instrument IN (SELECT id FROM instruments WHERE eligible = 0)
                RETURNING *
            "#,
        )
        .bind(reason)
        .fetch_all(pool)
        .await?;
        into_signals(rows)
    }

    /// Replaces the best-of-day ranks of `date` with `ranks` (signal id, dense rank).
    pub async fn replace_best_of_day(
        pool: &SqlitePool,
        date: NaiveDate,
        ranks: &[(i64, u32)],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE signals SET best_of_day_rank = NULL WHERE slot_date = ?")
            .bind(date_key(date))
            .execute(&mut *tx)
            .await?;

        for (id, rank) in ranks {
            sqlx::query("UPDATE signals SET best_of_day_rank = ? WHERE id = ? AND slot_date = ?")
                .bind(i64::from(*rank))
                .bind(id)
                .bind(date_key(date))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn best_of_day(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<Signal>, sqlx::Error> {
        let rows: Vec<SignalRow> = sqlx::query_as(
            r#"
                SELECT * FROM signals
                WHERE slot_date = ? AND best_of_day_rank IS NOT NULL
                ORDER BY best_of_day_rank ASC, score DESC, instrument ASC
            "#,
        )
        .bind(date_key(date))
        .fetch_all(pool)
        .await?;
        into_signals(rows)
    }
}
