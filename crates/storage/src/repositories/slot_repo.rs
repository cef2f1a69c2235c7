use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use common::models::{NewSignal, Signal, Slot, SlotKey, SlotState};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::{date_key, is_unique_violation, parse_date_key, to_millis};
use crate::repositories::SignalRepository;

#[derive(Debug)]
pub enum CommitOutcome {
    Committed(Vec<Signal>),
    /// The slot moved or a uniqueness constraint fired; nothing was written.
    Conflict,
}

pub struct SlotRepository;

impl SlotRepository {
    pub async fn load_or_create(
        pool: &SqlitePool,
        key: SlotKey,
        now: DateTime<Utc>,
    ) -> Result<Slot, sqlx::Error> {
        sqlx::query(
            r#"
                INSERT INTO slots(slot_date, slot_index, state, fill_count, updated_at)
                VALUES (?, ?, 'EMPTY', 0, ?)
                ON CONFLICT(slot_date, slot_index) DO NOTHING
            "#,
        )
        .bind(date_key(key.date))
        .bind(i64::from(key.index))
        .bind(to_millis(now))
        .execute(pool)
        .await?;

        let (state, fill_count): (String, i64) =
            sqlx::query_as("SELECT state, fill_count FROM slots WHERE slot_date = ? AND slot_index = ?")
                .bind(date_key(key.date))
                .bind(i64::from(key.index))
                .fetch_one(pool)
                .await?;

        Ok(Slot {
            key,
            state: state
                .parse::<SlotState>()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            fill_count: u32::try_from(fill_count).unwrap_or(0),
        })
    }

    pub async fn for_date(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<Slot>, sqlx::Error> {
        let rows: Vec<(String, i64, String, i64)> = sqlx::query_as(
            "SELECT slot_date, slot_index, state, fill_count FROM slots WHERE slot_date = ? ORDER BY slot_index ASC",
        )
        .bind(date_key(date))
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|(slot_date, index, state, fill_count)| {
                Ok(Slot {
                    key: SlotKey::new(parse_date_key(&slot_date)?, u32::try_from(index).unwrap_or(0)),
                    state: state
                        .parse::<SlotState>()
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    fill_count: u32::try_from(fill_count).unwrap_or(0),
                })
            })
            .collect()
    }

    /// Instruments already holding a signal on `date`, in any slot.
    pub async fn day_ledger(pool: &SqlitePool, date: NaiveDate) -> Result<HashSet<String>, sqlx::Error> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT instrument FROM day_ledger WHERE ledger_date = ?")
            .bind(date_key(date))
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Writes the signals, their day-ledger rows and the new slot state atomically.
    ///
    /// The slot update is a compare-and-set on `expected_fill`; a mismatch or a
    /// uniqueness violation rolls everything back and yields `Conflict`.
    pub async fn commit_fill(
        pool: &SqlitePool,
        key: SlotKey,
        expected_fill: u32,
        capacity: u32,
        signals: &[NewSignal],
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome, sqlx::Error> {
        let new_fill = expected_fill + signals.len() as u32;
        let state = SlotState::for_fill(new_fill, capacity);

        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            r#"
                UPDATE slots SET fill_count = ?, state = ?, updated_at = ?
                WHERE slot_date = ? AND slot_index = ? AND fill_count = ? AND state <> 'CLOSED'
            "#,
        )
        .bind(i64::from(new_fill))
        .bind(state.as_str())
        .bind(to_millis(now))
        .bind(date_key(key.date))
        .bind(i64::from(key.index))
        .bind(i64::from(expected_fill))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            debug!("Slot {} moved past fill {} before commit", key, expected_fill);
            tx.rollback().await?;
            return Ok(CommitOutcome::Conflict);
        }

        let mut inserted = Vec::with_capacity(signals.len());
        for new in signals {
            let signal = match SignalRepository::insert(&mut *tx, new).await {
                Ok(signal) => signal,
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback().await?;
                    return Ok(CommitOutcome::Conflict);
                }
                Err(e) => return Err(e),
            };

            let ledger = sqlx::query(
                "INSERT INTO day_ledger(ledger_date, instrument, signal_id) VALUES (?, ?, ?)",
            )
            .bind(date_key(key.date))
            .bind(&signal.instrument)
            .bind(signal.id)
            .execute(&mut *tx)
            .await;

            match ledger {
                Ok(_) => inserted.push(signal),
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback().await?;
                    return Ok(CommitOutcome::Conflict);
                }
                Err(e) => return Err(e),
            }
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed(inserted))
    }
}
