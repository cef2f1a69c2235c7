use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::models::Instrument;
use sqlx::SqlitePool;

use crate::db::to_millis;

pub struct InstrumentRepository;

impl InstrumentRepository {
    /// Registers the configured universe. Rows missing from `ids` are
    /// deactivated; eligibility flags are left alone.
    pub async fn register(
        pool: &SqlitePool,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("UPDATE instruments SET active = 0")
            .execute(&mut *tx)
            .await?;
        for id in ids {
            sqlx::query(
                "INSERT INTO instruments(id, active, eligible, updated_at) VALUES (?, 1, 0, ?) ON CONFLICT(id) DO UPDATE SET active = 1",
            )
            .bind(id)
            .bind(to_millis(now))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Sets `eligible` from the venue's tradable set and returns the ids that lost eligibility.
    pub async fn sync_eligibility(
        pool: &SqlitePool,
        eligible: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let current: Vec<(String, bool)> =
            sqlx::query_as("SELECT id, eligible FROM instruments ORDER BY id")
                .fetch_all(&mut *tx)
                .await?;

        let mut dropped = Vec::new();
        for (id, was_eligible) in current {
            let is_eligible = eligible.contains(&id);
            if is_eligible == was_eligible {
                continue;
            }
            sqlx::query("UPDATE instruments SET eligible = ?, updated_at = ? WHERE id = ?")
                .bind(is_eligible)
                .bind(to_millis(now))
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            if was_eligible {
                dropped.push(id);
            }
        }
        tx.commit().await?;
        Ok(dropped)
    }

    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Instrument>, sqlx::Error> {
        let rows: Vec<(String, bool, bool)> =
            sqlx::query_as("SELECT id, active, eligible FROM instruments ORDER BY id")
                .fetch_all(pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, active, eligible)| Instrument {
                id,
                active,
                eligible,
            })
            .collect())
    }

    /// Active and eligible instruments, the ones a pass evaluates.
    pub async fn list_schedulable(pool: &SqlitePool) -> Result<Vec<Instrument>, sqlx::Error> {
        Ok(Self::list_all(pool)
            .await?
            .into_iter()
            .filter(Instrument::is_schedulable)
            .collect())
    }
}
