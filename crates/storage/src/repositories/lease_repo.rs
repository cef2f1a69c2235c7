use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::lease::{LeaseError, LeaseService};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::db::to_millis;

/// Leases kept in the shared database, so every worker pointed at the same
/// file contends on the same rows.
#[derive(Clone)]
pub struct SqliteLeaseService {
    pool: SqlitePool,
    holder: String,
}

impl SqliteLeaseService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            holder: Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
impl LeaseService for SqliteLeaseService {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| LeaseError::Unavailable(e.to_string()))?;

        // Only an expired row may be taken over.
        let result = sqlx::query(
            r#"
                INSERT INTO slot_leases(lease_key, holder, expires_at) VALUES (?, ?, ?)
                ON CONFLICT(lease_key) DO UPDATE SET
                    holder = excluded.holder,
                    expires_at = excluded.expires_at
                WHERE slot_leases.expires_at <= ?
            "#,
        )
        .bind(key)
        .bind(&self.holder)
        .bind(to_millis(now + ttl))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(|e| LeaseError::Unavailable(e.to_string()))?;

        let acquired = result.rows_affected() == 1;
        debug!("Lease {} acquired={} by {}", key, acquired, self.holder);
        Ok(acquired)
    }

    async fn release(&self, key: &str) -> Result<(), LeaseError> {
        sqlx::query("DELETE FROM slot_leases WHERE lease_key = ? AND holder = ?")
            .bind(key)
            .bind(&self.holder)
            .execute(&self.pool)
            .await
            .map_err(|e| LeaseError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
