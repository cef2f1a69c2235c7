use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("lease backend unavailable: {0}")]
    Unavailable(String),
}

/// Time-bounded mutual exclusion shared by every worker process. A lease that
/// is never released lapses after `ttl`.
#[async_trait]
pub trait LeaseService: Send + Sync {
    /// Returns `false` when another holder owns an unexpired lease on `key`.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LeaseError>;

    async fn release(&self, key: &str) -> Result<(), LeaseError>;
}
