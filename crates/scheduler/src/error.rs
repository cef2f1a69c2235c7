use common::lease::LeaseError;
use market_data::MarketDataError;
use thiserror::Error;

/// Infrastructure failures that abort a pass. Ordinary outcomes such as a held
/// lease or a full slot are reported as `SlotSkipReason`, not here.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("lease error: {0}")]
    Lease(#[from] LeaseError),
    #[error("market data error: {0}")]
    MarketData(#[from] MarketDataError),
    #[error("pass timed out after {0:?}")]
    Timeout(std::time::Duration),
}
