use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("unexpected response: {0}")]
    Response(String),
}

impl MarketDataError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
