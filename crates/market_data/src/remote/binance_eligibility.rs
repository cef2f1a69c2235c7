use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::MarketDataError;
use crate::remote::ExchangeInfoResponse;
use crate::traits::EligibilitySource;

/// Tradable set from the venue's `exchangeInfo` endpoint.
pub struct BinanceEligibilitySource {
    client: Client,
    base_url: String,
    quote_asset: Option<String>,
    max_retries: u32,
}

impl BinanceEligibilitySource {
    pub fn new(base_url: String, quote_asset: Option<String>) -> Result<Self, MarketDataError> {
        Ok(Self {
            client: Client::builder()
                .user_agent("slot_signals/0.1.0")
                .timeout(Duration::from_secs(10))
                .build()?,
            base_url,
            quote_asset,
            max_retries: 3,
        })
    }

    async fn make_request(&self) -> Result<ExchangeInfoResponse, MarketDataError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == 429 {
            return Err(MarketDataError::RateLimited("HTTP 429: Too Many Requests".to_string()));
        }
        if status == 418 {
            return Err(MarketDataError::RateLimited("HTTP 418: IP has been auto-banned".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Response(format!("HTTP {}: {}", status, body)));
        }

        if let Some(used_weight) = response.headers().get("x-mbx-used-weight-1m") {
            match used_weight.to_str().ok().and_then(|w| w.parse::<u32>().ok()) {
                Some(w) if w > 1000 => warn!("High API weight usage: {}", w),
                Some(w) => debug!("Used weights: {}/1200", w),
                None => warn!("Invalid weight header: {:?}", used_weight),
            }
        }

        Ok(response.json::<ExchangeInfoResponse>().await?)
    }
}

#[async_trait]
impl EligibilitySource for BinanceEligibilitySource {
    async fn list_eligible_instruments(&self) -> Result<HashSet<String>, MarketDataError> {
        let mut retry_count = 0;

        loop {
            match self.make_request().await {
                Ok(info) => {
                    let tradable = info.tradable(self.quote_asset.as_deref());
                    debug!("Venue lists {} tradable instruments", tradable.len());
                    return Ok(tradable);
                }
                Err(e) if e.is_rate_limit() && retry_count < self.max_retries => {
                    retry_count += 1;
                    let backoff_seconds = 2_u64.pow(retry_count);
                    warn!(
                        "Rate limited on exchangeInfo, backing off for {} seconds (attempt {}/{})",
                        backoff_seconds, retry_count, self.max_retries
                    );
                    sleep(Duration::from_secs(backoff_seconds)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
