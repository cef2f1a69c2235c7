use std::collections::HashSet;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub quote_asset: String,
    #[serde(default = "default_true")]
    pub is_spot_trading_allowed: bool,
}

fn default_true() -> bool {
    true
}

impl ExchangeInfoResponse {
    /// Symbols currently in `TRADING` status, optionally restricted to one quote asset.
    pub fn tradable(&self, quote_asset: Option<&str>) -> HashSet<String> {
        self.symbols
            .iter()
            .filter(|s| s.status == "TRADING" && s.is_spot_trading_allowed)
            .filter(|s| quote_asset.is_none_or(|q| s.quote_asset.eq_ignore_ascii_case(q)))
            .map(|s| s.symbol.to_uppercase())
            .collect()
    }
}
