pub mod binance_eligibility;
pub mod exchange_info_response;

pub use binance_eligibility::BinanceEligibilitySource;
pub use exchange_info_response::ExchangeInfoResponse;
