pub mod error;
pub mod remote;
pub mod services;
pub mod traits;

pub use error::MarketDataError;
