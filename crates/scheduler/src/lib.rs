pub mod error;
pub mod services;
pub mod slot;

pub use error::SchedulerError;
