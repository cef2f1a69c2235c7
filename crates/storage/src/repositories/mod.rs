pub mod instrument_repo;
pub mod klines_repo;
pub mod lease_repo;
pub mod signal_repo;
pub mod slot_repo;

pub use instrument_repo::InstrumentRepository;
pub use klines_repo::KlinesRepository;
pub use lease_repo::SqliteLeaseService;
pub use signal_repo::SignalRepository;
pub use slot_repo::{CommitOutcome, SlotRepository};
