pub mod execution_verifier;
pub mod snapshot_cache;
pub mod sqlite_snapshot;
pub mod static_eligibility;

pub use execution_verifier::CandleExecutionVerifier;
pub use snapshot_cache::SnapshotCache;
pub use sqlite_snapshot::SqliteSnapshotProvider;
pub use static_eligibility::StaticEligibilitySource;
