pub mod eligibility;
pub mod feed;
pub mod lifecycle;
pub mod slot_pass;
pub mod slot_scheduler;

pub use eligibility::EligibilitySync;
pub use feed::{DaySlot, SignalFeed};
pub use lifecycle::LifecycleManager;
pub use slot_pass::{PassSummary, SlotPass};
pub use slot_scheduler::{FillOutcome, SlotScheduler};
