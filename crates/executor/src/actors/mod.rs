pub mod best_of_day_actor;
pub mod eligibility_actor;
pub mod lifecycle_actor;
pub mod slot_pass_actor;
pub mod supervisor;

pub use common::actors::{Actor, ActorType, ControlMessage};

use common::events::SignalEvent;
use tokio::sync::broadcast;

/// Publishes to every subscriber; having none is not an error.
pub(crate) fn publish(tx: &broadcast::Sender<SignalEvent>, events: Vec<SignalEvent>) {
    for event in events {
        let _ = tx.send(event);
    }
}
