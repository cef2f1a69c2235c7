use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scheduler::SchedulerError;
use scheduler::services::SlotPass;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::actors::{Actor, ActorType, ControlMessage};

/// Runs one pass for the current slot on startup, then one at the start of
/// every following slot.
pub struct SlotPassActor {
    id: Uuid,
    pass: Arc<SlotPass>,
    pass_timeout: Duration,
}

impl SlotPassActor {
    pub fn new(pass: Arc<SlotPass>, pass_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            pass,
            pass_timeout,
        }
    }

    async fn run_once(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        // Dropping the pass on timeout rolls back any open transaction; the
        // lease runs out on its own.
        let summary = tokio::time::timeout(self.pass_timeout, self.pass.run(now))
            .await
            .map_err(|_| SchedulerError::Timeout(self.pass_timeout))??;

        debug!(
            "Slot {} report: evaluated={} failures={} skipped={:?}",
            summary.slot, summary.report.evaluated, summary.report.failures, summary.report.skipped
        );
        Ok(())
    }
}

#[async_trait]
impl Actor for SlotPassActor {
    fn name(&self) -> ActorType {
        ActorType::SlotPassActor
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        info!(
            "Starting slot pass loop, one pass every {} minutes",
            self.pass.clock().period().num_minutes()
        );

        loop {
            if let Err(e) = self.run_once().await {
                // Fatal for this pass only; the next slot retries.
                error!("Slot pass failed: {}", e);
                if supervisor_tx
                    .send(ControlMessage::Error(self.id, e.to_string()))
                    .await
                    .is_err()
                {
                    anyhow::bail!("Supervisor channel closed");
                }
            }

            let now = Utc::now();
            let next = self.pass.clock().next_slot_start(now);
            let wait = (next - now).to_std().unwrap_or_default();
            debug!("Next slot pass at {}", next);
            tokio::time::sleep(wait).await;
        }
    }
}
