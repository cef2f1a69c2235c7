use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::events::SignalEvent;
use scheduler::SchedulerError;
use scheduler::services::LifecycleManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use uuid::Uuid;

use crate::actors::{Actor, ActorType, ControlMessage, publish};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Stamps executions first so a signal that hit its target before expiring
/// is reported as executed.
pub struct LifecycleActor {
    id: Uuid,
    lifecycle: Arc<LifecycleManager>,
    events: broadcast::Sender<SignalEvent>,
}

impl LifecycleActor {
    pub fn new(lifecycle: Arc<LifecycleManager>, events: broadcast::Sender<SignalEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lifecycle,
            events,
        }
    }

    async fn sweep(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        publish(&self.events, self.lifecycle.execution_sweep(now).await?);
        publish(&self.events, self.lifecycle.expire_sweep(now).await?);
        Ok(())
    }
}

#[async_trait]
impl Actor for LifecycleActor {
    fn name(&self) -> ActorType {
        ActorType::LifecycleActor
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        info!("Starting lifecycle sweeps");

        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep().await {
                error!("Lifecycle sweep failed: {}", e);
                if supervisor_tx
                    .send(ControlMessage::Error(self.id, e.to_string()))
                    .await
                    .is_err()
                {
                    anyhow::bail!("Supervisor channel closed");
                }
            }
        }
    }
}
