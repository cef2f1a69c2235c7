use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::events::SignalEvent;
use scheduler::services::EligibilitySync;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::actors::{Actor, ActorType, ControlMessage, publish};

/// Keeps the eligibility flags fresh between slot passes.
pub struct EligibilityActor {
    id: Uuid,
    sync: Arc<EligibilitySync>,
    refresh_interval: Duration,
    events: broadcast::Sender<SignalEvent>,
}

impl EligibilityActor {
    pub fn new(
        sync: Arc<EligibilitySync>,
        refresh_interval: Duration,
        events: broadcast::Sender<SignalEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync,
            refresh_interval: refresh_interval.max(Duration::from_secs(1)),
            events,
        }
    }
}

#[async_trait]
impl Actor for EligibilityActor {
    fn name(&self) -> ActorType {
        ActorType::EligibilityActor
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        info!("Refreshing eligibility every {:?}", self.refresh_interval);

        let mut interval = tokio::time::interval(self.refresh_interval);
        loop {
            interval.tick().await;
            match self.sync.refresh(Utc::now()).await {
                Ok(events) => publish(&self.events, events),
                Err(e) => {
                    // Stored flags stay in force until the source answers again.
                    warn!("Eligibility refresh failed: {}", e);
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
}
