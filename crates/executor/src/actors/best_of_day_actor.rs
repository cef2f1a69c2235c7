use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Utc};
use scheduler::SchedulerError;
use scheduler::services::{LifecycleManager, SignalFeed};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::actors::{Actor, ActorType, ControlMessage};

const RANK_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Re-ranks today and yesterday so the last slots of a day are ranked after
/// midnight too.
pub struct BestOfDayActor {
    id: Uuid,
    lifecycle: Arc<LifecycleManager>,
    feed: Arc<SignalFeed>,
}

impl BestOfDayActor {
    pub fn new(lifecycle: Arc<LifecycleManager>, feed: Arc<SignalFeed>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lifecycle,
            feed,
        }
    }

    async fn rank(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let today = now.date_naive();
        if let Some(yesterday) = today.checked_sub_days(Days::new(1)) {
            self.lifecycle.best_of_day(yesterday).await?;
        }

        let best = self.lifecycle.best_of_day(today).await?;
        if let Some(top) = best.first() {
            info!("Best of {}: {} {} (score {:.3})", today, top.instrument, top.side, top.score);
        }

        let active = self.feed.active(now).await?;
        debug!("{} ranked, {} active signals", best.len(), active.len());
        Ok(())
    }
}

#[async_trait]
impl Actor for BestOfDayActor {
    fn name(&self) -> ActorType {
        ActorType::BestOfDayActor
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        info!("Starting best-of-day ranking");

        let mut interval = tokio::time::interval(RANK_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = self.rank().await {
                error!("Best-of-day ranking failed: {}", e);
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
