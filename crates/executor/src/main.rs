use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use common::actors::ActorType;
use common::config::Settings;
use common::events::SignalEvent;
use common::lease::LeaseService;
use common::logger;
use market_data::remote::BinanceEligibilitySource;
use market_data::services::{CandleExecutionVerifier, SnapshotCache, SqliteSnapshotProvider};
use market_data::traits::{EligibilitySource, SnapshotProvider};
use scheduler::services::{EligibilitySync, LifecycleManager, SignalFeed, SlotPass, SlotScheduler};
use scheduler::slot::SlotClock;
use storage::db;
use storage::repositories::{InstrumentRepository, SqliteLeaseService};
use strategy::generator::CandidateGenerator;
use strategy::services::StrategyService;

use crate::actors::best_of_day_actor::BestOfDayActor;
use crate::actors::eligibility_actor::EligibilityActor;
use crate::actors::lifecycle_actor::LifecycleActor;
use crate::actors::slot_pass_actor::SlotPassActor;
use crate::actors::supervisor::Supervisor;
use crate::services::telegram_service::TelegramService;

mod actors;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logger();
    let settings = Settings::from_env()?;
    debug!("System starting up...");

    let pool = db::open_pool(&settings.data_folder).await?;
    InstrumentRepository::register(&pool, &settings.instruments, Utc::now()).await?;
    info!(
        "Universe of {} instruments, {} slots/day x {} signals",
        settings.instruments.len(),
        settings.scheduler.slots_per_day,
        settings.scheduler.capacity
    );

    let (events_tx, _) = broadcast::channel::<SignalEvent>(1_000);
    if let Some(telegram) = &settings.telegram {
        let telegram_svc = TelegramService::new(telegram);
        tokio::spawn(telegram_svc.start(events_tx.subscribe()));
    }

    let klines: Arc<dyn SnapshotProvider> = Arc::new(SqliteSnapshotProvider::new(pool.clone()));
    let snapshots: Arc<dyn SnapshotProvider> =
        Arc::new(SnapshotCache::new(klines.clone(), settings.snapshot_cache_ttl));
    let source: Arc<dyn EligibilitySource> = Arc::new(BinanceEligibilitySource::new(
        settings.eligibility.base_url.clone(),
        settings.eligibility.quote_asset.clone(),
    )?);
    let lease: Arc<dyn LeaseService> = Arc::new(SqliteLeaseService::new(pool.clone()));
    let clock = SlotClock::new(settings.scheduler.clone());

    let strategy = StrategyService::new(
        CandidateGenerator::new(settings.generator.clone()),
        snapshots,
        settings.weights,
        settings.dedup.clone(),
    )
    .with_concurrency(settings.evaluation_concurrency);

    let slot_scheduler = SlotScheduler::new(
        pool.clone(),
        lease,
        clock.lease_ttl(),
        settings.lifecycle.clone(),
    );

    let pass = Arc::new(SlotPass::new(
        pool.clone(),
        EligibilitySync::new(pool.clone(), source.clone()),
        strategy,
        slot_scheduler,
        clock,
        settings.scheduler.capacity,
        events_tx.clone(),
    ));
    // The verifier reads uncached candles so fresh bars are seen.
    let lifecycle = Arc::new(LifecycleManager::new(
        pool.clone(),
        Arc::new(CandleExecutionVerifier::new(klines)),
        settings.lifecycle.clone(),
    ));
    let eligibility = Arc::new(EligibilitySync::new(pool.clone(), source));
    let feed = Arc::new(SignalFeed::new(pool.clone(), settings.lifecycle.max_age));

    let mut supervisor = Supervisor::new();

    let pass_timeout = settings.pass_timeout;
    supervisor.register_actor(
        ActorType::SlotPassActor,
        Box::new(move || Box::new(SlotPassActor::new(pass.clone(), pass_timeout))),
    );

    let lifecycle_for_sweeps = lifecycle.clone();
    let tx_for_lifecycle = events_tx.clone();
    supervisor.register_actor(
        ActorType::LifecycleActor,
        Box::new(move || {
            Box::new(LifecycleActor::new(
                lifecycle_for_sweeps.clone(),
                tx_for_lifecycle.clone(),
            ))
        }),
    );

    let refresh_interval = settings.eligibility.refresh_interval;
    let tx_for_eligibility = events_tx.clone();
    supervisor.register_actor(
        ActorType::EligibilityActor,
        Box::new(move || {
            Box::new(EligibilityActor::new(
                eligibility.clone(),
                refresh_interval,
                tx_for_eligibility.clone(),
            ))
        }),
    );

    supervisor.register_actor(
        ActorType::BestOfDayActor,
        Box::new(move || Box::new(BestOfDayActor::new(lifecycle.clone(), feed.clone()))),
    );

    supervisor.start().await;
    Ok(())
}
