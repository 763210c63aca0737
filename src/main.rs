use anyhow::Result;
use nereus::Config;
use nereus::logging::init_logging;
use nereus::persistence::PersistenceManager;
use nereus::pricing::UnitPrice;
use nereus::provider::ThamesWaterClient;
use nereus::scheduler::{FireSchedule, Scheduler, SyncCommand};
use nereus::statistics::StatisticsStore;
use nereus::sync::SyncService;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    init_logging(&config.logging)?;

    info!("Nereus water meter sync starting up");

    let mut state = PersistenceManager::new(&config.storage.state_file);
    if let Err(e) = state.load() {
        warn!("Could not load sync state, starting fresh: {}", e);
    }

    let initial_price = match state.unit_price_override() {
        Some(price) if config.pricing.validate_liter_cost(price).is_ok() => price,
        _ => config.pricing.liter_cost,
    };
    let price = Arc::new(UnitPrice::new(&config.pricing, initial_price)?);

    let store = Arc::new(StatisticsStore::open(&config.storage.statistics_file).await?);
    let client = Arc::new(ThamesWaterClient::new(&config.account, &config.fetch)?);

    let service = Arc::new(SyncService::new(
        &config,
        client.clone(),
        client,
        store,
        state,
        price,
    )?);
    if let Err(e) = service.load_status().await {
        warn!("Could not read stored totals: {}", e);
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SyncCommand>();
    let scheduler = Scheduler::new(
        service,
        FireSchedule::from_config(&config)?,
        config.sync.run_on_startup,
        cmd_rx,
    );

    let signal_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_tx.send(SyncCommand::Shutdown).ok();
        }
    });

    match scheduler.run().await {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Scheduler failed with error: {}", e);
            Err(anyhow::anyhow!("Scheduler error: {}", e))
        }
    }
}
