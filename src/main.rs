use std::sync::Arc;

use tracing::{error, info};

use warden::config::{CONFIG_FILE, Config};
use warden::enforcement::{
    ConnectionRegistry, EnforcementDispatcher, EnforcementService, LocalBroadcaster,
};
use warden::punish::NoopEvents;
use warden::{Error, PunishmentCenter, database, logging};

/// Main function to run the daemon
async fn async_main() -> Result<(), Error> {
    let config = Config::load(CONFIG_FILE).await?;

    logging::init(&config.logging)?;
    logging::log_console(format!("Loaded configuration from {CONFIG_FILE}"));

    let store = database::connect(&config.sql).await?;

    // Enforcement task
    let connections = ConnectionRegistry::new();
    let dispatcher = EnforcementDispatcher::new(connections, Arc::new(LocalBroadcaster))
        .with_store(Arc::clone(&store));
    let (service, enforcement_task) = EnforcementService::start(
        dispatcher,
        config.enforcement.queue_capacity,
        config.enforcement.prune_interval(),
    );

    let center = PunishmentCenter::new(
        Arc::clone(&store),
        Arc::new(service.clone()),
        Arc::new(NoopEvents),
        &config.enforcement,
    );
    info!(?center, "Punishment center ready");

    tokio::signal::ctrl_c().await?;
    logging::log_console("Shutting down".to_string());

    if let Err(e) = service.shutdown().await {
        error!("Failed to stop enforcement task: {e}");
    }
    if let Err(e) = enforcement_task.await {
        error!("Enforcement task panicked: {e}");
    }
    store.close().await;

    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
