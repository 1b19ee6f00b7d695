use std::sync::Arc;

use anyhow::Context;
use log_store::LocalStore;
use logdriver::LogDriver;
use logdriver_plugin::server::{serve, shutdown_driver_on, shutdown_signal};
use logdriver_plugin::{router, PluginConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PluginConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        log_root = %config.log_root.display(),
        "starting log driver plugin"
    );

    let store = LocalStore::new(&config.log_root)
        .with_follow_poll_interval(config.follow_poll_interval);
    let driver = Arc::new(LogDriver::with_fifo_streams(
        Arc::new(store),
        config.driver.clone(),
    ));

    let served = serve(
        router(Arc::clone(&driver)),
        &config.listen,
        shutdown_driver_on(shutdown_signal(), Arc::clone(&driver)),
    )
    .await;
    driver.shutdown().await;
    served.with_context(|| format!("serving plugin API on {}", config.listen))?;

    info!("log driver plugin stopped");
    Ok(())
}
