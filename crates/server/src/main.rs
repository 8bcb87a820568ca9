mod bootstrap;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rolecall_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Application;
use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use rolecall_core::config::LogFormat::*;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let Application { config, store, index, admin, router_pool, gateway, startup_report } = app;

    for failure in &startup_report.failures {
        tracing::info!(
            event_name = "system.server.menu_unavailable",
            correlation_id = "bootstrap",
            menu_key = %failure.menu_key(),
            reason = failure.reason(),
            "persisted role menu is not live"
        );
    }

    health::spawn(
        &config.server.bind_address,
        config.server.health_check_port,
        HealthState::new(store, index),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.gateway_transport_mode",
        transport_mode = if gateway.is_noop_transport() { "noop" } else { "gateway" },
        correlation_id = "bootstrap",
        "gateway runner transport mode initialized"
    );

    let gateway_task = tokio::spawn(async move { gateway.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "rolecall-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "rolecall-server stopping"
    );

    // The gateway task owns the dispatcher and its handle on the router pool.
    gateway_task.abort();
    let _ = gateway_task.await;
    drop(admin);

    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
    match Arc::try_unwrap(router_pool) {
        Ok(pool) => {
            if tokio::time::timeout(grace, pool.shutdown()).await.is_err() {
                tracing::warn!(
                    event_name = "system.server.drain_timeout",
                    correlation_id = "shutdown",
                    grace_secs = grace.as_secs(),
                    "reaction router did not drain before the grace period ended"
                );
            }
        }
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_skipped",
            correlation_id = "shutdown",
            "reaction router still shared; queued reactions are dropped"
        ),
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
