use std::sync::Arc;

use rolecall_core::config::{AppConfig, ConfigError, LoadOptions};
use rolecall_core::{
    BindingStore, EventRouter, LiveIndex, MenuAdministration, PlatformError, ReconcileOptions,
    ReconcileReport, Reconciler, RolePlatform, RouterOptions, RouterPool, StoreError,
};
use rolecall_db::open_store;
use rolecall_discord::commands::AdminGate;
use rolecall_discord::events::engine_dispatcher;
use rolecall_discord::{
    DiscordRestClient, GatewayRunner, GatewayTransport, NoopGatewayTransport, ReconnectPolicy,
    ReplySink,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn BindingStore>,
    pub index: Arc<LiveIndex>,
    pub admin: Arc<MenuAdministration>,
    pub router_pool: Arc<RouterPool>,
    pub gateway: GatewayRunner,
    pub startup_report: ReconcileReport,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("binding store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("discord client setup failed: {0}")]
    Platform(#[from] PlatformError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let client = Arc::new(DiscordRestClient::new(&config.discord)?);
    bootstrap_with(config, client.clone(), client, Arc::new(NoopGatewayTransport)).await
}

/// Loads every persisted menu, reconciles it against the platform and wires
/// the router and gateway. A store that cannot be read aborts startup.
pub async fn bootstrap_with(
    config: AppConfig,
    platform: Arc<dyn RolePlatform>,
    replies: Arc<dyn ReplySink>,
    transport: Arc<dyn GatewayTransport>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        store_backend = config.store.backend.as_str(),
        "starting application bootstrap"
    );

    let store = open_store(&config.store).await?;
    let persisted = store.load().await?;
    info!(
        event_name = "system.bootstrap.store_loaded",
        correlation_id = "bootstrap",
        menus = persisted.len(),
        "persisted role menus loaded"
    );

    let reconciler =
        Reconciler::new(Arc::clone(&platform), ReconcileOptions::from(&config.reconcile));
    let index = Arc::new(LiveIndex::new());
    let startup_report = reconciler.reload_into(&persisted, &index).await;

    let router = Arc::new(EventRouter::new(Arc::clone(&index), Arc::clone(&platform)));
    let router_pool = Arc::new(RouterPool::spawn(router, RouterOptions::from(&config.router)));
    let admin = Arc::new(MenuAdministration::new(
        Arc::clone(&store),
        Arc::clone(&index),
        platform,
        reconciler,
    ));

    let dispatcher = engine_dispatcher(
        Arc::clone(&router_pool),
        Arc::clone(&admin),
        &config.discord.command_prefix,
        AdminGate::new(config.discord.admin_role_ids.clone()),
    );
    let gateway = GatewayRunner::new(transport, dispatcher, replies, ReconnectPolicy::default());

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        live_menus = startup_report.loaded,
        dropped_menus = startup_report.dropped_menus(),
        degraded_bindings = startup_report.degraded_bindings(),
        "application bootstrap complete"
    );

    Ok(Application { config, store, index, admin, router_pool, gateway, startup_report })
}
