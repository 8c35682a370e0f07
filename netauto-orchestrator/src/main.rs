use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod repository;
pub mod service;

use crate::api::AppState;
use crate::config::Config;
use crate::repository::{
    AuditStore, ChatCompletionsProvider, DeviceDriver, InMemoryAuditStore, InventoryDeviceDriver,
    ProviderRegistry,
};
use crate::service::{CommandExecutor, NotificationHub, PipelineOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netauto_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting NetAuto Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // LLM providers
    let providers = Arc::new(ProviderRegistry::new());
    match config.provider_settings() {
        Some(settings) => {
            let name = settings.kind.name();
            let provider = ChatCompletionsProvider::new(settings)
                .context("Failed to create LLM provider")?;
            tracing::info!("Registered LLM provider {} (model {})", name, provider.model());
            providers.register(name, Arc::new(provider));
        }
        None => tracing::warn!("LLM_API_KEY not set; pipelines will run without an LLM provider"),
    }

    // Devices
    let devices: Arc<dyn DeviceDriver> = match &config.device_inventory {
        Some(path) => Arc::new(
            InventoryDeviceDriver::from_file(path, config.device_connect_timeout)
                .context("Failed to load device inventory")?,
        ),
        None => {
            tracing::warn!("DEVICE_INVENTORY not set; no devices are available");
            Arc::new(InventoryDeviceDriver::empty(config.device_connect_timeout))
        }
    };

    let audit: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());
    let hub = Arc::new(NotificationHub::new());

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        providers.clone(),
        devices.clone(),
        audit.clone(),
        hub.clone(),
    ));
    let commands = Arc::new(CommandExecutor::new(devices, audit.clone(), hub.clone()));

    if config.cleanup_interval.is_zero() {
        tracing::info!("Pipeline cleanup sweep disabled");
    } else {
        tracing::info!(
            "Sweeping completed pipelines every {:?}",
            config.cleanup_interval
        );
        orchestrator.spawn_cleanup_task(config.cleanup_interval);
    }

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        orchestrator,
        hub,
        commands,
        providers,
        audit,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
