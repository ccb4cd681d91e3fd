//! Smartify daemon
//!
//! Loads the `smartify:` section of a configuration file, starts every
//! controller it declares on an in-process host, and runs until ctrl-c.
//!
//! Usage: `smartifyd [configuration.yaml]`

use anyhow::{Context as _, Result};
use smartify::{ControllerRegistry, Host};
use smartify_config::load_config;
use smartify_event_bus::EventBus;
use smartify_service_registry::ServiceRegistry;
use smartify_state_store::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG: &str = "configuration.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    info!("Starting Smartify with {}", config_path.display());
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let bus = Arc::new(EventBus::new());
    let states = Arc::new(StateStore::new(bus.clone()));
    let services = Arc::new(ServiceRegistry::new());
    let host = Host::new(bus.clone(), states, services).with_temperature_unit(config.temperature_unit.clone());

    let mut observer = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match observer.recv().await {
                Ok(event) => debug!(
                    entity_id = %event.data.entity_id,
                    state = event.data.new_state.as_ref().map(|s| s.state.as_str()).unwrap_or("-"),
                    "State changed"
                ),
                Err(RecvError::Lagged(skipped)) => warn!("State change log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut registry = ControllerRegistry::new(host);
    registry.load_yaml(&config).await;

    for (unique_id, view) in registry.views() {
        let unique_id = unique_id.to_string();
        let observed = view.clone();
        view.add_listener(move || {
            info!(
                unique_id = %unique_id,
                controller = %observed.name(),
                on = observed.is_on(),
                "Controller is now '{}'",
                observed.state()
            );
        });
    }

    info!("Smartify is running with {} controllers", registry.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    registry.shutdown_all().await;

    Ok(())
}
