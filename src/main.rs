//! WorldState Engine - Opens a world and reports what it holds
//!
//! Collaborators (front ends, game-system modules, transports) embed the
//! library. The binary opens the configured world with the standard modules
//! so a database can be created or inspected from the command line.

use std::sync::Arc;

use anyhow::Context;

use worldstate_engine::domain::entities::RegistryKind;
use worldstate_engine::domain::events::EventFilter;
use worldstate_engine::infrastructure::config::EngineConfig;
use worldstate_engine::infrastructure::logging::init_tracing;
use worldstate_engine::modules::CoreComponentsModule;
use worldstate_engine::{StateEngine, WorldModule};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config_path = std::env::args().nth(1);
    let config = EngineConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.log_filter);

    tracing::info!("Starting WorldState Engine");
    tracing::info!("  World: {}", config.world_name);
    tracing::info!("  Database: {}", config.database_url);

    let modules: Vec<Arc<dyn WorldModule>> = vec![Arc::new(CoreComponentsModule)];
    let engine = StateEngine::open(config, modules)
        .await
        .context("Failed to open world")?;

    for kind in RegistryKind::ALL {
        let names: Vec<_> = engine
            .registry()
            .list(kind)
            .into_iter()
            .map(|registration| registration.type_name.as_str())
            .collect();
        tracing::info!("  {} types: {}", kind, names.join(", "));
    }

    let active = engine.count_entities().await?;
    let deleted = engine.list_deleted_entities().await?;
    let recent = engine.get_events(&EventFilter::default().limit(5)).await?;
    tracing::info!("World holds {} active entities ({} deleted)", active, deleted.len());
    for event in recent {
        tracing::info!("  {} {}", event.timestamp.to_rfc3339(), event.event_type);
    }

    engine.close().await;
    Ok(())
}
