// src/main.rs
//! Simulated Management Agent Engine
//!
//! Loads agent definitions, optionally starts them all, and serves until
//! interrupted.

use anyhow::{Context, Result};
use snmpsim_engine::model::AgentDefinition;
use snmpsim_engine::observability::{init_metrics, init_tracing};
use snmpsim_engine::protocol::UdpEngine;
use snmpsim_engine::runtime::{AgentProcessManager, AgentRuntimeConfig};
use snmpsim_engine::storage::{AgentQuery, AgentStore, MemoryStore, SqliteStore};
use snmpsim_engine::utils::config::EngineConfig;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    info!("Starting snmpsim engine v{}", snmpsim_engine::VERSION);

    let store: Arc<dyn AgentStore> = if config.storage.in_memory {
        info!("Using in-memory agent store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::open(&config.storage.path).await?)
    };

    if let Some(seed) = &config.agents.seed_file {
        seed_store(store.as_ref(), seed).await?;
    }

    let manager = AgentProcessManager::new(
        store,
        Arc::new(UdpEngine::new()),
        AgentRuntimeConfig::from(&config),
    );
    manager.load().await?;

    if config.agents.autostart {
        manager.start_all().await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal, stopping agents...");

    manager.shutdown().await;
    info!("Engine stopped");
    Ok(())
}

/// Load YAML definitions into an empty store
async fn seed_store(store: &dyn AgentStore, path: &Path) -> Result<()> {
    if store.query(&AgentQuery::all().page(0, 1)).await?.total_count > 0 {
        return Ok(());
    }

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {:?}", path))?;
    let definitions: Vec<AgentDefinition> = serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid seed file {:?}", path))?;

    let mut seeded = 0;
    for definition in definitions {
        if let Err(e) = definition.validate() {
            warn!("Skipping seed agent '{}': {}", definition.name, e);
            continue;
        }
        store.create(definition).await?;
        seeded += 1;
    }

    info!("Seeded {} agent(s) from {:?}", seeded, path);
    Ok(())
}
