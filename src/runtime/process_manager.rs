// src/runtime/process_manager.rs
//! Agent process manager
//!
//! Owns the registry of live runtimes and drives every lifecycle
//! transition. Persistence goes through the `AgentStore`; reported state
//! always comes from the runtime.
//!
//! # Locking
//!
//! ```text
//! runtimes: DashMap<AgentId, Slot>      one async mutex per identity
//!              │ lock slot
//!              ▼
//! port_claims: Mutex<HashMap<u16, PortClaim>>
//!              held across conflict check + bind + claim
//! ```
//!
//! Locks are always taken in that order (slot, then claims), so two
//! identities racing for one port are serialized and neither can bind it
//! while the other holds the claim.

use crate::model::{AgentDefinition, AgentId, AgentState, AgentStatus, Oid};
use crate::protocol::{ProtocolEngine, Varbind};
use crate::runtime::agent_runtime::{AgentRuntime, AgentRuntimeConfig};
use crate::storage::{AgentQuery, AgentStore};
use crate::utils::errors::{EngineError, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-identity runtime slot; `None` once the agent is deleted
type Slot = Arc<Mutex<Option<AgentRuntime>>>;

/// A port owned by a started runtime
#[derive(Debug, Clone)]
struct PortClaim {
    agent_id: AgentId,
    agent_name: String,
}

/// One page of agents with their live state
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusPage {
    pub results: Vec<AgentStatus>,
    pub total_count: usize,
}

/// Registry and lifecycle controller for simulated agents
pub struct AgentProcessManager {
    store: Arc<dyn AgentStore>,

    engine: Arc<dyn ProtocolEngine>,

    config: AgentRuntimeConfig,

    runtimes: DashMap<AgentId, Slot>,

    port_claims: Mutex<HashMap<u16, PortClaim>>,
}

impl AgentProcessManager {
    pub fn new(
        store: Arc<dyn AgentStore>,
        engine: Arc<dyn ProtocolEngine>,
        config: AgentRuntimeConfig,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            runtimes: DashMap::new(),
            port_claims: Mutex::new(HashMap::new()),
        }
    }

    /// Number of identities with a runtime slot
    pub fn tracked(&self) -> usize {
        self.runtimes.len()
    }

    fn build(&self, definition: AgentDefinition) -> AgentRuntime {
        AgentRuntime::new(definition, Arc::clone(&self.engine), self.config.clone())
    }

    fn slot(&self, id: &AgentId) -> Slot {
        Arc::clone(self.runtimes.entry(id.clone()).or_default().value())
    }

    fn existing_slot(&self, id: &AgentId) -> Option<Slot> {
        self.runtimes.get(id).map(|slot| Arc::clone(slot.value()))
    }

    /// Track a stopped runtime for every stored definition
    pub async fn load(&self) -> Result<usize> {
        let page = self.store.query(&AgentQuery::all()).await?;
        let mut loaded = 0;

        for definition in page.results {
            let slot = self.slot(&definition.id);
            let mut guard = slot.lock().await;
            if guard.is_none() {
                *guard = Some(self.build(definition));
                loaded += 1;
            }
        }

        info!("Tracking {} stored agent(s)", loaded);
        Ok(loaded)
    }

    /// Start an agent, building its runtime from the store if needed
    pub async fn start(&self, id: &AgentId) -> Result<AgentStatus> {
        let slot = self.slot(id);
        let mut guard = slot.lock().await;

        if guard.is_none() {
            let definition = match self.store.get(id).await {
                Ok(Some(definition)) => definition,
                Ok(None) => {
                    self.runtimes.remove(id);
                    return Err(EngineError::AgentNotFound(id.clone()));
                }
                Err(e) => {
                    self.runtimes.remove(id);
                    return Err(e);
                }
            };
            *guard = Some(self.build(definition));
        }
        let Some(runtime) = guard.as_mut() else {
            return Err(EngineError::AgentNotFound(id.clone()));
        };

        if runtime.is_running() {
            return Ok(runtime.status());
        }

        let mut claims = self.port_claims.lock().await;
        start_claimed(runtime, &mut claims).await?;

        Ok(runtime.status())
    }

    /// Stop a tracked agent; stopping a stopped agent succeeds
    pub async fn stop(&self, id: &AgentId) -> Result<AgentStatus> {
        let slot = self
            .existing_slot(id)
            .ok_or_else(|| EngineError::AgentNotFound(id.clone()))?;
        let mut guard = slot.lock().await;
        let Some(runtime) = guard.as_mut() else {
            return Err(EngineError::AgentNotFound(id.clone()));
        };

        let mut claims = self.port_claims.lock().await;
        stop_claimed(runtime, &mut claims).await?;

        Ok(runtime.status())
    }

    /// Stop then start, keeping the port claimed throughout
    pub async fn restart(&self, id: &AgentId) -> Result<AgentStatus> {
        let slot = self
            .existing_slot(id)
            .ok_or_else(|| EngineError::AgentNotFound(id.clone()))?;
        let mut guard = slot.lock().await;
        let Some(runtime) = guard.as_mut() else {
            return Err(EngineError::AgentNotFound(id.clone()));
        };

        let mut claims = self.port_claims.lock().await;
        stop_claimed(runtime, &mut claims).await?;
        start_claimed(runtime, &mut claims).await?;

        info!("Agent '{}' restarted", runtime.name());
        Ok(runtime.status())
    }

    /// Stored definition with its runtime-derived state
    pub async fn get(&self, id: &AgentId) -> Result<AgentStatus> {
        let definition = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::AgentNotFound(id.clone()))?;
        let state = self.state(id).await;

        Ok(AgentStatus { definition, state })
    }

    /// Live state; untracked identities report `STOPPED`
    pub async fn state(&self, id: &AgentId) -> AgentState {
        let Some(slot) = self.existing_slot(id) else {
            return AgentState::Stopped;
        };

        let guard = slot.lock().await;
        guard.as_ref().map_or(AgentState::Stopped, AgentRuntime::state)
    }

    /// Stored definitions matching `query`, each with its live state
    pub async fn query(&self, query: &AgentQuery) -> Result<StatusPage> {
        let page = self.store.query(query).await?;

        let mut results = Vec::with_capacity(page.results.len());
        for definition in page.results {
            let state = self.state(&definition.id).await;
            results.push(AgentStatus { definition, state });
        }

        Ok(StatusPage {
            results,
            total_count: page.total_count,
        })
    }

    /// Persist a new definition and track it, stopped
    pub async fn create(&self, definition: AgentDefinition) -> Result<AgentStatus> {
        definition.validate()?;
        let created = self.store.create(definition).await?;

        let slot = self.slot(&created.id);
        let mut guard = slot.lock().await;
        let runtime = self.build(created);
        let status = runtime.status();
        *guard = Some(runtime);

        info!("Created agent '{}' ({})", status.definition.name, status.definition.id);
        Ok(status)
    }

    /// Persist a changed definition. A started agent is rebuilt and
    /// started again; if that fails it is left stopped with the new
    /// definition persisted.
    pub async fn update(&self, definition: AgentDefinition) -> Result<AgentStatus> {
        definition.validate()?;
        let id = definition.id.clone();

        let slot = self.slot(&id);
        let mut guard = slot.lock().await;

        let updated = match self.store.update(definition).await {
            Ok(updated) => updated,
            Err(e) => {
                if guard.is_none() {
                    self.runtimes.remove(&id);
                }
                return Err(e);
            }
        };
        let mut runtime = self.build(updated);

        let mut claims = self.port_claims.lock().await;
        let was_running = guard.as_ref().map_or(false, AgentRuntime::is_running);
        if let Some(previous) = guard.as_mut().filter(|r| r.is_running()) {
            if let Err(e) = stop_claimed(previous, &mut claims).await {
                warn!("Error stopping agent {} before update: {}", id, e);
            }
        }

        let restarted = if was_running {
            start_claimed(&mut runtime, &mut claims).await
        } else {
            Ok(())
        };
        drop(claims);

        let status = runtime.status();
        *guard = Some(runtime);
        restarted?;

        info!("Updated agent '{}' ({})", status.definition.name, id);
        Ok(status)
    }

    /// Stop the agent, then discard its runtime and definition
    pub async fn delete(&self, id: &AgentId) -> Result<()> {
        let slot = self.slot(id);
        let mut guard = slot.lock().await;

        if let Err(e) = self.store.delete(id).await {
            if guard.is_none() {
                self.runtimes.remove(id);
            }
            return Err(e);
        }

        if let Some(mut runtime) = guard.take() {
            let mut claims = self.port_claims.lock().await;
            if let Err(e) = stop_claimed(&mut runtime, &mut claims).await {
                warn!("Error stopping deleted agent {}: {}", id, e);
            }
        }
        self.runtimes.remove(id);

        info!("Deleted agent {}", id);
        Ok(())
    }

    /// Diagnostic walk of a started agent's tree
    pub async fn walk(&self, id: &AgentId, oid: &Oid) -> Result<Vec<Varbind>> {
        let slot = self
            .existing_slot(id)
            .ok_or_else(|| EngineError::AgentNotFound(id.clone()))?;
        let guard = slot.lock().await;
        let Some(runtime) = guard.as_ref() else {
            return Err(EngineError::AgentNotFound(id.clone()));
        };

        runtime.query(oid).await
    }

    /// Start every stored agent; failures are logged and skipped
    pub async fn start_all(&self) -> Result<usize> {
        let page = self.store.query(&AgentQuery::all()).await?;
        let mut started = 0;

        for definition in page.results {
            match self.start(&definition.id).await {
                Ok(_) => started += 1,
                Err(e) => warn!("Could not start agent '{}': {}", definition.name, e),
            }
        }

        info!("Started {} of {} agent(s)", started, page.total_count);
        Ok(started)
    }

    /// Stop every tracked runtime
    pub async fn shutdown(&self) {
        let slots: Vec<(AgentId, Slot)> = self
            .runtimes
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (id, slot) in slots {
            let mut guard = slot.lock().await;
            if let Some(runtime) = guard.as_mut() {
                let mut claims = self.port_claims.lock().await;
                if let Err(e) = stop_claimed(runtime, &mut claims).await {
                    warn!("Error stopping agent {} during shutdown: {}", id, e);
                }
            }
        }

        debug!("All agents stopped");
    }
}

/// Bind the runtime's port unless another started agent owns it
async fn start_claimed(
    runtime: &mut AgentRuntime,
    claims: &mut HashMap<u16, PortClaim>,
) -> Result<()> {
    let port = runtime.port();

    if let Some(owner) = claims.get(&port) {
        if owner.agent_id != *runtime.id() {
            return Err(EngineError::PortConflict {
                agent_name: owner.agent_name.clone(),
                port,
            });
        }
    }

    runtime.start().await?;
    claims.insert(
        port,
        PortClaim {
            agent_id: runtime.id().clone(),
            agent_name: runtime.name().to_string(),
        },
    );

    Ok(())
}

/// Stop the runtime and drop any claim it holds
async fn stop_claimed(
    runtime: &mut AgentRuntime,
    claims: &mut HashMap<u16, PortClaim>,
) -> Result<()> {
    let stopped = runtime.stop().await;
    claims.retain(|_, claim| claim.agent_id != *runtime.id());
    stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProviderDefinition, UpdatePattern, ValueType};
    use crate::protocol::{UdpEngine, Value};
    use crate::storage::MemoryStore;
    use std::net::{IpAddr, Ipv4Addr};

    fn free_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn manager() -> AgentProcessManager {
        AgentProcessManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(UdpEngine::new()),
            AgentRuntimeConfig {
                bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                ..AgentRuntimeConfig::default()
            },
        )
    }

    fn agent(name: &str, port: u16, level: &str) -> AgentDefinition {
        AgentDefinition::new(name, port, "public").with_provider(
            ProviderDefinition::new(
                "load",
                "1.3.6.1.4.1.9.1".parse().unwrap(),
                UpdatePattern::range(level, level).unwrap(),
            )
            .with_value_type(ValueType::Integer),
        )
    }

    fn subtree() -> Oid {
        "1.3.6.1.4.1.9".parse().unwrap()
    }

    #[tokio::test]
    async fn test_second_agent_on_same_port_conflicts() {
        let manager = manager();
        let port = free_port();
        let first = manager.create(agent("first", port, "1")).await.unwrap();
        let second = manager.create(agent("second", port, "2")).await.unwrap();

        let status = manager.start(&first.definition.id).await.unwrap();
        assert_eq!(status.state, AgentState::Started);

        let result = manager.start(&second.definition.id).await;
        match result {
            Err(EngineError::PortConflict { agent_name, port: p }) => {
                assert_eq!(agent_name, "first");
                assert_eq!(p, port);
            }
            other => panic!("expected a port conflict, got {:?}", other),
        }

        assert_eq!(manager.state(&first.definition.id).await, AgentState::Started);
        assert_eq!(manager.state(&second.definition.id).await, AgentState::Stopped);

        let varbinds = manager.walk(&first.definition.id, &subtree()).await.unwrap();
        assert_eq!(varbinds[0].value, Value::Integer(1));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_untracked_and_stopped_agents() {
        let manager = manager();

        let missing = manager.stop(&AgentId::from("nope")).await;
        assert!(matches!(missing, Err(EngineError::AgentNotFound(_))));

        let created = manager.create(agent("idle", free_port(), "1")).await.unwrap();
        let status = manager.stop(&created.definition.id).await.unwrap();
        assert_eq!(status.state, AgentState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_keeps_port_claimed() {
        let manager = manager();
        let port = free_port();
        let owner = manager.create(agent("owner", port, "1")).await.unwrap();
        let intruder = manager.create(agent("intruder", port, "2")).await.unwrap();
        manager.start(&owner.definition.id).await.unwrap();

        let (restarted, intruded) = tokio::join!(
            manager.restart(&owner.definition.id),
            manager.start(&intruder.definition.id),
        );

        let restarted = restarted.unwrap();
        assert_eq!(restarted.state, AgentState::Started);
        assert_eq!(restarted.definition.port, port);
        assert!(matches!(intruded, Err(EngineError::PortConflict { .. })));

        let varbinds = manager.walk(&owner.definition.id, &subtree()).await.unwrap();
        assert_eq!(varbinds[0].value, Value::Integer(1));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_running_agent_applies_new_range() {
        let manager = manager();
        let created = manager.create(agent("router", free_port(), "1")).await.unwrap();
        let id = created.definition.id.clone();
        manager.start(&id).await.unwrap();

        let before = manager.walk(&id, &subtree()).await.unwrap();
        assert_eq!(before[0].value, Value::Integer(1));

        let mut changed = agent("router", created.definition.port, "5");
        changed.id = id.clone();
        let status = manager.update(changed).await.unwrap();
        assert_eq!(status.state, AgentState::Started);

        let after = manager.walk(&id, &subtree()).await.unwrap();
        assert_eq!(after[0].value, Value::Integer(5));
        assert_eq!(manager.get(&id).await.unwrap().state, AgentState::Started);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_stops_and_forgets() {
        let manager = manager();
        let port = free_port();
        let created = manager.create(agent("doomed", port, "1")).await.unwrap();
        let id = created.definition.id.clone();
        manager.start(&id).await.unwrap();

        manager.delete(&id).await.unwrap();
        assert_eq!(manager.tracked(), 0);
        assert!(matches!(manager.get(&id).await, Err(EngineError::AgentNotFound(_))));
        assert!(matches!(manager.delete(&id).await, Err(EngineError::AgentNotFound(_))));

        // the port is free again
        let reuse = manager.create(agent("heir", port, "1")).await.unwrap();
        manager.start(&reuse.definition.id).await.unwrap();
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_start_leaves_no_slot() {
        let manager = manager();

        for i in 0..20 {
            let result = manager.start(&AgentId::from(format!("unknown-{}", i))).await;
            assert!(matches!(result, Err(EngineError::AgentNotFound(_))));
        }
        assert_eq!(manager.tracked(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_on_one_port() {
        let manager = Arc::new(manager());
        let port = free_port();
        let first = manager.create(agent("left", port, "1")).await.unwrap();
        let second = manager.create(agent("right", port, "2")).await.unwrap();

        let tasks: Vec<_> = [first.definition.id, second.definition.id]
            .into_iter()
            .map(|id| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.start(&id).await })
            })
            .collect();

        let mut started = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(status) if status.state == AgentState::Started => started += 1,
                Err(EngineError::PortConflict { port: p, .. }) if p == port => conflicts += 1,
                other => panic!("unexpected start outcome: {:?}", other),
            }
        }
        assert_eq!((started, conflicts), (1, 1));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let manager = manager();
        let result = manager.create(AgentDefinition::new("", 1161, "public")).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(manager.tracked(), 0);
    }

    #[tokio::test]
    async fn test_walk_on_stopped_agent() {
        let manager = manager();
        let created = manager.create(agent("quiet", free_port(), "1")).await.unwrap();

        let result = manager.walk(&created.definition.id, &subtree()).await;
        assert!(matches!(result, Err(EngineError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_load_and_start_all() {
        let store = Arc::new(MemoryStore::new());
        store.create(agent("a", free_port(), "1")).await.unwrap();
        store.create(agent("b", free_port(), "2")).await.unwrap();

        let manager = AgentProcessManager::new(
            store,
            Arc::new(UdpEngine::new()),
            AgentRuntimeConfig {
                bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                ..AgentRuntimeConfig::default()
            },
        );

        assert_eq!(manager.load().await.unwrap(), 2);
        assert_eq!(manager.start_all().await.unwrap(), 2);

        let page = manager.query(&AgentQuery::all()).await.unwrap();
        assert!(page.results.iter().all(|s| s.state == AgentState::Started));

        manager.shutdown().await;
        let page = manager.query(&AgentQuery::all()).await.unwrap();
        assert!(page.results.iter().all(|s| s.state == AgentState::Stopped));
    }
}
