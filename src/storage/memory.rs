// src/storage/memory.rs
//! In-memory agent store

use crate::model::{AgentDefinition, AgentId};
use crate::storage::{AgentQuery, AgentStore, QueryPage};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Definitions held in a concurrent map
#[derive(Default)]
pub struct MemoryStore {
    agents: DashMap<AgentId, AgentDefinition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn get(&self, id: &AgentId) -> Result<Option<AgentDefinition>> {
        Ok(self.agents.get(id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, mut definition: AgentDefinition) -> Result<AgentDefinition> {
        if definition.id.is_empty() {
            definition.id = AgentId::generate();
        }
        match self.agents.entry(definition.id.clone()) {
            Entry::Occupied(_) => Err(EngineError::Storage(format!(
                "Agent {} already exists",
                definition.id
            ))),
            Entry::Vacant(slot) => {
                debug!("Stored agent {} ({})", definition.id, definition.name);
                slot.insert(definition.clone());
                Ok(definition)
            }
        }
    }

    async fn update(&self, definition: AgentDefinition) -> Result<AgentDefinition> {
        match self.agents.get_mut(&definition.id) {
            Some(mut entry) => {
                *entry = definition.clone();
                Ok(definition)
            }
            None => Err(EngineError::AgentNotFound(definition.id)),
        }
    }

    async fn delete(&self, id: &AgentId) -> Result<()> {
        self.agents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::AgentNotFound(id.clone()))
    }

    async fn query(&self, query: &AgentQuery) -> Result<QueryPage> {
        let mut matches: Vec<AgentDefinition> = self
            .agents
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        matches.sort_by(|a, b| query.compare(a, b));
        let total_count = matches.len();

        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        let results = matches.into_iter().skip(query.skip).take(limit).collect();

        Ok(QueryPage {
            results,
            total_count,
        })
    }
}
