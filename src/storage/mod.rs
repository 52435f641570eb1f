// src/storage/mod.rs
//! Persistence of agent definitions
//!
//! The manager only sees the `AgentStore` trait. Two backends ship:
//!
//! - **MemoryStore**: process-local map, used by tests and `in_memory` mode
//! - **SqliteStore**: one row per agent, definition stored as JSON
//!
//! Runtime state is never persisted; it always comes from the runtime.

pub mod memory;
pub mod sqlite;

use crate::model::{AgentDefinition, AgentId};
use crate::utils::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Field a query is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Port,
}

/// Filter, order and page over stored definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentQuery {
    /// Case-insensitive substring of the agent name
    pub name_contains: Option<String>,

    pub port: Option<u16>,

    pub sort: SortField,

    pub descending: bool,

    pub skip: usize,

    /// Page size; `0` means unlimited
    pub limit: usize,
}

impl AgentQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn named(fragment: impl Into<String>) -> Self {
        Self {
            name_contains: Some(fragment.into()),
            ..Self::default()
        }
    }

    pub fn on_port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort: SortField, descending: bool) -> Self {
        self.sort = sort;
        self.descending = descending;
        self
    }

    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    /// Whether a definition passes the filters
    pub fn matches(&self, definition: &AgentDefinition) -> bool {
        let name_ok = self.name_contains.as_ref().map_or(true, |fragment| {
            definition
                .name
                .to_lowercase()
                .contains(&fragment.to_lowercase())
        });
        let port_ok = self.port.map_or(true, |port| definition.port == port);

        name_ok && port_ok
    }

    /// Ordering between two matching definitions; ties break on id
    pub fn compare(&self, a: &AgentDefinition, b: &AgentDefinition) -> Ordering {
        let ordering = match self.sort {
            SortField::Name => a.name.cmp(&b.name),
            SortField::Port => a.port.cmp(&b.port),
        }
        .then_with(|| a.id.cmp(&b.id));

        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// One page of results and the number of matches before paging
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryPage {
    pub results: Vec<AgentDefinition>,
    pub total_count: usize,
}

/// Storage backend for agent definitions
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get(&self, id: &AgentId) -> Result<Option<AgentDefinition>>;

    /// Persist a new definition; an empty id is replaced with a fresh one
    async fn create(&self, definition: AgentDefinition) -> Result<AgentDefinition>;

    /// Replace an existing definition; `AgentNotFound` when absent
    async fn update(&self, definition: AgentDefinition) -> Result<AgentDefinition>;

    /// Remove a definition; `AgentNotFound` when absent
    async fn delete(&self, id: &AgentId) -> Result<()>;

    async fn query(&self, query: &AgentQuery) -> Result<QueryPage>;
}
