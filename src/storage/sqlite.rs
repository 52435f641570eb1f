// src/storage/sqlite.rs
//! SQLite agent store
//!
//! Name and port are kept in their own columns for filtering and ordering;
//! the full definition is stored as a JSON document. Name filtering runs
//! against `name_folded`, lowercased on write so non-ASCII names fold the
//! same way as in memory.

use crate::model::{AgentDefinition, AgentId};
use crate::storage::{AgentQuery, AgentStore, QueryPage, SortField};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

const FILTER: &str = "(?1 IS NULL OR instr(name_folded, ?1) > 0) AND (?2 IS NULL OR port = ?2)";

/// Agent definitions persisted in a SQLite database
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::Storage(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn).await?;

        info!("Agent store opened at {:?}", path);
        Ok(store)
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?).await
    }

    async fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            db: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let db = self.db.lock().await;

        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_folded TEXT NOT NULL,
                port INTEGER NOT NULL,
                definition TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        db.execute("CREATE INDEX IF NOT EXISTS idx_agents_port ON agents(port)", [])?;

        Ok(())
    }
}

fn decode(document: serde_json::Value) -> Result<AgentDefinition> {
    Ok(serde_json::from_value(document)?)
}

#[async_trait]
impl AgentStore for SqliteStore {
    async fn get(&self, id: &AgentId) -> Result<Option<AgentDefinition>> {
        let db = self.db.lock().await;
        let document: Option<serde_json::Value> = db
            .query_row(
                "SELECT definition FROM agents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        document.map(decode).transpose()
    }

    async fn create(&self, mut definition: AgentDefinition) -> Result<AgentDefinition> {
        if definition.id.is_empty() {
            definition.id = AgentId::generate();
        }

        let document = serde_json::to_value(&definition)?;
        let now = chrono::Utc::now().timestamp();

        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT INTO agents (id, name, name_folded, port, definition, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                definition.id.as_str(),
                definition.name,
                definition.name.to_lowercase(),
                definition.port,
                document,
                now
            ],
        )?;

        debug!("Stored agent {} ({})", definition.id, definition.name);
        Ok(definition)
    }

    async fn update(&self, definition: AgentDefinition) -> Result<AgentDefinition> {
        let document = serde_json::to_value(&definition)?;

        let db = self.db.lock().await;
        let changed = db.execute(
            r#"
            UPDATE agents
            SET name = ?2, name_folded = ?3, port = ?4, definition = ?5, updated_at = ?6
            WHERE id = ?1
            "#,
            params![
                definition.id.as_str(),
                definition.name,
                definition.name.to_lowercase(),
                definition.port,
                document,
                chrono::Utc::now().timestamp()
            ],
        )?;

        if changed == 0 {
            return Err(EngineError::AgentNotFound(definition.id));
        }
        Ok(definition)
    }

    async fn delete(&self, id: &AgentId) -> Result<()> {
        let db = self.db.lock().await;
        let changed = db.execute("DELETE FROM agents WHERE id = ?1", params![id.as_str()])?;

        if changed == 0 {
            return Err(EngineError::AgentNotFound(id.clone()));
        }
        Ok(())
    }

    async fn query(&self, query: &AgentQuery) -> Result<QueryPage> {
        let fragment = query.name_contains.as_ref().map(|f| f.to_lowercase());
        let column = match query.sort {
            SortField::Name => "name",
            SortField::Port => "port",
        };
        let direction = if query.descending { "DESC" } else { "ASC" };
        let limit = if query.limit == 0 { -1 } else { query.limit as i64 };

        let db = self.db.lock().await;

        let total_count: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM agents WHERE {}", FILTER),
            params![fragment, query.port],
            |row| row.get(0),
        )?;

        let mut stmt = db.prepare(&format!(
            "SELECT definition FROM agents WHERE {} ORDER BY {} {}, id {} LIMIT ?3 OFFSET ?4",
            FILTER, column, direction, direction
        ))?;

        let documents = stmt
            .query_map(
                params![fragment, query.port, limit, query.skip as i64],
                |row| row.get::<_, serde_json::Value>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let results = documents
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryPage {
            results,
            total_count: total_count as usize,
        })
    }
}
