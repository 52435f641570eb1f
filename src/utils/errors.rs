// src/utils/errors.rs
//! Error types for the simulator engine

use crate::model::AgentId;
use thiserror::Error;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// No definition (or no tracked runtime) exists for this identity
    #[error("Could not find agent with ID: {0}")]
    AgentNotFound(AgentId),

    /// The OS refused the bind because the port is taken
    #[error("Port is in use: {0}")]
    PortInUse(u16),

    /// Another tracked, running agent already owns the port
    #[error("Port {port} is already used by running agent '{agent_name}'")]
    PortConflict { agent_name: String, port: u16 },

    /// Malformed agent or provider definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Opaque failure from the protocol engine
    #[error("Protocol engine error: {0}")]
    Protocol(String),

    /// Operation needs a bound listener
    #[error("Agent '{0}' is not running")]
    NotRunning(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_conflict_message_names_agent() {
        let err = EngineError::PortConflict {
            agent_name: "router-1".to_string(),
            port: 1161,
        };
        let msg = err.to_string();
        assert!(msg.contains("router-1"));
        assert!(msg.contains("1161"));
    }
}
