// src/lib.rs
//! Simulated Management Agent Engine
//!
//! Hosts many simulated network-management agents in one process. Each
//! agent listens on its own UDP port and answers queries with synthetic
//! values that follow a configured pattern.
//!
//! # Architecture
//!
//! - **model**: agent and provider definitions, identifiers
//! - **simulation**: the value engine (RANDOM / RANGE / RAMP)
//! - **protocol**: protocol engine traits and the built-in UDP engine
//! - **runtime**: per-agent runtime and the process manager
//! - **storage**: persistence of agent definitions
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors

pub mod model;
pub mod observability;
pub mod protocol;
pub mod runtime;
pub mod simulation;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use model::{AgentDefinition, AgentId, AgentState, AgentStatus, ProviderDefinition};
pub use runtime::{AgentProcessManager, AgentRuntime, AgentRuntimeConfig};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
