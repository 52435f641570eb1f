// src/runtime/mod.rs
//! Agent lifecycle
//!
//! - **Agent Runtime**: one agent's listener, registrations and refresh table
//! - **Process Manager**: registry of runtimes, port claims, persistence
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               AgentProcessManager                    │
//! │   runtimes (per-id slot)      port claims (global)   │
//! │  ┌──────────────┐  ┌──────────────┐                  │
//! │  │ AgentRuntime │  │ AgentRuntime │  ...             │
//! │  │  listener ───┼──┼──▶ ProtocolEngine (UDP)         │
//! │  │  refreshes   │  │  refreshes   │                  │
//! │  └──────────────┘  └──────────────┘                  │
//! │          │                                           │
//! │          ▼                                           │
//! │     AgentStore (memory / SQLite)                     │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod agent_runtime;
pub mod process_manager;

pub use agent_runtime::{AgentRuntime, AgentRuntimeConfig};
pub use process_manager::{AgentProcessManager, StatusPage};
