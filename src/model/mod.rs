// src/model/mod.rs
//! Domain model for simulated agents
//!
//! - **Agent**: identity, port, community, optional user credential
//! - **Provider**: one named value with its update pattern
//! - **Oid**: management object identifiers

pub mod agent;
pub mod oid;
pub mod provider;

pub use agent::{
    AgentDefinition, AgentId, AgentState, AgentStatus, AuthProtocol, PrivProtocol, SecurityLevel,
    UserCredential, UserSecurity,
};
pub use oid::Oid;
pub use provider::{
    NumericBounds, ObjectKind, ProviderDefinition, UpdatePattern, ValueType,
    DEFAULT_UPDATE_INTERVAL_MS,
};
