// src/protocol/mod.rs
//! Protocol engine interface
//!
//! The runtime drives the management protocol through a narrow set of
//! traits so the wire encoding stays outside the simulator core:
//!
//! - **ProtocolEngine**: creates listening agents and client sessions
//! - **AgentListener**: one bound port, with its access control and object store
//! - **Authorizer**: communities and user credentials
//! - **ObjectStore**: provider registration and scalar value updates
//! - **Session**: client side, used for diagnostic walks
//!
//! `UdpEngine` is the built-in implementation. It binds real UDP ports and
//! exchanges JSON datagrams; it does not implement SNMP encoding.
//!
//! # Query flow
//!
//! ```text
//! Client ── GetNext(oid) ──▶ UdpListener
//!                               │ resolve instance
//!                               ▼
//!                         ProviderHandler ──▶ Value Engine
//!                               │ set_scalar_value
//!                               ▼
//!                           MibStore ──▶ Response(varbind)
//! ```

pub mod message;
pub mod mib;
pub mod session;
pub mod udp_engine;

use crate::model::Oid;
use crate::simulation::ProviderValue;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

pub use mib::{AccessControl, MibStore};
pub use session::UdpSession;
pub use udp_engine::{UdpEngine, UdpListener};

/// Engine-native security levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthProtocol {
    None,
    Md5,
    Sha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivProtocol {
    None,
    Des,
    Aes,
}

/// Engine-native provider shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Scalar,
    Table,
}

/// Engine-native object types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Boolean,
    Integer,
    OctetString,
    Null,
    Oid,
    IpAddress,
    Counter,
    Gauge,
    TimeTicks,
    Opaque,
    Counter64,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

/// An encoded value as carried in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    OctetString(String),
    Null,
    Oid(Oid),
    IpAddress(Ipv4Addr),
    Counter(u32),
    Gauge(u32),
    TimeTicks(u32),
    Opaque(String),
    #[serde(rename = "COUNTER_64")]
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    /// Error placeholders that terminate a walk
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Encode a generated value as `object_type`
    pub fn encode(object_type: ObjectType, value: &ProviderValue) -> Result<Self> {
        let mismatch = || {
            EngineError::Protocol(format!(
                "Value '{}' cannot be encoded as {:?}",
                value, object_type
            ))
        };

        let encoded = match object_type {
            ObjectType::Boolean => match value {
                ProviderValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Value::Boolean(true),
                    "false" | "0" => Value::Boolean(false),
                    _ => return Err(mismatch()),
                },
                other => Value::Boolean(other.as_f64().map_or(false, |n| n != 0.0)),
            },
            ObjectType::Integer => {
                Value::Integer(value.as_f64().ok_or_else(mismatch)?.trunc() as i64)
            }
            ObjectType::OctetString => Value::OctetString(value.to_string()),
            ObjectType::Opaque => Value::Opaque(value.to_string()),
            ObjectType::Null => Value::Null,
            ObjectType::Oid => Value::Oid(value.to_string().parse().map_err(|_| mismatch())?),
            ObjectType::IpAddress => {
                Value::IpAddress(value.to_string().trim().parse().map_err(|_| mismatch())?)
            }
            ObjectType::Counter => Value::Counter(unsigned(value, u32::MAX as f64).ok_or_else(mismatch)? as u32),
            ObjectType::Gauge => Value::Gauge(unsigned(value, u32::MAX as f64).ok_or_else(mismatch)? as u32),
            ObjectType::TimeTicks => {
                Value::TimeTicks(unsigned(value, u32::MAX as f64).ok_or_else(mismatch)? as u32)
            }
            ObjectType::Counter64 => {
                Value::Counter64(unsigned(value, u64::MAX as f64).ok_or_else(mismatch)? as u64)
            }
            ObjectType::NoSuchObject => Value::NoSuchObject,
            ObjectType::NoSuchInstance => Value::NoSuchInstance,
            ObjectType::EndOfMibView => Value::EndOfMibView,
        };

        Ok(encoded)
    }
}

fn unsigned(value: &ProviderValue, limit: f64) -> Option<f64> {
    value
        .as_f64()
        .map(f64::trunc)
        .filter(|n| *n >= 0.0 && *n <= limit)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::OctetString(s) | Value::Opaque(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
            Value::Oid(oid) => write!(f, "{}", oid),
            Value::IpAddress(ip) => write!(f, "{}", ip),
            Value::Counter(n) | Value::Gauge(n) | Value::TimeTicks(n) => write!(f, "{}", n),
            Value::Counter64(n) => write!(f, "{}", n),
            Value::NoSuchObject => f.write_str("noSuchObject"),
            Value::NoSuchInstance => f.write_str("noSuchInstance"),
            Value::EndOfMibView => f.write_str("endOfMibView"),
        }
    }
}

/// One `(identifier, value)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Varbind {
    pub oid: Oid,
    pub value: Value,
}

impl Varbind {
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    pub fn is_error(&self) -> bool {
        self.value.is_exception()
    }
}

impl fmt::Display for Varbind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.oid, self.value)
    }
}

/// User credential in the engine's own shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRegistration {
    pub name: String,
    pub level: SecurityLevel,
    pub auth_protocol: AuthProtocol,
    pub auth_key: Option<String>,
    pub priv_protocol: PrivProtocol,
    pub priv_key: Option<String>,
}

/// Inbound query routed to a provider handler
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub provider: String,
    pub oid: Oid,
}

/// Called before the engine answers a query for the provider. It is
/// expected to push a fresh value with `ObjectStore::set_scalar_value`.
pub type ProviderHandler = Arc<dyn Fn(&ProviderRequest) + Send + Sync>;

/// Everything the engine needs to expose one provider
#[derive(Clone)]
pub struct ProviderRegistration {
    pub name: String,
    pub provider_type: ProviderType,
    pub oid: Oid,
    pub object_type: ObjectType,
    pub handler: ProviderHandler,
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .field("oid", &self.oid)
            .field("object_type", &self.object_type)
            .finish()
    }
}

/// Options for a listening agent
#[derive(Debug, Clone)]
pub struct ListenOptions {
    pub address: IpAddr,
    pub port: u16,

    /// Reject requests with an unregistered community
    pub authorization: bool,
}

/// Options for a client session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: IpAddr,
    pub port: u16,
    pub community: String,
    pub timeout: Duration,
    pub retries: u32,
    pub max_repetitions: u32,
}

/// Access-control facility of a listening agent
pub trait Authorizer: Send + Sync {
    fn add_community(&self, community: &str) -> Result<()>;

    fn add_user(&self, user: UserRegistration) -> Result<()>;
}

/// Management-object store of a listening agent
pub trait ObjectStore: Send + Sync {
    fn register_provider(&self, registration: ProviderRegistration) -> Result<()>;

    fn set_scalar_value(&self, provider: &str, value: &ProviderValue) -> Result<()>;
}

/// A bound, serving agent
#[async_trait]
pub trait AgentListener: Send + Sync {
    /// Port actually bound
    fn local_port(&self) -> u16;

    fn authorizer(&self) -> Arc<dyn Authorizer>;

    fn object_store(&self) -> Arc<dyn ObjectStore>;

    /// Stop serving; the port is released when this resolves
    async fn close(&mut self) -> Result<()>;
}

/// Client session against an agent
#[async_trait]
pub trait Session: Send {
    /// Iterative walk from `start`. Collects `(identifier, value)` pairs
    /// until the subtree is exhausted or an error marker is met; the
    /// marker itself is not returned.
    async fn walk(&mut self, start: &Oid) -> Result<Vec<Varbind>>;
}

/// Factory for listeners and sessions
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Bind and start serving. Fails with `PortInUse` when the OS reports
    /// the address is taken.
    async fn create_agent(&self, options: ListenOptions) -> Result<Box<dyn AgentListener>>;

    async fn open_session(&self, options: SessionOptions) -> Result<Box<dyn Session>>;
}
