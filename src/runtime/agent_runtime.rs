// src/runtime/agent_runtime.rs
//! Runtime for a single simulated agent
//!
//! Owns the agent's listener (when started) and its refresh table:
//! - Binding the port through the protocol engine
//! - Registering the community, optional user and every provider
//! - Refreshing provider values on demand before the engine replies
//! - Releasing the port on stop

use crate::model::{
    AgentDefinition, AgentId, AgentState, AgentStatus, AuthProtocol as UserAuth, ObjectKind, Oid,
    PrivProtocol as UserPriv, ProviderDefinition, UserCredential, UserSecurity, ValueType,
};
use crate::protocol::{
    AgentListener, AuthProtocol, ListenOptions, ObjectStore, ObjectType, PrivProtocol,
    ProtocolEngine, ProviderHandler, ProviderRegistration, ProviderRequest, ProviderType,
    SecurityLevel, SessionOptions, UserRegistration, Varbind,
};
use crate::simulation::{compute_value, Sample};
use crate::utils::config::{EngineConfig, SessionConfig};
use crate::utils::errors::{EngineError, Result};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Last sample per provider name
type RefreshTable = Arc<Mutex<HashMap<String, Sample>>>;

/// Configuration for agent runtime
#[derive(Debug, Clone)]
pub struct AgentRuntimeConfig {
    /// Address the agent port is bound on
    pub bind_address: IpAddr,

    /// Reject requests with an unregistered community
    pub authorization: bool,

    /// Settings for diagnostic walks
    pub session: SessionConfig,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            authorization: true,
            session: SessionConfig::default(),
        }
    }
}

impl From<&EngineConfig> for AgentRuntimeConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            bind_address: config.engine.bind_address,
            authorization: config.engine.authorization,
            session: config.session.clone(),
        }
    }
}

/// Live counterpart of one agent definition
pub struct AgentRuntime {
    definition: Arc<AgentDefinition>,

    engine: Arc<dyn ProtocolEngine>,

    config: AgentRuntimeConfig,

    /// Present only while started
    listener: Option<Box<dyn AgentListener>>,

    refreshes: RefreshTable,

    state: AgentState,
}

impl AgentRuntime {
    /// Build a stopped runtime
    pub fn new(
        definition: AgentDefinition,
        engine: Arc<dyn ProtocolEngine>,
        config: AgentRuntimeConfig,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            engine,
            config,
            listener: None,
            refreshes: Arc::new(Mutex::new(HashMap::new())),
            state: AgentState::Stopped,
        }
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn id(&self) -> &AgentId {
        &self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn port(&self) -> u16 {
        self.definition.port
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == AgentState::Started
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            definition: (*self.definition).clone(),
            state: self.state,
        }
    }

    /// Last sample pushed for a provider
    pub fn sample(&self, provider: &str) -> Option<Sample> {
        self.refreshes.lock().get(provider).cloned()
    }

    /// Bind the port and register everything the agent exposes
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("Agent '{}' is already started", self.name());
            return Ok(());
        }

        let mut listener = self
            .engine
            .create_agent(ListenOptions {
                address: self.config.bind_address,
                port: self.definition.port,
                authorization: self.config.authorization,
            })
            .await?;

        if let Err(e) = self.register(listener.as_ref()) {
            if let Err(close_err) = listener.close().await {
                warn!("Failed to close listener for '{}': {}", self.name(), close_err);
            }
            return Err(e);
        }

        self.listener = Some(listener);
        self.state = AgentState::Started;

        counter!("snmpsim_agents_started_total").increment(1);
        gauge!("snmpsim_agents_running").increment(1.0);
        info!("Agent '{}' started on port {}", self.name(), self.port());

        Ok(())
    }

    fn register(&self, listener: &dyn AgentListener) -> Result<()> {
        let authorizer = listener.authorizer();
        authorizer.add_community(&self.definition.community)?;
        if let Some(user) = &self.definition.user {
            authorizer.add_user(user_registration(user))?;
        }

        let store = listener.object_store();
        for provider in &self.definition.providers {
            let handler = match provider.kind {
                ObjectKind::Scalar => self.scalar_handler(&store, provider),
                // rows are not generated
                ObjectKind::Table => Arc::new(|_: &ProviderRequest| {}) as ProviderHandler,
            };

            store.register_provider(ProviderRegistration {
                name: provider.name.clone(),
                provider_type: provider_type(provider.kind),
                oid: provider.oid.clone(),
                object_type: object_type(provider.value_type),
                handler,
            })?;
        }

        for provider in &self.definition.providers {
            if provider.kind == ObjectKind::Scalar {
                refresh(&self.definition.name, store.as_ref(), &self.refreshes, provider);
            }
        }

        Ok(())
    }

    fn scalar_handler(
        &self,
        store: &Arc<dyn ObjectStore>,
        provider: &ProviderDefinition,
    ) -> ProviderHandler {
        let store = Arc::downgrade(store);
        let refreshes = Arc::clone(&self.refreshes);
        let provider = provider.clone();
        let agent = self.definition.name.clone();

        Arc::new(move |_: &ProviderRequest| {
            if let Some(store) = store.upgrade() {
                refresh(&agent, store.as_ref(), &refreshes, &provider);
            }
        })
    }

    /// Close the listener; a no-op when already stopped
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut listener) = self.listener.take() else {
            self.state = AgentState::Stopped;
            return Ok(());
        };

        let closed = listener.close().await;
        self.state = AgentState::Stopped;

        counter!("snmpsim_agents_stopped_total").increment(1);
        gauge!("snmpsim_agents_running").decrement(1.0);
        info!("Agent '{}' stopped", self.name());

        closed
    }

    /// Walk the agent's own tree from `oid` over a loopback session
    pub async fn query(&self, oid: &Oid) -> Result<Vec<Varbind>> {
        let Some(listener) = &self.listener else {
            return Err(EngineError::NotRunning(self.definition.name.clone()));
        };

        let host = match self.config.bind_address {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };

        let mut session = self
            .engine
            .open_session(SessionOptions {
                host,
                port: listener.local_port(),
                community: self.definition.community.clone(),
                timeout: self.config.session.timeout(),
                retries: self.config.session.retries,
                max_repetitions: self.config.session.max_repetitions,
            })
            .await?;

        let varbinds = session.walk(oid).await?;
        debug!("Walk of '{}' from {} returned {} entries", self.name(), oid, varbinds.len());

        Ok(varbinds)
    }
}

/// Recompute a provider and push the value into the object store.
/// Failures are logged; the engine still answers with the previous value.
fn refresh(
    agent: &str,
    store: &dyn ObjectStore,
    refreshes: &Mutex<HashMap<String, Sample>>,
    provider: &ProviderDefinition,
) {
    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut table = refreshes.lock();

    let outcome = compute_value(
        provider,
        table.get(&provider.name),
        now_ms,
        &mut rand::thread_rng(),
    )
    .and_then(|refresh| {
        store.set_scalar_value(&provider.name, &refresh.sample.value)?;
        Ok(refresh)
    });

    match outcome {
        Ok(refresh) => {
            if refresh.changed {
                debug!(
                    "Provider '{}' of '{}' now {}",
                    provider.name, agent, refresh.sample.value
                );
            }
            table.insert(provider.name.clone(), refresh.sample);
            counter!("snmpsim_provider_refreshes_total").increment(1);
        }
        Err(e) => {
            warn!("Failed to refresh provider '{}' of '{}': {}", provider.name, agent, e);
            counter!("snmpsim_provider_refresh_errors_total").increment(1);
        }
    }
}

fn user_registration(user: &UserCredential) -> UserRegistration {
    let auth = |protocol: &UserAuth| match protocol {
        UserAuth::Md5 => AuthProtocol::Md5,
        UserAuth::Sha => AuthProtocol::Sha,
    };
    let privacy = |protocol: &UserPriv| match protocol {
        UserPriv::Des => PrivProtocol::Des,
        UserPriv::Aes => PrivProtocol::Aes,
    };

    let mut registration = UserRegistration {
        name: user.name.clone(),
        level: SecurityLevel::NoAuthNoPriv,
        auth_protocol: AuthProtocol::None,
        auth_key: None,
        priv_protocol: PrivProtocol::None,
        priv_key: None,
    };

    match &user.security {
        UserSecurity::NoAuthNoPrivacy => {}
        UserSecurity::AuthNoPrivacy {
            auth_protocol,
            auth_key,
        } => {
            registration.level = SecurityLevel::AuthNoPriv;
            registration.auth_protocol = auth(auth_protocol);
            registration.auth_key = Some(auth_key.clone());
        }
        UserSecurity::AuthPrivacy {
            auth_protocol,
            auth_key,
            priv_protocol,
            priv_key,
        } => {
            registration.level = SecurityLevel::AuthPriv;
            registration.auth_protocol = auth(auth_protocol);
            registration.auth_key = Some(auth_key.clone());
            registration.priv_protocol = privacy(priv_protocol);
            registration.priv_key = Some(priv_key.clone());
        }
    }

    registration
}

fn provider_type(kind: ObjectKind) -> ProviderType {
    match kind {
        ObjectKind::Scalar => ProviderType::Scalar,
        ObjectKind::Table => ProviderType::Table,
    }
}

fn object_type(value_type: ValueType) -> ObjectType {
    match value_type {
        ValueType::Boolean => ObjectType::Boolean,
        ValueType::Integer => ObjectType::Integer,
        ValueType::OctetString => ObjectType::OctetString,
        ValueType::Null => ObjectType::Null,
        ValueType::Oid => ObjectType::Oid,
        ValueType::IpAddress => ObjectType::IpAddress,
        ValueType::Counter => ObjectType::Counter,
        ValueType::Gauge => ObjectType::Gauge,
        ValueType::TimeTicks => ObjectType::TimeTicks,
        ValueType::Opaque => ObjectType::Opaque,
        ValueType::Counter64 => ObjectType::Counter64,
        ValueType::NoSuchObject => ObjectType::NoSuchObject,
        ValueType::NoSuchInstance => ObjectType::NoSuchInstance,
        ValueType::EndOfMibView => ObjectType::EndOfMibView,
    }
}
