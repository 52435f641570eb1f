// src/model/agent.rs
//! Agent definitions and their runtime-derived status

use crate::model::provider::ProviderDefinition;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use ulid::Ulid;

/// Stable identity of an agent definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Fresh, time-ordered identity
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runtime state of an agent; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    #[default]
    Stopped,
    Started,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Stopped => f.write_str("STOPPED"),
            AgentState::Started => f.write_str("STARTED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthProtocol {
    Md5,
    Sha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivProtocol {
    Des,
    Aes,
}

/// Degree of protection applied to a user's sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    NoAuthNoPrivacy,
    AuthNoPrivacy,
    AuthPrivacy,
}

/// User security settings; each level carries exactly the fields it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserSecurity {
    NoAuthNoPrivacy,
    AuthNoPrivacy {
        auth_protocol: AuthProtocol,
        auth_key: String,
    },
    AuthPrivacy {
        auth_protocol: AuthProtocol,
        auth_key: String,
        priv_protocol: PrivProtocol,
        priv_key: String,
    },
}

impl UserSecurity {
    pub fn level(&self) -> SecurityLevel {
        match self {
            UserSecurity::NoAuthNoPrivacy => SecurityLevel::NoAuthNoPrivacy,
            UserSecurity::AuthNoPrivacy { .. } => SecurityLevel::AuthNoPrivacy,
            UserSecurity::AuthPrivacy { .. } => SecurityLevel::AuthPrivacy,
        }
    }
}

/// Optional user credential registered alongside the community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub name: String,

    #[serde(flatten)]
    pub security: UserSecurity,
}

impl UserCredential {
    pub fn new(name: impl Into<String>, security: UserSecurity) -> Self {
        Self {
            name: name.into(),
            security,
        }
    }

    /// Build a credential, deriving the security level from which
    /// protocols are set. Privacy without authentication is rejected.
    pub fn from_protocols(
        name: impl Into<String>,
        auth: Option<(AuthProtocol, String)>,
        privacy: Option<(PrivProtocol, String)>,
    ) -> Result<Self> {
        let security = match (auth, privacy) {
            (None, None) => UserSecurity::NoAuthNoPrivacy,
            (Some((auth_protocol, auth_key)), None) => UserSecurity::AuthNoPrivacy {
                auth_protocol,
                auth_key,
            },
            (Some((auth_protocol, auth_key)), Some((priv_protocol, priv_key))) => {
                UserSecurity::AuthPrivacy {
                    auth_protocol,
                    auth_key,
                    priv_protocol,
                    priv_key,
                }
            }
            (None, Some(_)) => {
                return Err(EngineError::Validation(
                    "A privacy protocol requires an authentication protocol".into(),
                ))
            }
        };

        Ok(Self::new(name, security))
    }

    pub fn level(&self) -> SecurityLevel {
        self.security.level()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("User name must not be empty".into()));
        }

        let keys: Vec<&String> = match &self.security {
            UserSecurity::NoAuthNoPrivacy => vec![],
            UserSecurity::AuthNoPrivacy { auth_key, .. } => vec![auth_key],
            UserSecurity::AuthPrivacy {
                auth_key, priv_key, ..
            } => vec![auth_key, priv_key],
        };
        if keys.iter().any(|k| k.is_empty()) {
            return Err(EngineError::Validation(format!(
                "User '{}' is missing a key for its security level",
                self.name
            )));
        }

        Ok(())
    }
}

/// Persisted description of one simulated agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Assigned by the store on create when empty
    #[serde(default)]
    pub id: AgentId,

    pub name: String,

    pub port: u16,

    pub community: String,

    #[serde(default)]
    pub user: Option<UserCredential>,

    #[serde(default)]
    pub providers: Vec<ProviderDefinition>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, port: u16, community: impl Into<String>) -> Self {
        Self {
            id: AgentId::default(),
            name: name.into(),
            port,
            community: community.into(),
            user: None,
            providers: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: UserCredential) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_provider(mut self, provider: ProviderDefinition) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderDefinition> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Reject definitions a runtime could not be built from
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("Agent name must not be empty".into()));
        }
        if self.port == 0 {
            return Err(EngineError::Validation(format!(
                "Agent '{}' must use a non-zero port",
                self.name
            )));
        }
        if self.community.is_empty() {
            return Err(EngineError::Validation(format!(
                "Agent '{}' must define a community",
                self.name
            )));
        }
        if let Some(user) = &self.user {
            user.validate()?;
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(EngineError::Validation(format!(
                    "Agent '{}' has duplicate provider '{}'",
                    self.name, provider.name
                )));
            }
            provider.validate()?;
        }

        Ok(())
    }
}

/// Definition paired with the live state reported by its runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    #[serde(flatten)]
    pub definition: AgentDefinition,
    pub state: AgentState,
}
