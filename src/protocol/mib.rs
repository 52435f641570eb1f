// src/protocol/mib.rs
//! In-memory object store and access control for the built-in engine

use crate::model::Oid;
use crate::protocol::{
    AuthProtocol, Authorizer, ObjectStore, PrivProtocol, ProviderHandler, ProviderRegistration,
    ProviderRequest, ProviderType, SecurityLevel, UserRegistration, Value, Varbind,
};
use crate::simulation::ProviderValue;
use crate::utils::errors::{EngineError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use tracing::debug;

/// A registered provider and its current encoded value
struct Entry {
    registration: ProviderRegistration,
    value: Option<Value>,
}

#[derive(Default)]
struct Inner {
    by_name: HashMap<String, Entry>,

    /// Scalar instance identifier (`oid.0`) to provider name
    instances: BTreeMap<Oid, String>,
}

/// Provider registry keyed by name and by instance identifier
///
/// Handlers are always invoked with no lock held, so they can call back
/// into `set_scalar_value`.
#[derive(Default)]
pub struct MibStore {
    inner: RwLock<Inner>,
}

impl MibStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current encoded value of a provider
    pub fn value(&self, provider: &str) -> Option<Value> {
        self.inner
            .read()
            .by_name
            .get(provider)
            .and_then(|e| e.value.clone())
    }

    /// Answer a GET for an exact instance identifier
    pub fn get(&self, oid: &Oid) -> Varbind {
        let target = {
            let inner = self.inner.read();
            inner
                .instances
                .get(oid)
                .and_then(|name| inner.by_name.get(name))
                .map(|e| (e.registration.name.clone(), e.registration.handler.clone()))
        };

        match target {
            Some((name, handler)) => {
                invoke(&handler, &name, oid);
                let value = self.value(&name).unwrap_or(Value::NoSuchInstance);
                Varbind::new(oid.clone(), value)
            }
            None => Varbind::new(oid.clone(), Value::NoSuchObject),
        }
    }

    /// Answer a GETNEXT: the first instance after `oid` that has a value
    pub fn get_next(&self, oid: &Oid) -> Varbind {
        let mut cursor = oid.clone();

        loop {
            let next = {
                let inner = self.inner.read();
                inner
                    .instances
                    .range((Bound::Excluded(&cursor), Bound::Unbounded))
                    .next()
                    .and_then(|(instance, name)| {
                        inner.by_name.get(name).map(|e| {
                            (
                                instance.clone(),
                                name.clone(),
                                e.registration.handler.clone(),
                            )
                        })
                    })
            };

            let Some((instance, name, handler)) = next else {
                return Varbind::new(oid.clone(), Value::EndOfMibView);
            };

            invoke(&handler, &name, &instance);
            if let Some(value) = self.value(&name) {
                return Varbind::new(instance, value);
            }

            debug!("Skipping provider '{}' with no value", name);
            cursor = instance;
        }
    }

    /// Answer a GETBULK: up to `max_repetitions` successive GETNEXTs
    pub fn get_bulk(&self, oid: &Oid, max_repetitions: u32) -> Vec<Varbind> {
        let mut varbinds = Vec::new();
        let mut cursor = oid.clone();

        for _ in 0..max_repetitions.max(1) {
            let varbind = self.get_next(&cursor);
            let done = varbind.is_error();
            cursor = varbind.oid.clone();
            varbinds.push(varbind);
            if done {
                break;
            }
        }

        varbinds
    }
}

fn invoke(handler: &ProviderHandler, provider: &str, oid: &Oid) {
    let request = ProviderRequest {
        provider: provider.to_string(),
        oid: oid.clone(),
    };
    handler(&request);
}

impl ObjectStore for MibStore {
    fn register_provider(&self, registration: ProviderRegistration) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.by_name.contains_key(&registration.name) {
            return Err(EngineError::Protocol(format!(
                "Provider '{}' is already registered",
                registration.name
            )));
        }

        if registration.provider_type == ProviderType::Scalar {
            let instance = registration.oid.child(0);
            if let Some(owner) = inner.instances.get(&instance) {
                return Err(EngineError::Protocol(format!(
                    "Identifier {} is already registered by '{}'",
                    registration.oid, owner
                )));
            }
            inner.instances.insert(instance, registration.name.clone());
        }

        inner.by_name.insert(
            registration.name.clone(),
            Entry {
                registration,
                value: None,
            },
        );
        Ok(())
    }

    fn set_scalar_value(&self, provider: &str, value: &ProviderValue) -> Result<()> {
        let mut inner = self.inner.write();

        let entry = inner.by_name.get_mut(provider).ok_or_else(|| {
            EngineError::Protocol(format!("Provider '{}' is not registered", provider))
        })?;

        if entry.registration.provider_type != ProviderType::Scalar {
            return Err(EngineError::Protocol(format!(
                "Provider '{}' is not a scalar",
                provider
            )));
        }

        entry.value = Some(Value::encode(entry.registration.object_type, value)?);
        Ok(())
    }
}

/// Registered communities and users
#[derive(Default)]
pub struct AccessControl {
    communities: RwLock<HashSet<String>>,
    users: RwLock<HashMap<String, UserRegistration>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permits(&self, community: &str) -> bool {
        self.communities.read().contains(community)
    }
}

impl Authorizer for AccessControl {
    fn add_community(&self, community: &str) -> Result<()> {
        if community.is_empty() {
            return Err(EngineError::Protocol("Community must not be empty".into()));
        }
        self.communities.write().insert(community.to_string());
        Ok(())
    }

    fn add_user(&self, user: UserRegistration) -> Result<()> {
        let has_auth = user.auth_protocol != AuthProtocol::None && user.auth_key.is_some();
        let has_priv = user.priv_protocol != PrivProtocol::None && user.priv_key.is_some();

        let consistent = match user.level {
            SecurityLevel::NoAuthNoPriv => true,
            SecurityLevel::AuthNoPriv => has_auth,
            SecurityLevel::AuthPriv => has_auth && has_priv,
        };
        if !consistent {
            return Err(EngineError::Protocol(format!(
                "User '{}' lacks the protocols required by {:?}",
                user.name, user.level
            )));
        }

        self.users.write().insert(user.name.clone(), user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ObjectType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn registration(name: &str, oid: &str, handler: ProviderHandler) -> ProviderRegistration {
        ProviderRegistration {
            name: name.to_string(),
            provider_type: ProviderType::Scalar,
            oid: oid.parse().unwrap(),
            object_type: ObjectType::Integer,
            handler,
        }
    }

    fn counting_store() -> (Arc<MibStore>, Arc<AtomicU32>) {
        let store = Arc::new(MibStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        for (name, oid) in [("a", "1.3.6.1.9.1"), ("b", "1.3.6.1.9.2")] {
            let weak = Arc::downgrade(&store);
            let calls = Arc::clone(&calls);
            let handler: ProviderHandler = Arc::new(move |req: &ProviderRequest| {
                let n = calls.fetch_add(1, Ordering::SeqCst) as i64;
                if let Some(store) = weak.upgrade() {
                    store.set_scalar_value(&req.provider, &ProviderValue::Integer(n)).unwrap();
                }
            });
            store.register_provider(registration(name, oid, handler)).unwrap();
        }

        (store, calls)
    }

    #[test]
    fn test_get_invokes_handler_before_reply() {
        let (store, calls) = counting_store();

        let vb = store.get(&"1.3.6.1.9.1.0".parse().unwrap());
        assert_eq!(vb.value, Value::Integer(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let missing = store.get(&"1.3.6.1.9.7.0".parse().unwrap());
        assert_eq!(missing.value, Value::NoSuchObject);
    }

    #[test]
    fn test_get_next_walks_in_order() {
        let (store, _) = counting_store();

        let first = store.get_next(&"1.3.6.1.9".parse().unwrap());
        assert_eq!(first.oid.to_string(), "1.3.6.1.9.1.0");

        let second = store.get_next(&first.oid);
        assert_eq!(second.oid.to_string(), "1.3.6.1.9.2.0");

        let end = store.get_next(&second.oid);
        assert_eq!(end.value, Value::EndOfMibView);
    }

    #[test]
    fn test_get_bulk_stops_at_end() {
        let (store, _) = counting_store();
        let varbinds = store.get_bulk(&"1.3".parse().unwrap(), 10);
        assert_eq!(varbinds.len(), 3);
        assert!(varbinds[2].is_error());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let (store, _) = counting_store();
        let noop: ProviderHandler = Arc::new(|_: &ProviderRequest| {});
        assert!(store.register_provider(registration("a", "1.3.6.1.9.5", noop.clone())).is_err());
        assert!(store.register_provider(registration("c", "1.3.6.1.9.1", noop)).is_err());
    }

    #[test]
    fn test_encoding_failure_leaves_previous_value() {
        let store = MibStore::new();
        let noop: ProviderHandler = Arc::new(|_: &ProviderRequest| {});
        store.register_provider(registration("n", "1.3.6.1.9.1", noop)).unwrap();

        store.set_scalar_value("n", &ProviderValue::Integer(5)).unwrap();
        assert!(store.set_scalar_value("n", &ProviderValue::Text("x".into())).is_err());
        assert_eq!(store.value("n"), Some(Value::Integer(5)));
    }

    #[test]
    fn test_access_control() {
        let access = AccessControl::new();
        access.add_community("public").unwrap();
        assert!(access.permits("public"));
        assert!(!access.permits("private"));
        assert!(access.add_community("").is_err());

        let user = UserRegistration {
            name: "admin".into(),
            level: SecurityLevel::AuthPriv,
            auth_protocol: AuthProtocol::Sha,
            auth_key: Some("k".into()),
            priv_protocol: PrivProtocol::None,
            priv_key: None,
        };
        assert!(access.add_user(user.clone()).is_err());

        let user = UserRegistration {
            level: SecurityLevel::AuthNoPriv,
            ..user
        };
        access.add_user(user).unwrap();
        assert_eq!(access.users.read()["admin"].level, SecurityLevel::AuthNoPriv);
    }
}
