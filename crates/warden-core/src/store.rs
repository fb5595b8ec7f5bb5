//! The shared cluster state store.
//!
//! Two key-value scopes back the whole control plane: the application scope
//! is replicated ensemble-wide and written only by the elected coordinator;
//! each unit scope is written only by its owning unit. A third, provider
//! scope carries the connection data published to client applications.
//!
//! The store offers no transactions. Safety comes from the single-writer
//! convention plus idempotent readers: every write reports whether it
//! changed anything, and change notifications are only raised for real
//! changes, so redelivered events converge instead of looping.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Unique identifier for an ensemble member: the ZooKeeper `myid`.
///
/// Stable small integer assigned by the topology collaborator. Ordering is
/// load-bearing: units start and join the quorum in ascending id order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a related client application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known store keys.
pub mod keys {
    /// App scope: current quorum encryption mode.
    pub const QUORUM: &str = "quorum";
    /// App scope: set while an encryption-mode transition is in flight.
    pub const SWITCHING_ENCRYPTION: &str = "switching-encryption";
    /// App scope: set while a password rotation awaits per-unit acks.
    pub const ROTATE_PASSWORDS: &str = "rotate-passwords";
    /// App scope: membership marker value stored under each admitted
    /// unit's id.
    pub const ADDED: &str = "added";

    /// Unit scope: published network address.
    pub const HOST: &str = "host";
    /// Unit scope: lifecycle state; `started` once the server is up.
    pub const STATE: &str = "state";
    /// Unit scope value for [`STATE`].
    pub const STARTED: &str = "started";
    /// Unit scope: unit accepts both plaintext and encrypted peer traffic.
    pub const UNIFIED: &str = "unified";
    /// Unit scope: the encryption mode this unit last restarted into.
    pub const UNIT_QUORUM: &str = "quorum";
    /// Unit scope: unit has restarted since the password rotation began.
    pub const PASSWORD_ROTATED: &str = "password-rotated";

    /// Suffix for per-user credential entries in the app scope.
    pub const PASSWORD_SUFFIX: &str = "-password";
}

/// Abstraction over the replicated key-value substrate.
///
/// Callers must uphold the writer convention: application-scope writes only
/// from the coordinator, unit-scope writes only from the owning unit. The
/// `bool` returns report whether the write changed stored state, which is
/// what drives change notifications.
pub trait StateStore: Send + Sync {
    fn app_get(&self, key: &str) -> Option<String>;
    fn app_set(&self, key: &str, value: &str) -> bool;
    fn app_remove(&self, key: &str) -> bool;
    /// All application-scope keys. Needed to find leftover membership
    /// entries for units that already left the topology.
    fn app_keys(&self) -> Vec<String>;

    fn unit_get(&self, unit: UnitId, key: &str) -> Option<String>;
    fn unit_set(&self, unit: UnitId, key: &str, value: &str) -> bool;
    fn unit_remove(&self, unit: UnitId, key: &str) -> bool;

    /// Units that have published any unit-scope data.
    fn units(&self) -> Vec<UnitId>;
    /// Drops a departed unit's entire scope.
    fn purge_unit(&self, unit: UnitId) -> bool;

    /// Related client applications.
    fn clients(&self) -> Vec<ClientId>;
    fn client_get(&self, client: &ClientId, key: &str) -> Option<String>;
    fn client_set(&self, client: &ClientId, key: &str, value: &str) -> bool;
}

#[derive(Default)]
struct Scopes {
    app: BTreeMap<String, String>,
    units: BTreeMap<UnitId, BTreeMap<String, String>>,
    clients: BTreeMap<ClientId, BTreeMap<String, String>>,
}

/// In-process [`StateStore`].
///
/// Cheap to clone (shared interior), used by the agent's local loop and by
/// the test harness, where several simulated units share one instance.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Scopes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client application scope, as the topology collaborator
    /// would on a new client relation.
    pub fn register_client(&self, client: ClientId, chroot: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .clients
            .entry(client)
            .or_default()
            .insert("chroot".into(), chroot.into());
    }
}

fn set_in(map: &mut BTreeMap<String, String>, key: &str, value: &str) -> bool {
    map.insert(key.to_string(), value.to_string())
        .as_deref()
        != Some(value)
}

impl StateStore for MemoryStore {
    fn app_get(&self, key: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.app.get(key).cloned()
    }

    fn app_set(&self, key: &str, value: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        set_in(&mut inner.app, key, value)
    }

    fn app_remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.app.remove(key).is_some()
    }

    fn app_keys(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.app.keys().cloned().collect()
    }

    fn unit_get(&self, unit: UnitId, key: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.units.get(&unit)?.get(key).cloned()
    }

    fn unit_set(&self, unit: UnitId, key: &str, value: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        set_in(inner.units.entry(unit).or_default(), key, value)
    }

    fn unit_remove(&self, unit: UnitId, key: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .units
            .get_mut(&unit)
            .is_some_and(|scope| scope.remove(key).is_some())
    }

    fn units(&self) -> Vec<UnitId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.units.keys().copied().collect()
    }

    fn purge_unit(&self, unit: UnitId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.units.remove(&unit).is_some()
    }

    fn clients(&self) -> Vec<ClientId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.clients.keys().cloned().collect()
    }

    fn client_get(&self, client: &ClientId, key: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.clients.get(client)?.get(key).cloned()
    }

    fn client_set(&self, client: &ClientId, key: &str, value: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        set_in(inner.clients.entry(client.clone()).or_default(), key, value)
    }
}
