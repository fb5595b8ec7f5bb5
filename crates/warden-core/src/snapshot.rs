//! Ensemble snapshot and readiness predicates.
//!
//! [`EnsembleSnapshot::capture`] reads the store once and pairs it with the
//! facts only the surrounding platform knows (which unit we are, whether we
//! hold the coordinator role, whether a certificate relationship exists,
//! which units the topology plans for). Everything downstream — the
//! reconciler, the materializer, the restart and upgrade gates — computes
//! over the snapshot, so a handler sees one consistent view per event even
//! while the coordinator is concurrently writing.
//!
//! The predicates here are the gates most bugs in this class of system hide
//! behind; each one documents exactly what it checks.

use std::collections::{BTreeMap, BTreeSet};

use crate::mode::QuorumMode;
use crate::status::Status;
use crate::store::{keys, StateStore, UnitId};

/// One ensemble member as read from its unit scope plus the app-scope
/// membership entry the coordinator maintains for it.
#[derive(Debug, Clone)]
pub struct UnitState {
    pub id: UnitId,
    /// Published network address, if any.
    pub host: Option<String>,
    /// Unit has reported its server process started.
    pub started: bool,
    /// Unit currently accepts both plaintext and encrypted peer traffic.
    pub unified: bool,
    /// The encryption mode the unit last restarted into.
    pub quorum: Option<QuorumMode>,
    /// Unit has restarted since the current password rotation began.
    pub password_rotated: bool,
    /// Coordinator has admitted the unit to the quorum membership set.
    pub admitted: bool,
}

/// Ensemble-wide state from the application scope.
#[derive(Debug, Clone)]
pub struct ClusterView {
    /// Internal user -> password, generated once by the first coordinator.
    pub credentials: BTreeMap<String, String>,
    /// Current target quorum encryption mode.
    pub quorum: QuorumMode,
    /// An encryption-mode transition is in flight.
    pub switching_encryption: bool,
    /// A password rotation awaits per-unit restart acks.
    pub rotate_passwords: bool,
    /// Units admitted to the quorum membership set.
    pub admitted: BTreeSet<UnitId>,
}

impl ClusterView {
    /// True once every internal user has a generated password.
    pub fn has_credentials(&self) -> bool {
        crate::INTERNAL_USERS
            .iter()
            .all(|user| self.credentials.contains_key(*user))
    }
}

/// Facts supplied by the platform, not read from the store.
#[derive(Debug, Clone)]
pub struct SnapshotContext {
    /// The unit this agent runs on.
    pub local: UnitId,
    /// Whether this unit currently holds the coordinator role.
    pub is_coordinator: bool,
    /// Whether a certificate relationship is present.
    pub certificate_present: bool,
    /// Units the topology currently plans for (including not-yet-started).
    pub topology: BTreeSet<UnitId>,
    /// The departing unit, when handling a departure notification.
    pub departing: Option<UnitId>,
}

/// An immutable, consistent-enough view of the whole ensemble.
#[derive(Debug, Clone)]
pub struct EnsembleSnapshot {
    pub context: SnapshotContext,
    pub cluster: ClusterView,
    pub units: BTreeMap<UnitId, UnitState>,
}

impl EnsembleSnapshot {
    /// Reads the store into a snapshot.
    pub fn capture(store: &dyn StateStore, context: SnapshotContext) -> Self {
        let mut credentials = BTreeMap::new();
        for user in crate::INTERNAL_USERS {
            let key = format!("{user}{}", keys::PASSWORD_SUFFIX);
            if let Some(password) = store.app_get(&key) {
                credentials.insert(user.to_string(), password);
            }
        }

        let quorum = store
            .app_get(keys::QUORUM)
            .and_then(|s| s.parse().ok())
            .unwrap_or(QuorumMode::DefaultNonSsl);

        // membership entries are keyed by bare unit id; scan all app keys
        // so leftover entries for departed units are still visible
        let mut admitted = BTreeSet::new();
        for key in store.app_keys() {
            if let Ok(id) = key.parse::<u32>() {
                if store.app_get(&key).as_deref() == Some(keys::ADDED) {
                    admitted.insert(UnitId(id));
                }
            }
        }

        let cluster = ClusterView {
            credentials,
            quorum,
            switching_encryption: store.app_get(keys::SWITCHING_ENCRYPTION).is_some(),
            rotate_passwords: store.app_get(keys::ROTATE_PASSWORDS).is_some(),
            admitted: admitted.clone(),
        };

        let mut units = BTreeMap::new();
        for id in &context.topology {
            let id = *id;
            units.insert(
                id,
                UnitState {
                    id,
                    host: store.unit_get(id, keys::HOST),
                    started: store.unit_get(id, keys::STATE).as_deref()
                        == Some(keys::STARTED),
                    unified: store.unit_get(id, keys::UNIFIED).as_deref() == Some("true"),
                    quorum: store
                        .unit_get(id, keys::UNIT_QUORUM)
                        .and_then(|s| s.parse().ok()),
                    password_rotated: store
                        .unit_get(id, keys::PASSWORD_ROTATED)
                        .as_deref()
                        == Some("true"),
                    admitted: admitted.contains(&id),
                },
            );
        }

        Self {
            context,
            cluster,
            units,
        }
    }

    /// The local unit's state, if it has joined the topology.
    pub fn local_unit(&self) -> Option<&UnitState> {
        self.units.get(&self.context.local)
    }

    /// Units that have reported `started`, ascending.
    pub fn started_units(&self) -> BTreeSet<UnitId> {
        self.units
            .values()
            .filter(|u| u.started)
            .map(|u| u.id)
            .collect()
    }

    /// The init leader: lowest unit id in the topology. Admitted
    /// unconditionally once started, since it has no predecessor to wait
    /// for.
    pub fn init_leader(&self) -> Option<UnitId> {
        self.context.topology.iter().next().copied()
    }

    /// The unit whose turn it is to start: the lowest topology member not
    /// yet started. Units start strictly in ascending id order.
    pub fn next_to_start(&self) -> Option<UnitId> {
        self.context
            .topology
            .iter()
            .copied()
            .find(|id| !self.units.get(id).is_some_and(|u| u.started))
    }

    /// True when every lower-id topology member has been admitted to the
    /// membership set, i.e. it is `unit`'s turn to join.
    pub fn predecessors_admitted(&self, unit: UnitId) -> bool {
        self.context
            .topology
            .iter()
            .take_while(|id| **id < unit)
            .all(|id| self.cluster.admitted.contains(id))
    }

    /// Stale-quorum detection, set-based: the admitted membership set is
    /// compared against the started set, and any difference in either
    /// direction is stale. Counts are never compared — a unit that is
    /// started while a leftover entry for a departed unit still exists
    /// would make counts agree and sets disagree.
    pub fn stale_quorum(&self) -> bool {
        self.cluster.admitted != self.started_units()
    }

    /// Every topology member has published its network address.
    pub fn all_units_related(&self) -> bool {
        self.units.values().all(|u| u.host.is_some())
    }

    /// Every unit runs unified (accepts both peer transports).
    pub fn all_units_unified(&self) -> bool {
        !self.units.is_empty() && self.units.values().all(|u| u.unified)
    }

    /// Every unit has restarted into the cluster's current target mode.
    ///
    /// The two plaintext variants are interchangeable here: a unit still
    /// reporting `default-non-ssl` after the bootstrap mode settles to
    /// `non-ssl` runs the identical transport and must not be restarted
    /// for a rename.
    pub fn all_units_quorum(&self) -> bool {
        !self.units.is_empty()
            && self
                .units
                .values()
                .all(|u| unit_mode_matches(u.quorum, self.cluster.quorum))
    }

    /// The master gate: no stale quorum, all units related, and any
    /// encryption switch either absent or already confirmed by every unit.
    pub fn stable(&self) -> bool {
        !self.stale_quorum()
            && self.all_units_related()
            && (!self.cluster.switching_encryption || self.all_units_quorum())
    }

    /// All units report started.
    pub fn healthy(&self) -> bool {
        !self.units.is_empty() && self.units.values().all(|u| u.started)
    }

    /// Gate for publishing client-facing connection data: stable and not
    /// mid-transition, so clients never observe a half-flipped transport.
    pub fn ready(&self) -> bool {
        self.stable() && !self.cluster.switching_encryption
    }

    /// Derives the operator-facing status for this snapshot.
    pub fn status(&self) -> Status {
        if self.context.topology.is_empty() {
            return Status::NoPeerState;
        }
        if !self.cluster.has_credentials() {
            return Status::NoCredentials;
        }
        if !self.all_units_related() {
            return Status::NotAllRelated;
        }
        if self
            .local_unit()
            .is_some_and(|u| !u.started && self.next_to_start() != Some(u.id))
        {
            return Status::NotUnitTurn;
        }
        if self.stale_quorum() {
            return Status::StaleQuorum;
        }
        if self.cluster.switching_encryption && !self.all_units_quorum() {
            return Status::SwitchingEncryption;
        }
        if self.all_units_unified() {
            // transition finished but units still run both transports
            return Status::AllUnified;
        }
        Status::Active
    }
}

/// Whether a unit's reported mode satisfies the cluster target, treating
/// the two plaintext variants as the same transport.
pub fn unit_mode_matches(unit: Option<QuorumMode>, target: QuorumMode) -> bool {
    match unit {
        Some(mode) => mode == target || (mode.is_plaintext() && target.is_plaintext()),
        None => false,
    }
}
