//! The quorum reconciliation engine.
//!
//! [`QuorumReconciler::reconcile`] computes the next membership set and
//! encryption-mode transition from a snapshot. It is a pure function: no
//! retries, no I/O, no fatal errors — missing inputs read as "not yet
//! stable" and the next externally-triggered pass corrects anything
//! transiently inconsistent. Running it twice against unchanged state
//! yields an empty outcome, which is what makes at-least-once event
//! delivery safe.
//!
//! # Membership
//!
//! Units join the quorum strictly in ascending unit-id order. The init
//! leader (lowest id) is admitted unconditionally as soon as it reports
//! started; everyone else waits until every lower-id topology member is
//! admitted. Admission is monotonic: an admitted unit is only ever removed
//! when it leaves the topology.
//!
//! # Encryption
//!
//! ZooKeeper servers cannot atomically switch peer-transport encryption
//! cluster-wide, so the transition runs in two phases. First every unit
//! restarts into unified mode (accepting both transports); only once all
//! units report unified does the target mode flip to `ssl` (certificate
//! relationship present) or back to `non-ssl`. The switching flag clears
//! only after every unit confirms it restarted into the new target, at
//! which point units drop unification on their next restart.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use warden_core::{
    keys, unit_mode_matches, EnsembleSnapshot, QuorumMode, StateStore, UnitId,
};

/// What to do with one unit's membership entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    /// Admit the unit to the quorum membership set.
    Add,
    /// Drop the entry of a unit that left the topology.
    Remove,
}

/// The kind of notification that triggered a reconciliation pass.
///
/// Departures and coordinator re-elections force a full membership
/// recompute even when the quorum does not look stale, to act without
/// delay on scale-down and failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    TopologyChanged,
    UnitDeparted,
    CoordinatorElected,
    Timer,
}

impl ReconcileTrigger {
    fn forces_recompute(self) -> bool {
        matches!(
            self,
            ReconcileTrigger::UnitDeparted | ReconcileTrigger::CoordinatorElected
        )
    }
}

/// The computed delta of one reconciliation pass.
///
/// Not persisted independently; [`ReconcileOutcome::apply`] writes it
/// straight into the application scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Per-unit membership changes.
    pub membership: BTreeMap<UnitId, MembershipAction>,
    /// Begin an encryption-mode transition (set the switching flag).
    pub set_switching: bool,
    /// Flip the cluster target mode.
    pub quorum_mode: Option<QuorumMode>,
    /// Transition confirmed by every unit; clear the switching flag.
    pub clear_switching: bool,
}

impl ReconcileOutcome {
    /// True when applying this outcome would not mutate anything.
    pub fn is_noop(&self) -> bool {
        self.membership.is_empty()
            && !self.set_switching
            && self.quorum_mode.is_none()
            && !self.clear_switching
    }

    /// Writes the delta into the application scope. Coordinator only.
    ///
    /// Returns whether any stored state actually changed, so callers can
    /// decide whether a change notification is warranted.
    pub fn apply(&self, store: &dyn StateStore) -> bool {
        let mut changed = false;
        for (unit, action) in &self.membership {
            changed |= match action {
                MembershipAction::Add => store.app_set(&unit.to_string(), keys::ADDED),
                MembershipAction::Remove => store.app_remove(&unit.to_string()),
            };
        }
        if self.set_switching {
            changed |= store.app_set(keys::SWITCHING_ENCRYPTION, "true");
        }
        if let Some(mode) = self.quorum_mode {
            changed |= store.app_set(keys::QUORUM, mode.as_str());
        }
        if self.clear_switching {
            changed |= store.app_remove(keys::SWITCHING_ENCRYPTION);
        }
        changed
    }
}

/// Pure membership/encryption reconciliation over snapshots.
pub struct QuorumReconciler;

impl QuorumReconciler {
    /// Computes the next membership and encryption delta.
    ///
    /// Returns an empty outcome on non-coordinator units and when the
    /// local unit is itself the departing unit — a dying unit must not
    /// delay its own removal.
    pub fn reconcile(
        snapshot: &EnsembleSnapshot,
        trigger: ReconcileTrigger,
    ) -> ReconcileOutcome {
        let mut out = ReconcileOutcome::default();

        if !snapshot.context.is_coordinator
            || snapshot.context.departing == Some(snapshot.context.local)
        {
            return out;
        }

        // init leader joins as soon as it reports started; without this
        // bootstrap would deadlock waiting for a predecessor that does
        // not exist
        if let Some(leader) = snapshot.init_leader() {
            let started = snapshot.units.get(&leader).is_some_and(|u| u.started);
            if started && !snapshot.cluster.admitted.contains(&leader) {
                out.membership.insert(leader, MembershipAction::Add);
            }
        }

        if snapshot.stale_quorum() || trigger.forces_recompute() || snapshot.healthy() {
            Self::recompute_membership(snapshot, &mut out);
        }

        // the encryption machine only runs against a stable ensemble;
        // mid-admission or mid-restart state would race the flip
        if !snapshot.stable() {
            return out;
        }

        Self::reconcile_encryption(snapshot, &mut out);
        out
    }

    /// Recomputes the full desired membership set.
    fn recompute_membership(snapshot: &EnsembleSnapshot, out: &mut ReconcileOutcome) {
        // monotonic base: keep everything admitted that is still planned
        let mut desired: BTreeSet<UnitId> = snapshot
            .cluster
            .admitted
            .intersection(&snapshot.context.topology)
            .copied()
            .collect();
        for (unit, action) in &out.membership {
            if *action == MembershipAction::Add {
                desired.insert(*unit);
            }
        }

        // ascending walk: admit each started unit once all its
        // predecessors made it in
        for id in &snapshot.context.topology {
            let started = snapshot.units.get(id).is_some_and(|u| u.started);
            let predecessors_in = snapshot
                .context
                .topology
                .iter()
                .take_while(|p| *p < id)
                .all(|p| desired.contains(p));
            if started && predecessors_in {
                desired.insert(*id);
            }
        }

        for id in desired.difference(&snapshot.cluster.admitted) {
            out.membership.insert(*id, MembershipAction::Add);
        }
        // entries for units outside the topology are departures (or
        // leftovers from one); everything else is monotonic
        for id in &snapshot.cluster.admitted {
            if !snapshot.context.topology.contains(id) {
                out.membership.insert(*id, MembershipAction::Remove);
            }
        }

        if !out.membership.is_empty() {
            debug!(delta = ?out.membership, "membership recomputed");
        }
    }

    /// The two-phase encryption-mode machine. Snapshot is known stable.
    fn reconcile_encryption(snapshot: &EnsembleSnapshot, out: &mut ReconcileOutcome) {
        let cluster = &snapshot.cluster;
        let want_ssl = snapshot.context.certificate_present;
        let is_ssl = cluster.quorum == QuorumMode::Ssl;

        if !cluster.switching_encryption {
            if want_ssl != is_ssl {
                // phase one: every unit must first restart into unified
                // mode before any unit flips its transport
                debug!(
                    target_ssl = want_ssl,
                    "certificate relationship changed, switching quorum encryption"
                );
                out.set_switching = true;
                return;
            }
            if cluster.quorum == QuorumMode::DefaultNonSsl && snapshot.healthy() {
                // bootstrap settled without certificates; same transport,
                // no restarts required
                out.quorum_mode = Some(QuorumMode::NonSsl);
            }
            return;
        }

        if !snapshot.all_units_unified() {
            return;
        }

        // phase two: all units accept both transports, flip together
        let target = if want_ssl {
            QuorumMode::Ssl
        } else {
            QuorumMode::NonSsl
        };
        if cluster.quorum != target {
            debug!(%target, "all units unified, flipping quorum mode");
            out.quorum_mode = Some(target);
        }

        // completion: clear only once every unit confirms it restarted
        // into the target
        let all_confirmed = !snapshot.units.is_empty()
            && snapshot
                .units
                .values()
                .all(|u| unit_mode_matches(u.quorum, target));
        if all_confirmed {
            debug!(%target, "all units on target quorum encryption, transition complete");
            out.clear_switching = true;
        }
    }
}
