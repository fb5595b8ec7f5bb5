//! Per-unit control logic.
//!
//! [`UnitAgent`] wires the reconciler, materializer, restart lock and
//! workload together behind the event queue. Every handler is written to
//! be re-run safely: all decisions come from a fresh snapshot, all store
//! writes are idempotent, and "not yet" always reads as a status or a
//! deferral, never an error.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};
use warden_cluster::{QuorumReconciler, ReconcileTrigger, RestartLock};
use warden_config::{Materializer, RenderInput, ServerEntry};
use warden_core::{
    keys, EnsembleSnapshot, QuorumMode, SnapshotContext, StateStore, Status, UnitId,
    CLIENT_PORT, INTERNAL_USERS, SECURE_CLIENT_PORT,
};

use crate::events::{Disposition, Event};
use crate::workload::{Workload, WorkloadError};

/// Facts only the surrounding platform knows, supplied with every event.
#[derive(Debug, Clone)]
pub struct PlatformFacts {
    /// This unit currently holds the coordinator role.
    pub is_coordinator: bool,
    /// A certificate relationship is present.
    pub certificate_present: bool,
    /// Units the topology currently plans for.
    pub topology: BTreeSet<UnitId>,
}

/// The control loop body for one ensemble member.
pub struct UnitAgent<S, W> {
    unit: UnitId,
    host: String,
    store: S,
    workload: W,
    materializer: Materializer,
    lock: Arc<Mutex<RestartLock>>,
    data_dir: String,
    conf_dir: String,
    /// Post-restart settle time for the server to rejoin the quorum.
    /// Without it, the next lock holder could restart before this unit
    /// rejoined, dropping below quorum.
    settle_delay: Duration,
}

impl<S: StateStore, W: Workload> UnitAgent<S, W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        unit: UnitId,
        host: impl Into<String>,
        store: S,
        workload: W,
        lock: Arc<Mutex<RestartLock>>,
        conf_dir: impl Into<String>,
        data_dir: impl Into<String>,
        settle_delay: Duration,
    ) -> Self {
        let conf_dir = conf_dir.into();
        Self {
            unit,
            host: host.into(),
            store,
            workload,
            materializer: Materializer::new(conf_dir.clone()),
            lock,
            data_dir: data_dir.into(),
            conf_dir,
            settle_delay,
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Entry point: processes one event to completion or deferral.
    pub fn handle(&mut self, event: &Event, facts: &PlatformFacts) -> Disposition {
        match event {
            Event::WorkloadReady => self.handle_workload_ready(facts),
            _ => self.handle_changed(event, facts),
        }
    }

    /// Generic "something changed, update" handler for every topology,
    /// leadership, config and timer notification.
    fn handle_changed(&mut self, event: &Event, facts: &PlatformFacts) -> Disposition {
        if !self.workload.alive() {
            Status::ServiceNotRunning.log();
            return Disposition::Deferred;
        }

        // the unit always owns (and republishes) its own address
        self.store.unit_set(self.unit, keys::HOST, &self.host);

        if facts.is_coordinator {
            self.ensure_bootstrap();
        }

        let departing = event.departing();
        if let Some(departed) = departing {
            if departed != self.unit {
                // a departed unit can never release the lock it holds or
                // queues for
                self.lock().forget(departed);
                self.store.purge_unit(departed);
            }
        }

        let mut snapshot = self.snapshot(facts, departing);
        if !snapshot.local_unit().is_some_and(|u| u.started) {
            self.try_init_server(&snapshot);
            snapshot = self.snapshot(facts, departing);
        }

        // even if the local server has not started, the coordinator still
        // updates quorum so other units can make progress
        if facts.is_coordinator {
            self.update_quorum(&snapshot, trigger_for(event));
            snapshot = self.snapshot(facts, departing);
        }

        snapshot.status().log();

        // a dying unit must not delay its own removal by waiting on a
        // lock it will never release
        if departing == Some(self.unit) {
            return Disposition::Handled;
        }

        let started = snapshot.local_unit().is_some_and(|u| u.started);
        if started
            && (self.materializer.config_changed(&self.render_input(&snapshot))
                || snapshot.cluster.switching_encryption)
        {
            self.lock().request(self.unit);
        }

        if self.lock().granted(self.unit) {
            let disposition = self.try_restart(facts);
            if disposition != Disposition::Handled {
                return disposition;
            }
        }

        // a single-unit ensemble restarting for an encryption switch is
        // its own only quorum member; redeliver so the event is processed
        // again after the restart instead of being lost
        let snapshot = self.snapshot(facts, departing);
        if snapshot.cluster.switching_encryption && facts.topology.len() == 1 {
            return Disposition::Deferred;
        }

        Disposition::Handled
    }

    /// Handles the process manager reporting the container ready, which
    /// also covers the workload having died and needing a re-init.
    fn handle_workload_ready(&mut self, facts: &PlatformFacts) -> Disposition {
        let snapshot = self.snapshot(facts, None);
        if !self.workload.alive() || !snapshot.local_unit().is_some_and(|u| u.started) {
            return Disposition::Deferred;
        }

        match self.workload.healthy() {
            Ok(true) => Disposition::Handled,
            Ok(false) | Err(WorkloadError::Transient(_)) => {
                info!("workload service not running, re-initialising");
                Status::ServiceUnhealthy.log();
                self.materialize_and_start(&snapshot)
            }
            Err(WorkloadError::Failed(reason)) => {
                warn!(%reason, "workload probe failed");
                Disposition::Failed
            }
        }
    }

    /// First coordinator generates internal credentials exactly once and
    /// seeds the bootstrap quorum mode. Idempotent.
    fn ensure_bootstrap(&mut self) {
        for user in INTERNAL_USERS {
            let key = format!("{user}{}", keys::PASSWORD_SUFFIX);
            if self.store.app_get(&key).is_none() {
                let password = self.workload.generate_password();
                self.store.app_set(&key, &password);
                info!(%user, "internal user credentials created");
            }
        }
        if self.store.app_get(keys::QUORUM).is_none() {
            self.store
                .app_set(keys::QUORUM, QuorumMode::DefaultNonSsl.as_str());
        }
    }

    /// Startup gate: credentials exist, every unit related, strictly this
    /// unit's turn, all predecessors admitted.
    fn try_init_server(&mut self, snapshot: &EnsembleSnapshot) {
        if !snapshot.cluster.has_credentials() {
            Status::NoCredentials.log();
            return;
        }
        if !snapshot.all_units_related() {
            Status::NotAllRelated.log();
            return;
        }
        if snapshot.next_to_start() != Some(self.unit)
            || !snapshot.predecessors_admitted(self.unit)
        {
            Status::NotUnitTurn.log();
            return;
        }

        info!(unit = %self.unit, "initializing server");
        if self.materialize_and_start(snapshot) == Disposition::Handled {
            info!(unit = %self.unit, "server started");
        }
    }

    /// Renders config, starts the workload and publishes the unit flags.
    /// Also the re-init path when the service died.
    fn materialize_and_start(&mut self, snapshot: &EnsembleSnapshot) -> Disposition {
        if let Err(err) = self.materializer.apply(&self.render_input(snapshot)) {
            warn!(%err, "failed to materialize server config");
            return Disposition::Failed;
        }
        if let Err(err) = self.workload.start() {
            warn!(%err, "failed to start workload");
            return Disposition::Deferred;
        }

        self.store.unit_set(self.unit, keys::STATE, keys::STARTED);
        self.publish_transition_flags(snapshot);
        Disposition::Handled
    }

    /// Coordinator-side reconciliation: apply the membership/encryption
    /// delta, then republish client data.
    fn update_quorum(&mut self, snapshot: &EnsembleSnapshot, trigger: ReconcileTrigger) {
        let outcome = QuorumReconciler::reconcile(snapshot, trigger);
        if !outcome.is_noop() {
            debug!(?outcome, "applying reconciliation outcome");
            outcome.apply(&self.store);
        }
        self.update_client_data(&self.snapshot_from(snapshot));
    }

    /// Executes a granted restart: restart, settle, publish, release.
    fn try_restart(&mut self, facts: &PlatformFacts) -> Disposition {
        let snapshot = self.snapshot(facts, None);
        // membership must be settled before taking a member down; the
        // full stable() predicate would deadlock here mid-flip, since
        // units confirm the new mode only by restarting
        if snapshot.stale_quorum()
            || !snapshot.all_units_related()
            || !snapshot.local_unit().is_some_and(|u| u.started)
        {
            return Disposition::Deferred;
        }

        info!(unit = %self.unit, "restarting");
        if let Err(err) = self.materializer.apply(&self.render_input(&snapshot)) {
            warn!(%err, "failed to materialize config before restart");
            self.lock().release(self.unit);
            return Disposition::Failed;
        }
        if let Err(err) = self.workload.restart() {
            warn!(%err, "restart failed");
            self.lock().release(self.unit);
            return Disposition::Failed;
        }

        // give the server time to rejoin the quorum before the next
        // holder restarts
        std::thread::sleep(self.settle_delay);

        self.publish_transition_flags(&snapshot);
        self.lock().release(self.unit);

        self.update_client_data(&self.snapshot(facts, None));
        Disposition::Handled
    }

    /// Publishes the unit-scope flags other units and the coordinator
    /// key off: unified, confirmed quorum mode, password-rotation ack.
    fn publish_transition_flags(&mut self, snapshot: &EnsembleSnapshot) {
        if snapshot.cluster.switching_encryption {
            self.store.unit_set(self.unit, keys::UNIFIED, "true");
        } else {
            self.store.unit_remove(self.unit, keys::UNIFIED);
        }
        self.store.unit_set(
            self.unit,
            keys::UNIT_QUORUM,
            snapshot.cluster.quorum.as_str(),
        );
        if snapshot.cluster.rotate_passwords {
            self.store
                .unit_set(self.unit, keys::PASSWORD_ROTATED, "true");
        } else {
            self.store.unit_remove(self.unit, keys::PASSWORD_ROTATED);
        }
    }

    /// Publishes connection data to every provisioned client. Coordinator
    /// only, and only once the ensemble is ready — a client must never
    /// observe a half-flipped transport.
    fn update_client_data(&mut self, snapshot: &EnsembleSnapshot) {
        if !snapshot.context.is_coordinator || !snapshot.ready() {
            return;
        }

        let ssl = snapshot.cluster.quorum == QuorumMode::Ssl;
        let port = if ssl { SECURE_CLIENT_PORT } else { CLIENT_PORT };
        let endpoints: Vec<String> = snapshot
            .cluster
            .admitted
            .iter()
            .filter_map(|id| snapshot.units.get(id))
            .filter_map(|u| u.host.clone())
            .map(|host| format!("{host}:{port}"))
            .collect();
        if endpoints.is_empty() {
            return;
        }
        let endpoints = endpoints.join(",");

        for client in self.store.clients() {
            // no password means ACLs are not provisioned yet; skip
            let Some(password) = self.store.client_get(&client, "password") else {
                continue;
            };
            let chroot = self
                .store
                .client_get(&client, "chroot")
                .unwrap_or_else(|| "/".into());
            self.store
                .client_set(&client, "uris", &format!("{endpoints}{chroot}"));
            self.store.client_set(&client, "endpoints", &endpoints);
            self.store.client_set(&client, "chroot", &chroot);
            self.store
                .client_set(&client, "tls", if ssl { "enabled" } else { "disabled" });
            self.store.client_set(&client, "username", &client.0);
            self.store.client_set(&client, "password", &password);
        }
    }

    /// Servers this unit should list at startup: every admitted unit plus
    /// itself, so a joining server can find the existing ensemble.
    fn render_input(&self, snapshot: &EnsembleSnapshot) -> RenderInput {
        let mut ids: BTreeSet<UnitId> = snapshot.cluster.admitted.clone();
        ids.insert(self.unit);

        let servers = ids
            .iter()
            .filter_map(|id| {
                let host = if *id == self.unit {
                    Some(self.host.clone())
                } else {
                    snapshot.units.get(id).and_then(|u| u.host.clone())
                };
                host.map(|host| ServerEntry { id: *id, host })
            })
            .collect();

        RenderInput {
            myid: self.unit,
            servers,
            mode: snapshot.cluster.quorum,
            unified: snapshot.cluster.switching_encryption,
            credentials: snapshot.cluster.credentials.clone(),
            data_dir: self.data_dir.clone(),
            conf_dir: self.conf_dir.clone(),
        }
    }

    fn snapshot(&self, facts: &PlatformFacts, departing: Option<UnitId>) -> EnsembleSnapshot {
        EnsembleSnapshot::capture(
            &self.store,
            SnapshotContext {
                local: self.unit,
                is_coordinator: facts.is_coordinator,
                certificate_present: facts.certificate_present,
                topology: facts.topology.clone(),
                departing,
            },
        )
    }

    fn snapshot_from(&self, previous: &EnsembleSnapshot) -> EnsembleSnapshot {
        EnsembleSnapshot::capture(&self.store, previous.context.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RestartLock> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn trigger_for(event: &Event) -> ReconcileTrigger {
    match event {
        Event::NodeDeparted(_) => ReconcileTrigger::UnitDeparted,
        Event::CoordinatorElected => ReconcileTrigger::CoordinatorElected,
        Event::Tick => ReconcileTrigger::Timer,
        _ => ReconcileTrigger::TopologyChanged,
    }
}
