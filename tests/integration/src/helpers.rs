//! Test harness running a whole ensemble of unit agents in-process.
//!
//! Every agent shares one [`MemoryStore`] and one restart lock, the way
//! deployed units share relation data, and events are delivered to each
//! member in turn like a platform dispatching hooks.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use warden_agent::events::{Disposition, Event};
use warden_agent::handlers::{PlatformFacts, UnitAgent};
use warden_agent::workload::{Workload, WorkloadError};
use warden_cluster::RestartLock;
use warden_core::{ClientId, EnsembleSnapshot, MemoryStore, SnapshotContext, StateStore, UnitId};

/// Scripted workload; records start/restart counts, liveness is toggled
/// by tests.
#[derive(Clone)]
pub struct FakeWorkload {
    pub alive: Rc<Cell<bool>>,
    pub starts: Rc<Cell<u32>>,
    pub restarts: Rc<Cell<u32>>,
}

impl Default for FakeWorkload {
    fn default() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
            starts: Rc::new(Cell::new(0)),
            restarts: Rc::new(Cell::new(0)),
        }
    }
}

impl Workload for FakeWorkload {
    fn alive(&self) -> bool {
        self.alive.get()
    }
    fn healthy(&self) -> Result<bool, WorkloadError> {
        Ok(self.alive.get())
    }
    fn start(&mut self) -> Result<(), WorkloadError> {
        self.starts.set(self.starts.get() + 1);
        Ok(())
    }
    fn restart(&mut self) -> Result<(), WorkloadError> {
        self.restarts.set(self.restarts.get() + 1);
        Ok(())
    }
}

struct Member {
    agent: UnitAgent<MemoryStore, FakeWorkload>,
    workload: FakeWorkload,
    _conf_dir: tempfile::TempDir,
}

/// An in-process ensemble. Member 0 is the coordinator.
pub struct Ensemble {
    pub store: MemoryStore,
    pub lock: Arc<Mutex<RestartLock>>,
    pub certificate_present: bool,
    members: Vec<Member>,
}

impl Ensemble {
    pub fn new(size: u32) -> Self {
        let store = MemoryStore::new();
        let lock = Arc::new(Mutex::new(RestartLock::new()));
        let members = (0..size)
            .map(|id| Member::spawn(id, store.clone(), Arc::clone(&lock)))
            .collect();
        Self {
            store,
            lock,
            certificate_present: false,
            members,
        }
    }

    fn facts(&self, coordinator: bool) -> PlatformFacts {
        PlatformFacts {
            is_coordinator: coordinator,
            certificate_present: self.certificate_present,
            topology: self.members.iter().map(|m| m.agent.unit()).collect(),
        }
    }

    /// Delivers one event to every member, coordinator first, and
    /// returns each member's disposition.
    pub fn deliver(&mut self, event: &Event) -> Vec<Disposition> {
        let mut out = Vec::with_capacity(self.members.len());
        for index in 0..self.members.len() {
            let facts = self.facts(index == 0);
            out.push(self.members[index].agent.handle(event, &facts));
        }
        out
    }

    /// Runs `passes` timer ticks across the whole ensemble.
    pub fn settle(&mut self, passes: usize) {
        for _ in 0..passes {
            self.deliver(&Event::Tick);
        }
    }

    /// Adds a member with the next unit id and notifies everyone.
    pub fn grow(&mut self) -> u32 {
        let id = self
            .members
            .iter()
            .map(|m| m.agent.unit().0 + 1)
            .max()
            .unwrap_or(0);
        self.members
            .push(Member::spawn(id, self.store.clone(), Arc::clone(&self.lock)));
        self.deliver(&Event::NodeJoined(UnitId(id)));
        id
    }

    /// Removes the member with `id` and notifies the survivors.
    pub fn depart(&mut self, id: u32) {
        self.members.retain(|m| m.agent.unit() != UnitId(id));
        self.deliver(&Event::NodeDeparted(UnitId(id)));
    }

    pub fn workload(&self, id: u32) -> &FakeWorkload {
        &self
            .members
            .iter()
            .find(|m| m.agent.unit() == UnitId(id))
            .unwrap_or_else(|| panic!("no member with id {id}"))
            .workload
    }

    /// Captures the store from the coordinator's point of view.
    pub fn view(&self) -> EnsembleSnapshot {
        EnsembleSnapshot::capture(
            &self.store,
            SnapshotContext {
                local: UnitId(0),
                is_coordinator: true,
                certificate_present: self.certificate_present,
                topology: self.members.iter().map(|m| m.agent.unit()).collect(),
                departing: None,
            },
        )
    }

    /// Registers a provisioned client with an already-assigned password.
    pub fn add_client(&self, name: &str, chroot: &str, password: &str) -> ClientId {
        let client = ClientId(name.into());
        self.store.register_client(client.clone(), chroot);
        self.store.client_set(&client, "password", password);
        client
    }
}

impl Member {
    fn spawn(id: u32, store: MemoryStore, lock: Arc<Mutex<RestartLock>>) -> Self {
        let workload = FakeWorkload::default();
        let conf_dir = tempfile::tempdir().expect("tempdir");
        let agent = UnitAgent::new(
            UnitId(id),
            format!("zk-{id}.local"),
            store,
            workload.clone(),
            lock,
            conf_dir.path().to_string_lossy().into_owned(),
            "/var/lib/zookeeper",
            Duration::ZERO,
        );
        Self {
            agent,
            workload,
            _conf_dir: conf_dir,
        }
    }
}
