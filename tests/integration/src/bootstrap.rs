//! Ensemble bootstrap: credentials, ordered startup, admission, client
//! connection data.

use warden_agent::events::Event;
use warden_core::{keys, QuorumMode, StateStore, UnitId};

use crate::helpers::Ensemble;

#[test]
fn three_unit_bootstrap_converges() {
    let mut ens = Ensemble::new(3);
    ens.settle(6);

    let view = ens.view();
    assert!(view.healthy(), "all units started");
    assert!(view.stable());
    assert!(view.ready());
    assert_eq!(
        view.cluster.admitted,
        [UnitId(0), UnitId(1), UnitId(2)].into_iter().collect()
    );
    // bootstrap mode settles to its explicit plaintext name once the
    // ensemble is stable and healthy
    assert_eq!(view.cluster.quorum, QuorumMode::NonSsl);

    for id in 0..3 {
        assert_eq!(ens.workload(id).starts.get(), 1, "unit {id} started once");
        assert_eq!(
            ens.workload(id).restarts.get(),
            0,
            "the plaintext mode rename must not restart unit {id}"
        );
    }
}

#[test]
fn startup_is_strictly_ordered() {
    let mut ens = Ensemble::new(3);

    // first pass publishes addresses; second starts units 0 and 1 (unit 1
    // observes unit 0's admission within the same pass). unit 2 waits for
    // unit 1's admission, which lands on the next coordinator pass.
    ens.settle(2);
    assert_eq!(ens.workload(0).starts.get(), 1);
    assert_eq!(ens.workload(1).starts.get(), 1);
    assert_eq!(ens.workload(2).starts.get(), 0, "unit 2 waits for its turn");

    ens.settle(1);
    assert_eq!(ens.workload(2).starts.get(), 1);
}

#[test]
fn credentials_generated_once() {
    let mut ens = Ensemble::new(3);
    ens.settle(3);
    let first = ens.store.app_get("super-password").expect("super password");
    assert!(ens.store.app_get("sync-password").is_some());

    ens.settle(3);
    assert_eq!(ens.store.app_get("super-password").unwrap(), first);
}

#[test]
fn single_unit_ensemble_bootstraps() {
    let mut ens = Ensemble::new(1);
    ens.settle(4);

    let view = ens.view();
    assert!(view.healthy());
    assert!(view.ready());
    assert_eq!(ens.store.app_get("0").as_deref(), Some(keys::ADDED));
}

#[test]
fn client_data_published_once_ready() {
    let mut ens = Ensemble::new(3);
    let client = ens.add_client("appconsumer", "/myapp", "relation-pw");
    ens.settle(6);

    let endpoints = ens
        .store
        .client_get(&client, "endpoints")
        .expect("endpoints published");
    assert_eq!(
        endpoints,
        "zk-0.local:2181,zk-1.local:2181,zk-2.local:2181"
    );
    assert_eq!(
        ens.store.client_get(&client, "uris").as_deref(),
        Some("zk-0.local:2181,zk-1.local:2181,zk-2.local:2181/myapp")
    );
    assert_eq!(ens.store.client_get(&client, "tls").as_deref(), Some("disabled"));
    assert_eq!(
        ens.store.client_get(&client, "username").as_deref(),
        Some("appconsumer")
    );
    assert_eq!(
        ens.store.client_get(&client, "chroot").as_deref(),
        Some("/myapp")
    );
}

#[test]
fn default_chroot_is_published_back() {
    let mut ens = Ensemble::new(1);
    // provisioned with credentials but no requested chroot
    let client = warden_core::ClientId("bare".into());
    ens.store.client_set(&client, "password", "pw");
    ens.settle(4);

    assert_eq!(ens.store.client_get(&client, "chroot").as_deref(), Some("/"));
    assert_eq!(
        ens.store.client_get(&client, "uris").as_deref(),
        Some("zk-0.local:2181/")
    );
}

#[test]
fn client_without_password_is_skipped() {
    let mut ens = Ensemble::new(1);
    let client = warden_core::ClientId("pending".into());
    ens.store.register_client(client.clone(), "/");
    ens.settle(4);

    assert!(
        ens.store.client_get(&client, "endpoints").is_none(),
        "no connection data until ACL credentials exist"
    );
}

#[test]
fn dead_workload_defers_progress() {
    let mut ens = Ensemble::new(1);
    ens.workload(0).alive.set(false);
    let dispositions = ens.deliver(&Event::Tick);
    assert_eq!(
        dispositions,
        vec![warden_agent::events::Disposition::Deferred]
    );
    assert!(
        ens.store.unit_get(UnitId(0), keys::STATE).is_none(),
        "no state published while the service is down"
    );
}
