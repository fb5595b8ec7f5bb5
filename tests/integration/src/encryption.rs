//! Two-phase encryption transitions driven by certificate presence.

use warden_core::{keys, QuorumMode, StateStore, UnitId};

use crate::helpers::Ensemble;

fn bootstrapped(size: u32) -> Ensemble {
    let mut ens = Ensemble::new(size);
    ens.settle(6);
    assert!(ens.view().ready(), "bootstrap must converge first");
    ens
}

#[test]
fn certificate_starts_the_unification_phase() {
    let mut ens = bootstrapped(3);
    ens.certificate_present = true;

    ens.settle(1);
    assert!(
        ens.store.app_get(keys::SWITCHING_ENCRYPTION).is_some(),
        "transition flag raised"
    );
    // phase one: every unit restarts with port unification before any
    // transport flips
    assert_eq!(ens.view().cluster.quorum, QuorumMode::NonSsl);
    for id in 0..3 {
        assert_eq!(ens.workload(id).restarts.get(), 1);
        assert_eq!(
            ens.store.unit_get(UnitId(id), keys::UNIFIED).as_deref(),
            Some("true")
        );
    }
}

#[test]
fn switch_to_ssl_completes_in_three_rolling_restarts() {
    let mut ens = bootstrapped(3);
    ens.certificate_present = true;
    ens.settle(4);

    let view = ens.view();
    assert_eq!(view.cluster.quorum, QuorumMode::Ssl);
    assert!(
        !view.cluster.switching_encryption,
        "flag cleared once every unit confirmed the target mode"
    );
    for id in 0..3 {
        // unify, flip transport, drop unification
        assert_eq!(ens.workload(id).restarts.get(), 3);
        assert!(
            ens.store.unit_get(UnitId(id), keys::UNIFIED).is_none(),
            "unit {id} no longer runs both transports"
        );
        assert_eq!(
            ens.store.unit_get(UnitId(id), keys::UNIT_QUORUM).as_deref(),
            Some("ssl")
        );
    }
    assert!(view.ready());
}

#[test]
fn client_data_follows_the_transport_flip() {
    let mut ens = bootstrapped(3);
    let client = ens.add_client("appconsumer", "/", "relation-pw");
    ens.settle(1);
    assert_eq!(ens.store.client_get(&client, "tls").as_deref(), Some("disabled"));

    ens.certificate_present = true;
    ens.settle(4);

    assert_eq!(ens.store.client_get(&client, "tls").as_deref(), Some("enabled"));
    assert_eq!(
        ens.store.client_get(&client, "endpoints").as_deref(),
        Some("zk-0.local:2182,zk-1.local:2182,zk-2.local:2182")
    );
}

#[test]
fn certificate_removal_switches_back_to_plaintext() {
    let mut ens = bootstrapped(3);
    ens.certificate_present = true;
    ens.settle(4);
    assert_eq!(ens.view().cluster.quorum, QuorumMode::Ssl);

    ens.certificate_present = false;
    ens.settle(4);

    let view = ens.view();
    assert_eq!(view.cluster.quorum, QuorumMode::NonSsl);
    assert!(!view.cluster.switching_encryption);
    assert!(view.ready());
    for id in 0..3 {
        assert_eq!(ens.workload(id).restarts.get(), 6);
    }
}

#[test]
fn single_unit_ensemble_switches_too() {
    let mut ens = bootstrapped(1);
    ens.certificate_present = true;
    ens.settle(4);

    let view = ens.view();
    assert_eq!(view.cluster.quorum, QuorumMode::Ssl);
    assert!(!view.cluster.switching_encryption);
    assert_eq!(ens.workload(0).restarts.get(), 3);
}

#[test]
fn mid_switch_ensemble_is_not_ready() {
    let mut ens = bootstrapped(3);
    ens.certificate_present = true;
    ens.settle(2);

    // transport flipped but the flag has not cleared yet
    let view = ens.view();
    assert_eq!(view.cluster.quorum, QuorumMode::Ssl);
    assert!(view.cluster.switching_encryption);
    assert!(!view.ready());
}
