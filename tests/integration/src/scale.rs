//! Scaling the ensemble up and down.

use warden_core::{keys, QuorumMode, StateStore, UnitId};

use crate::helpers::Ensemble;

fn bootstrapped(size: u32) -> Ensemble {
    let mut ens = Ensemble::new(size);
    ens.settle(6);
    assert!(ens.view().ready());
    ens
}

#[test]
fn new_unit_joins_an_established_ensemble() {
    let mut ens = bootstrapped(3);
    let id = ens.grow();
    ens.settle(3);

    let view = ens.view();
    assert!(view.cluster.admitted.contains(&UnitId(id)));
    assert!(view.healthy());
    assert!(view.ready());
    assert_eq!(ens.workload(id).starts.get(), 1);
    for survivor in 0..3 {
        assert_eq!(
            ens.workload(survivor).restarts.get(),
            0,
            "running peers pick the member up over live reconfig"
        );
    }
}

#[test]
fn departure_purges_all_trace_of_the_unit() {
    let mut ens = bootstrapped(3);
    ens.depart(2);
    ens.settle(2);

    assert!(
        ens.store.app_get("2").is_none(),
        "membership entry removed"
    );
    assert!(
        ens.store.unit_get(UnitId(2), keys::HOST).is_none(),
        "unit scope purged"
    );
    let view = ens.view();
    assert_eq!(
        view.cluster.admitted,
        [UnitId(0), UnitId(1)].into_iter().collect()
    );
    assert!(view.ready(), "survivors converge back to ready");
}

#[test]
fn departed_holder_cannot_wedge_the_restart_lock() {
    let mut ens = bootstrapped(3);
    // unit 2 dies while queued for a restart
    ens.lock.lock().unwrap().request(UnitId(2));
    ens.depart(2);

    let lock = ens.lock.lock().unwrap();
    assert_ne!(lock.holder(), Some(UnitId(2)));
    assert!(!lock.pending().any(|unit| unit == UnitId(2)));
}

#[test]
fn leftover_membership_entry_is_detected_and_dropped() {
    let mut ens = bootstrapped(3);
    // a stale entry for a unit that never cleanly departed
    ens.store.app_set("9", keys::ADDED);
    assert!(ens.view().stale_quorum());

    ens.settle(1);
    assert!(ens.store.app_get("9").is_none());
    assert!(ens.view().ready());
}

#[test]
fn scale_up_during_switch_waits_for_stability() {
    let mut ens = bootstrapped(3);
    ens.certificate_present = true;
    ens.settle(1); // transition begins

    let id = ens.grow();
    ens.settle(6);

    let view = ens.view();
    assert!(view.cluster.admitted.contains(&UnitId(id)));
    assert!(!view.cluster.switching_encryption);
    assert!(view.ready());
}

#[test]
fn middle_unit_departure_leaves_admission_order_intact() {
    let mut ens = bootstrapped(3);
    ens.depart(1);
    ens.settle(2);

    let view = ens.view();
    assert_eq!(
        view.cluster.admitted,
        [UnitId(0), UnitId(2)].into_iter().collect()
    );
    assert!(view.ready(), "the gap in unit ids is not a problem");
}

#[test]
fn new_unit_joins_an_ssl_ensemble() {
    let mut ens = bootstrapped(3);
    ens.certificate_present = true;
    ens.settle(4);
    assert_eq!(ens.view().cluster.quorum, QuorumMode::Ssl);

    let id = ens.grow();
    ens.settle(6);

    let view = ens.view();
    assert!(view.cluster.admitted.contains(&UnitId(id)));
    assert_eq!(view.cluster.quorum, QuorumMode::Ssl);
    assert!(view.ready());
}
