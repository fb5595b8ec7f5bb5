//! Rolling upgrades against a converged ensemble.

use std::sync::Mutex;
use std::time::Duration;

use warden_cluster::{
    PartitionError, Partitioner, ProbeError, QuorumProbe, UnitUpgradeState, UpgradeConfig,
    UpgradeError, UpgradeOrchestrator,
};
use warden_core::{StateStore, UnitId};

use crate::helpers::Ensemble;

struct LiveProbe {
    broadcasting: Mutex<Vec<Result<bool, ProbeError>>>,
    count: usize,
}

impl LiveProbe {
    fn healthy(count: usize) -> Self {
        Self {
            broadcasting: Mutex::new(Vec::new()),
            count,
        }
    }
}

impl QuorumProbe for LiveProbe {
    fn members_broadcasting(&self) -> Result<bool, ProbeError> {
        self.broadcasting.lock().unwrap().pop().unwrap_or(Ok(true))
    }
    fn members_syncing(&self) -> Result<bool, ProbeError> {
        Ok(false)
    }
    fn server_count(&self) -> Result<usize, ProbeError> {
        Ok(self.count)
    }
}

#[derive(Default)]
struct RecordingPartitioner {
    partitions: Mutex<Vec<u32>>,
    denied: bool,
}

impl Partitioner for &RecordingPartitioner {
    fn set_update_partition(&self, partition: u32) -> Result<(), PartitionError> {
        if self.denied {
            return Err(PartitionError::Forbidden);
        }
        self.partitions.lock().unwrap().push(partition);
        Ok(())
    }
}

fn fast() -> UpgradeConfig {
    UpgradeConfig {
        attempts: 3,
        backoff_min: Duration::from_millis(1),
        backoff_max: Duration::from_millis(2),
    }
}

fn converged(size: u32) -> Ensemble {
    let mut ens = Ensemble::new(size);
    ens.settle(6);
    assert!(ens.view().ready());
    ens
}

#[tokio::test(start_paused = true)]
async fn full_rolling_upgrade_completes_in_reverse_order() {
    let ens = converged(3);
    let partitioner = RecordingPartitioner::default();
    let mut orch = UpgradeOrchestrator::new(LiveProbe::healthy(3), &partitioner, fast());

    let snapshot = ens.view();
    orch.pre_upgrade_check(&snapshot).await.expect("pre-check");
    // idle pre-check holds every unit back behind partition n-1
    assert_eq!(partitioner.partitions.lock().unwrap().as_slice(), &[2]);

    orch.begin(vec![UnitId(0), UnitId(1), UnitId(2)]);
    let mut upgraded = Vec::new();
    while let Some(unit) = orch.next_unit() {
        orch.pre_upgrade_check(&snapshot).await.expect("pre-check");
        // the platform restarts the unit into the new version here
        orch.post_upgrade_check(&snapshot, || true)
            .await
            .expect("post-check");
        orch.set_unit_completed(unit);
        upgraded.push(unit);
    }

    assert_eq!(upgraded, vec![UnitId(2), UnitId(1), UnitId(0)]);
    assert!(orch.idle());
    for id in 0..3 {
        assert_eq!(
            orch.unit_state(UnitId(id)),
            Some(UnitUpgradeState::Completed)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn unstable_ensemble_blocks_the_upgrade() {
    let mut ens = converged(3);
    // a transition in flight makes the snapshot unstable mid-restart
    ens.certificate_present = true;
    ens.store
        .app_set(warden_core::keys::SWITCHING_ENCRYPTION, "true");
    ens.store
        .unit_remove(UnitId(1), warden_core::keys::UNIT_QUORUM);

    let partitioner = RecordingPartitioner::default();
    let orch = UpgradeOrchestrator::new(LiveProbe::healthy(3), &partitioner, fast());

    let err = orch.pre_upgrade_check(&ens.view()).await.unwrap_err();
    assert!(matches!(err, UpgradeError::NotReady(_)));
}

#[tokio::test(start_paused = true)]
async fn unhealthy_unit_halts_and_awaits_operator() {
    let ens = converged(3);
    let partitioner = RecordingPartitioner::default();
    let mut orch = UpgradeOrchestrator::new(LiveProbe::healthy(3), &partitioner, fast());
    let snapshot = ens.view();

    orch.begin(vec![UnitId(0), UnitId(1), UnitId(2)]);
    let unit = orch.next_unit().expect("first unit");
    orch.pre_upgrade_check(&snapshot).await.expect("pre-check");

    // the restarted workload never comes back healthy
    let err = orch
        .post_upgrade_check(&snapshot, || false)
        .await
        .unwrap_err();
    assert!(matches!(err, UpgradeError::NotReady(_)));
    orch.set_unit_failed(unit);

    assert_eq!(orch.unit_state(unit), Some(UnitUpgradeState::Failed));
    assert_eq!(orch.next_unit(), None, "upgrade halted");
    assert_eq!(
        orch.unit_state(UnitId(0)),
        Some(UnitUpgradeState::Pending),
        "remaining units untouched"
    );
}

#[tokio::test(start_paused = true)]
async fn denied_partition_patch_surfaces_as_infrastructure_error() {
    let ens = converged(1);
    let partitioner = RecordingPartitioner {
        denied: true,
        ..RecordingPartitioner::default()
    };
    let orch = UpgradeOrchestrator::new(LiveProbe::healthy(1), &partitioner, fast());

    let err = orch.pre_upgrade_check(&ens.view()).await.unwrap_err();
    assert!(matches!(
        err,
        UpgradeError::Infrastructure(PartitionError::Forbidden)
    ));
}
