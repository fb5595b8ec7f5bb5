//! Rolling upgrade orchestration.
//!
//! Drives a one-unit-at-a-time upgrade of the ensemble. Before each unit
//! may proceed, the ensemble must pass a live quorum-health pre-check
//! (all members broadcasting, none mid-sync, snapshot stable); after the
//! unit restarts into the new version, the same checks run again plus a
//! health probe against the restarted workload. Check failure marks the
//! unit failed — a terminal state requiring manual operator rollback — and
//! halts the upgrade.
//!
//! The live-ensemble client sits behind [`QuorumProbe`] and the
//! orchestration-platform mutation behind [`Partitioner`], keeping the
//! state machine platform-agnostic.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};
use warden_core::{EnsembleSnapshot, UnitId};

use crate::error::{ClusterNotReady, PartitionError, ProbeError, UpgradeError};

/// Live health probe against the running ensemble.
pub trait QuorumProbe {
    /// All ensemble members are connected and broadcasting.
    fn members_broadcasting(&self) -> Result<bool, ProbeError>;
    /// Any member is still syncing data from the leader.
    fn members_syncing(&self) -> Result<bool, ProbeError>;
    /// Members currently participating in the quorum.
    fn server_count(&self) -> Result<usize, ProbeError>;
}

/// Narrow seam over the orchestration platform's rollout partition.
pub trait Partitioner {
    fn set_update_partition(&self, partition: u32) -> Result<(), PartitionError>;
}

/// Upgrade progress of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitUpgradeState {
    Pending,
    InProgress,
    Completed,
    /// Terminal; requires manual operator intervention.
    Failed,
}

/// Retry tuning for the pre-check, which can be transiently false during
/// concurrent restarts.
#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    /// Attempts before declaring failure.
    pub attempts: u32,
    /// Randomized wait bounds between attempts.
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5),
        }
    }
}

/// Per-unit upgrade state machine, sequenced one unit at a time.
///
/// Any total order is accepted; [`UpgradeOrchestrator::begin`] takes the
/// order as given (reverse unit-id is the conventional choice, matching
/// the rollout partition countdown).
pub struct UpgradeOrchestrator<P, T> {
    probe: P,
    partitioner: T,
    config: UpgradeConfig,
    states: BTreeMap<UnitId, UnitUpgradeState>,
    stack: Vec<UnitId>,
}

impl<P: QuorumProbe, T: Partitioner> UpgradeOrchestrator<P, T> {
    pub fn new(probe: P, partitioner: T, config: UpgradeConfig) -> Self {
        Self {
            probe,
            partitioner,
            config,
            states: BTreeMap::new(),
            stack: Vec::new(),
        }
    }

    /// No upgrade in flight.
    pub fn idle(&self) -> bool {
        self.stack.is_empty()
            && !self
                .states
                .values()
                .any(|s| matches!(s, UnitUpgradeState::InProgress))
    }

    /// Seeds the upgrade order. Units are granted in the given order, one
    /// at a time; the last element upgrades first.
    pub fn begin(&mut self, order: Vec<UnitId>) {
        self.states = order
            .iter()
            .map(|unit| (*unit, UnitUpgradeState::Pending))
            .collect();
        self.stack = order;
        info!(units = self.stack.len(), "rolling upgrade started");
    }

    pub fn unit_state(&self, unit: UnitId) -> Option<UnitUpgradeState> {
        self.states.get(&unit).copied()
    }

    /// Grants the next unit its turn, if none is in progress.
    pub fn next_unit(&mut self) -> Option<UnitId> {
        if self
            .states
            .values()
            .any(|s| matches!(s, UnitUpgradeState::InProgress))
        {
            return None;
        }
        let unit = self.stack.pop()?;
        self.states.insert(unit, UnitUpgradeState::InProgress);
        info!(%unit, "unit upgrade in progress");
        Some(unit)
    }

    pub fn set_unit_completed(&mut self, unit: UnitId) {
        self.states.insert(unit, UnitUpgradeState::Completed);
        info!(%unit, "unit upgrade completed");
    }

    /// Marks a unit failed and logs operator remediation. Terminal: the
    /// upgrade halts here, no automatic rollback.
    pub fn set_unit_failed(&mut self, unit: UnitId) {
        self.states.insert(unit, UnitUpgradeState::Failed);
        self.stack.clear();
        self.log_rollback_instructions();
    }

    /// Validates the ensemble is safe to take a member down.
    ///
    /// Retried with randomized backoff because broadcast/sync state is
    /// transiently false during concurrent restarts. When idle, resets
    /// the rollout partition to n-1 so the platform holds every unit back
    /// until its pre-check passes.
    pub async fn pre_upgrade_check(
        &self,
        snapshot: &EnsembleSnapshot,
    ) -> Result<(), UpgradeError> {
        if self.idle() {
            let partition = snapshot.units.len().saturating_sub(1) as u32;
            self.partitioner.set_update_partition(partition)?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.check_quorum(snapshot) {
                Ok(()) => return Ok(()),
                Err(not_ready) if attempt >= self.config.attempts => {
                    error!(cause = %not_ready.cause, "pre-upgrade check failed");
                    return Err(not_ready.into());
                }
                Err(not_ready) => {
                    warn!(
                        cause = %not_ready.cause,
                        attempt,
                        "pre-upgrade check failed, retrying"
                    );
                    tokio::time::sleep(self.jitter()).await;
                }
            }
        }
    }

    /// Validates a unit after it restarted into the new version.
    ///
    /// Same quorum checks as the pre-check, plus a live health probe
    /// against the restarted workload supplied by the caller.
    pub async fn post_upgrade_check(
        &self,
        snapshot: &EnsembleSnapshot,
        mut workload_healthy: impl FnMut() -> bool,
    ) -> Result<(), UpgradeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.check_quorum(snapshot).and_then(|()| {
                if workload_healthy() {
                    Ok(())
                } else {
                    Err(ClusterNotReady::new("restarted service is not healthy"))
                }
            });
            match result {
                Ok(()) => return Ok(()),
                Err(not_ready) if attempt >= self.config.attempts => {
                    error!(cause = %not_ready.cause, "post-upgrade check failed");
                    return Err(not_ready.into());
                }
                Err(not_ready) => {
                    warn!(
                        cause = %not_ready.cause,
                        attempt,
                        "post-upgrade check failed, retrying"
                    );
                    tokio::time::sleep(self.jitter()).await;
                }
            }
        }
    }

    /// One round of quorum checks. Unknown probe errors are converted to
    /// a generic not-ready failure; the upgrade flow never crashes on an
    /// unanticipated probe exception.
    fn check_quorum(&self, snapshot: &EnsembleSnapshot) -> Result<(), ClusterNotReady> {
        let broadcasting = self.probe.members_broadcasting().map_err(probe_cause)?;
        let count = self.probe.server_count().map_err(probe_cause)?;
        if !broadcasting || count != snapshot.units.len() {
            return Err(ClusterNotReady::new(
                "not all ensemble members are connected and broadcasting in the quorum",
            ));
        }

        if self.probe.members_syncing().map_err(probe_cause)? {
            return Err(ClusterNotReady::new("some quorum members are syncing data"));
        }

        if !snapshot.stable() {
            return Err(ClusterNotReady::new("cluster has not finished initialising"));
        }

        Ok(())
    }

    fn log_rollback_instructions(&self) {
        error!(
            "unit failed to upgrade and requires manual rollback to the previous \
             stable version: re-run the pre-upgrade check on the coordinator to \
             enter recovery, then roll the deployment back to the prior revision"
        );
    }

    fn jitter(&self) -> Duration {
        let min = self.config.backoff_min.as_millis() as u64;
        let max = self.config.backoff_max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

fn probe_cause(err: ProbeError) -> ClusterNotReady {
    match err {
        ProbeError::LeaderNotFound => ClusterNotReady::new("quorum leader not found"),
        ProbeError::ConnectionClosed => {
            ClusterNotReady::new("unable to connect to the cluster")
        }
        ProbeError::Other(detail) => {
            warn!(%detail, "quorum probe failed with unknown error");
            ClusterNotReady::new("unknown error")
        }
    }
}
