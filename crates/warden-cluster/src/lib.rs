//! warden-cluster: quorum coordination for the warden control plane.
//!
//! Three pieces live here, all operating over
//! [`warden_core::EnsembleSnapshot`]:
//!
//! - **Reconciliation**: [`QuorumReconciler`] computes the next membership
//!   set and encryption-mode transition as a pure function of a snapshot.
//!   Invoked only on the coordinator; idempotent under event redelivery.
//! - **Restart serialization**: [`RestartLock`] grants at most one unit at
//!   a time permission to restart, so the ensemble never drops below
//!   quorum from overlapping restarts.
//! - **Rolling upgrade**: [`UpgradeOrchestrator`] drives a one-unit-at-a-
//!   time upgrade with live quorum-health pre/post checks.

mod error;
mod lock;
mod reconcile;
mod upgrade;

pub use error::{ClusterNotReady, PartitionError, ProbeError, UpgradeError};
pub use lock::RestartLock;
pub use reconcile::{
    MembershipAction, QuorumReconciler, ReconcileOutcome, ReconcileTrigger,
};
pub use upgrade::{
    Partitioner, QuorumProbe, UnitUpgradeState, UpgradeConfig, UpgradeOrchestrator,
};
