//! Operator-facing status values.
//!
//! Each status pairs a human-readable message with the severity it should
//! be logged at. Statuses are re-derived from the current snapshot on every
//! pass and never cached; a status is how "not yet ready" surfaces, it is
//! never an error.

use std::fmt;

use tracing::{debug, error, info, warn, Level};

/// Condition of this unit as derived from the latest snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Everything reconciled; the unit is serving.
    Active,
    /// The shared state substrate has not appeared yet.
    NoPeerState,
    /// Waiting for the coordinator to generate internal credentials.
    NoCredentials,
    /// Other units start first; strict ascending-id ordering.
    NotUnitTurn,
    /// Not every topology member has published its address.
    NotAllRelated,
    /// Admitted membership set and started set disagree.
    StaleQuorum,
    /// An encryption-mode transition is still in flight.
    SwitchingEncryption,
    /// Transition done but units still accept both peer transports.
    AllUnified,
    /// The workload process is not running.
    ServiceNotRunning,
    /// The workload is up but failing its health probe.
    ServiceUnhealthy,
}

impl Status {
    /// The message shown to operators.
    pub fn message(self) -> &'static str {
        match self {
            Status::Active => "unit is ready",
            Status::NoPeerState => "no peer cluster state yet",
            Status::NoCredentials => {
                "waiting for coordinator to create internal user credentials"
            }
            Status::NotUnitTurn => "other units starting first",
            Status::NotAllRelated => "cluster not stable - not all units related",
            Status::StaleQuorum => "cluster not stable - quorum is stale",
            Status::SwitchingEncryption => {
                "provider not ready - switching quorum encryption"
            }
            Status::AllUnified => "provider not ready - port unification not yet disabled",
            Status::ServiceNotRunning => "zookeeper service not running",
            Status::ServiceUnhealthy => {
                "zookeeper service is unreachable or not serving requests"
            }
        }
    }

    /// Severity the status is logged at.
    pub fn level(self) -> Level {
        match self {
            Status::ServiceNotRunning | Status::ServiceUnhealthy => Level::ERROR,
            Status::AllUnified | Status::SwitchingEncryption => Level::INFO,
            _ => Level::DEBUG,
        }
    }

    /// Emits the status at its severity.
    pub fn log(self) {
        match self.level() {
            Level::ERROR => error!("{self}"),
            Level::WARN => warn!("{self}"),
            Level::INFO => info!("{self}"),
            _ => debug!("{self}"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
