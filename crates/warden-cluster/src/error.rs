//! Error types for cluster coordination.

/// A quorum check failed during upgrade; halts that unit's upgrade only.
///
/// Carries the operator-facing message and the specific cause;
/// cluster-not-ready conditions stay human-readable, never raw probe
/// failures.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}: {cause}")]
pub struct ClusterNotReady {
    pub message: String,
    pub cause: String,
}

impl ClusterNotReady {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            message: "upgrade check failed and cannot safely upgrade".into(),
            cause: cause.into(),
        }
    }
}

/// Errors from the live quorum probe against the running ensemble.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// No quorum leader could be located.
    #[error("quorum leader not found")]
    LeaderNotFound,

    /// Connection to the ensemble refused or closed mid-probe.
    #[error("connection to the ensemble closed")]
    ConnectionClosed,

    /// Anything else; converted to a generic not-ready failure by the
    /// orchestrator rather than propagated raw.
    #[error("probe error: {0}")]
    Other(String),
}

/// Failure of an upgrade pre/post-check.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// Quorum checks failed; halts this unit's upgrade only.
    #[error(transparent)]
    NotReady(#[from] ClusterNotReady),

    /// Platform mutation failed; operator-actionable, surfaced distinctly
    /// rather than folded into a generic not-ready.
    #[error(transparent)]
    Infrastructure(#[from] PartitionError),
}

/// Errors mutating the orchestration platform's rollout partition.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// Missing platform permission; operator-actionable, not retryable.
    #[error("rollout partition patch forbidden: grant the control plane patch permission")]
    Forbidden,

    /// Any other platform API failure.
    #[error("rollout partition patch failed: {0}")]
    Api(String),
}
