//! The workload boundary.
//!
//! Process supervision of the ZooKeeper server is an external concern;
//! this trait is the whole interface the control plane consumes. The
//! transient error variant matters: a process manager briefly unable to
//! answer is a retry, never a crash.

use rand::distr::Alphanumeric;
use rand::Rng;
use std::process::Command;

/// Failures from the workload's process manager.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// The process manager could not answer; retry on the next trigger.
    #[error("process manager transient failure: {0}")]
    Transient(String),

    /// The operation itself failed.
    #[error("workload operation failed: {0}")]
    Failed(String),
}

/// Supervision interface for the ZooKeeper server process.
pub trait Workload {
    /// Process manager reachable and service object present.
    fn alive(&self) -> bool;
    /// Service is up and answering its health probe.
    fn healthy(&self) -> Result<bool, WorkloadError>;
    /// Start the service with the materialized config.
    fn start(&mut self) -> Result<(), WorkloadError>;
    /// Stop-then-start the service.
    fn restart(&mut self) -> Result<(), WorkloadError>;
    /// Generate a credential for an internal user.
    fn generate_password(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }
}

/// Command-driven [`Workload`] for real deployments: each operation runs
/// a configured shell command, in the style of a systemd or init wrapper.
pub struct ShellWorkload {
    pub start_cmd: String,
    pub restart_cmd: String,
    /// Exit 0 = alive.
    pub alive_cmd: String,
    /// Exit 0 = healthy. Typically a `ruok` four-letter-word probe.
    pub health_cmd: String,
}

impl ShellWorkload {
    fn run(cmd: &str) -> Result<bool, WorkloadError> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .status()
            .map_err(|e| WorkloadError::Transient(e.to_string()))?;
        Ok(status.success())
    }
}

impl Workload for ShellWorkload {
    fn alive(&self) -> bool {
        Self::run(&self.alive_cmd).unwrap_or(false)
    }

    fn healthy(&self) -> Result<bool, WorkloadError> {
        Self::run(&self.health_cmd)
    }

    fn start(&mut self) -> Result<(), WorkloadError> {
        match Self::run(&self.start_cmd)? {
            true => Ok(()),
            false => Err(WorkloadError::Failed("start command exited non-zero".into())),
        }
    }

    fn restart(&mut self) -> Result<(), WorkloadError> {
        match Self::run(&self.restart_cmd)? {
            true => Ok(()),
            false => Err(WorkloadError::Failed(
                "restart command exited non-zero".into(),
            )),
        }
    }
}
