//! Agent configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! CLI/env overrides applied by `main`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Settings for one agent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// This unit's myid.
    pub unit_id: u32,
    /// Address published to the rest of the ensemble.
    pub host: String,
    /// Directory the rendered server config is written to.
    pub conf_dir: String,
    /// Workload data directory.
    pub data_dir: String,
    /// Whether this unit holds the coordinator role.
    pub coordinator: bool,
    /// Whether a certificate relationship is present.
    pub certificate_present: bool,
    /// Seconds to wait after a restart for quorum rejoin.
    pub settle_secs: u64,
    /// Seconds between timer ticks of the event loop.
    pub tick_secs: u64,
    /// Planned ensemble members: unit id -> host. Keys are strings
    /// because TOML table keys are.
    pub peers: BTreeMap<String, String>,
    /// Workload supervision commands.
    pub workload: WorkloadCommands,
}

/// Shell commands driving the workload process manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadCommands {
    pub start: String,
    pub restart: String,
    pub alive: String,
    pub health: String,
}

impl Default for WorkloadCommands {
    fn default() -> Self {
        Self {
            start: "systemctl start zookeeper".into(),
            restart: "systemctl restart zookeeper".into(),
            alive: "systemctl is-active --quiet zookeeper".into(),
            health: "echo ruok | nc -w 2 localhost 2181 | grep -q imok".into(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unit_id: 0,
            host: "localhost".into(),
            conf_dir: "/etc/zookeeper".into(),
            data_dir: "/var/lib/zookeeper".into(),
            coordinator: false,
            certificate_present: false,
            settle_secs: 5,
            tick_secs: 30,
            peers: BTreeMap::new(),
            workload: WorkloadCommands::default(),
        }
    }
}

/// Error loading a settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("peer id '{0}' is not a unit number")]
    BadPeerId(String),
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Planned topology as typed unit ids. Entries with a non-numeric key
    /// are rejected.
    pub fn topology(&self) -> Result<BTreeMap<u32, String>, SettingsError> {
        self.peers
            .iter()
            .map(|(id, host)| {
                id.parse::<u32>()
                    .map(|id| (id, host.clone()))
                    .map_err(|_| SettingsError::BadPeerId(id.clone()))
            })
            .collect()
    }
}
