//! Change-detected writes of rendered config.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::render::{RenderInput, Rendered};

/// Errors writing config files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Writes rendered config under a conf directory, touching only files
/// whose content actually changed.
///
/// The returned drift flag is the restart trigger: the agent requests the
/// restart lock only when applying the desired state changed something on
/// disk.
pub struct Materializer {
    conf_dir: PathBuf,
}

impl Materializer {
    pub fn new(conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
        }
    }

    /// True when the restart-relevant rendered output differs from what
    /// is applied on disk. Membership lives in the dynamic file and
    /// reaches running servers through live reconfig, and the id file
    /// never changes for a live unit, so neither is drift here. Missing
    /// files count as drift.
    pub fn config_changed(&self, input: &RenderInput) -> bool {
        let rendered = input.render();
        self.static_files(&rendered)
            .iter()
            .any(|(path, content)| fs::read_to_string(path).ok().as_deref() != Some(content))
    }

    /// Writes any drifted files. Returns whether anything was written.
    pub fn apply(&self, input: &RenderInput) -> Result<bool, ConfigError> {
        let rendered = input.render();
        let mut changed = false;
        for (path, content) in self.files(&rendered) {
            if fs::read_to_string(&path).ok().as_deref() == Some(content.as_str()) {
                continue;
            }
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            fs::write(&path, &content).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "config file written");
            changed = true;
        }
        if changed {
            info!(conf_dir = %self.conf_dir.display(), "server config materialized");
        }
        Ok(changed)
    }

    fn files(&self, rendered: &Rendered) -> Vec<(PathBuf, String)> {
        let mut files = vec![
            (self.path("myid"), rendered.myid.clone()),
            (
                self.path("zookeeper-dynamic.properties"),
                rendered.dynamic.clone(),
            ),
        ];
        files.extend(self.static_files(rendered));
        files
    }

    fn static_files(&self, rendered: &Rendered) -> Vec<(PathBuf, String)> {
        [
            ("zoo.cfg", &rendered.properties),
            ("zookeeper-jaas.cfg", &rendered.jaas),
            ("zookeeper-jvmflags", &rendered.jvm_flags),
        ]
        .into_iter()
        .map(|(name, content)| (self.path(name), content.clone()))
        .collect()
    }

    fn path(&self, name: &str) -> PathBuf {
        Path::new(&self.conf_dir).join(name)
    }
}
