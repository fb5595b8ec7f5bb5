//! warden-config: deterministic rendering of the ZooKeeper server
//! configuration.
//!
//! Translates reconciled state into the on-disk files the workload
//! consumes: the dynamic membership file, the `myid` identity file, the
//! base server properties, the JAAS authentication config, and the JVM
//! startup flags. Rendering is a pure function of input state — identical
//! input always yields byte-identical output — which is what makes
//! reconciliation idempotent and reapplication safe. The materializer
//! writes a file only when its rendered content differs from what is on
//! disk; that drift signal is what triggers a rolling restart.

mod materialize;
mod render;

pub use materialize::{ConfigError, Materializer};
pub use render::{RenderInput, Rendered, ServerEntry};
