//! warden-core: shared cluster state for the warden control plane.
//!
//! This crate holds the single source of truth that every other component
//! reads and writes: a key-value view over two scopes (application scope,
//! written only by the elected coordinator, and unit scope, written only by
//! the owning unit), the typed snapshot assembled from it, and the derived
//! readiness predicates that gate every mutating action elsewhere.
//!
//! # Architecture
//!
//! - **Store**: [`StateStore`] abstracts the replicated key-value substrate;
//!   [`MemoryStore`] is the in-process implementation used by the agent's
//!   local loop and by every test.
//! - **Snapshot**: [`EnsembleSnapshot`] is an immutable capture of the store
//!   plus externally-supplied facts (local unit, coordinator flag,
//!   certificate relationship, topology). All predicates are recomputed
//!   from the snapshot on every access; nothing is cached.
//! - **Status**: [`Status`] pairs a human-readable message with a log
//!   severity, re-derived fresh on every pass.

mod mode;
mod snapshot;
mod status;
mod store;

pub use mode::QuorumMode;
pub use snapshot::{
    unit_mode_matches, ClusterView, EnsembleSnapshot, SnapshotContext, UnitState,
};
pub use status::Status;
pub use store::{keys, ClientId, MemoryStore, StateStore, UnitId};

/// Plaintext client port.
pub const CLIENT_PORT: u16 = 2181;
/// TLS client port, used once the quorum runs `ssl`.
pub const SECURE_CLIENT_PORT: u16 = 2182;
/// Quorum peer transport port.
pub const PEER_PORT: u16 = 2888;
/// Leader election port.
pub const ELECTION_PORT: u16 = 3888;

/// Internal service accounts whose credentials the first coordinator
/// generates exactly once, before any unit may start its server.
pub const INTERNAL_USERS: [&str; 2] = ["super", "sync"];
