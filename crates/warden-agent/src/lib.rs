//! warden-agent: the event dispatch shell.
//!
//! One agent runs per ensemble member, single-threaded and event-driven:
//! each external notification (topology change, config change, timer) is
//! processed to completion or explicitly deferred before the next is
//! dequeued. All cross-node coordination happens through the shared state
//! store and the restart lock; the agent itself holds no state that
//! survives a crash, so every handler is written to be re-run safely.

pub mod events;
pub mod handlers;
pub mod settings;
pub mod workload;

pub use events::{Disposition, Event, EventQueue};
pub use handlers::{PlatformFacts, UnitAgent};
pub use workload::{ShellWorkload, Workload, WorkloadError};
