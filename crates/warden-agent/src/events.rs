//! Explicit event queue with defer semantics.
//!
//! Replaces hidden framework re-dispatch with a visible queue: a handler
//! returns a tri-state [`Disposition`], and a deferred event is re-enqueued
//! for redelivery on the next trigger rather than on a dedicated timer.
//! Redelivery is bounded so a permanently unsatisfiable precondition
//! surfaces as a failure instead of spinning forever.

use std::collections::VecDeque;

use tracing::{debug, warn};
use warden_core::UnitId;

/// External notifications the agent reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NodeJoined(UnitId),
    NodeChanged(UnitId),
    NodeDeparted(UnitId),
    CoordinatorElected,
    ConfigChanged,
    /// The workload's process manager reports the container ready.
    WorkloadReady,
    Tick,
}

impl Event {
    /// The departing unit, for departure notifications.
    pub fn departing(&self) -> Option<UnitId> {
        match self {
            Event::NodeDeparted(unit) => Some(*unit),
            _ => None,
        }
    }
}

/// Outcome of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed to completion (including "nothing to do").
    Handled,
    /// A precondition is not met yet; redeliver on the next trigger.
    Deferred,
    /// Gave up; logged, dropped, never crashes the loop.
    Failed,
}

/// FIFO queue with bounded redelivery of deferred events.
pub struct EventQueue {
    queue: VecDeque<(Event, u32)>,
    max_redelivery: u32,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(16)
    }
}

impl EventQueue {
    pub fn new(max_redelivery: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            max_redelivery,
        }
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push_back((event, 0));
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Processes every queued event once. Deferred events are re-enqueued
    /// at the back, so they are retried after whatever triggered this
    /// drain, not in a tight loop.
    pub fn drain(&mut self, mut handle: impl FnMut(&Event) -> Disposition) {
        let mut pending = std::mem::take(&mut self.queue);
        while let Some((event, deliveries)) = pending.pop_front() {
            match handle(&event) {
                Disposition::Handled => {}
                Disposition::Failed => {
                    warn!(?event, "event handling failed, dropping");
                }
                Disposition::Deferred => {
                    if deliveries + 1 >= self.max_redelivery {
                        warn!(?event, "event deferred too many times, dropping");
                    } else {
                        debug!(?event, deliveries, "event deferred");
                        self.queue.push_back((event, deliveries + 1));
                    }
                }
            }
        }
    }
}
