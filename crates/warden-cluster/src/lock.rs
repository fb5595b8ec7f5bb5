//! Ensemble-wide restart serialization.
//!
//! A single named mutual-exclusion token with an ordered queue of pending
//! holders. Any unit whose materialized config drifted from what is on
//! disk, or that must restart for an encryption transition, requests the
//! lock; at most one unit holds it at a time, so the ensemble never loses
//! two members to overlapping restarts. The holder releases explicitly
//! after its server rejoins the quorum.

use std::collections::VecDeque;

use tracing::{debug, info};
use warden_core::UnitId;

/// FIFO restart lock shared by the whole ensemble.
///
/// All operations are idempotent under event redelivery: re-requesting
/// while queued or holding is a no-op, releasing without holding is a
/// no-op.
#[derive(Debug, Default)]
pub struct RestartLock {
    holder: Option<UnitId>,
    queue: VecDeque<UnitId>,
}

impl RestartLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `unit` for the lock. Requests are granted in arrival
    /// order; the front of the queue is promoted immediately when the
    /// lock is free.
    pub fn request(&mut self, unit: UnitId) {
        if self.holder == Some(unit) || self.queue.contains(&unit) {
            return;
        }
        debug!(%unit, "restart lock requested");
        self.queue.push_back(unit);
        self.promote();
    }

    /// The unit currently allowed to restart, if any.
    pub fn holder(&self) -> Option<UnitId> {
        self.holder
    }

    /// True when `unit` has been granted the lock.
    pub fn granted(&self, unit: UnitId) -> bool {
        self.holder == Some(unit)
    }

    /// Releases the lock if `unit` holds it and promotes the next
    /// requester.
    pub fn release(&mut self, unit: UnitId) {
        if self.holder != Some(unit) {
            return;
        }
        info!(%unit, "restart lock released");
        self.holder = None;
        self.promote();
    }

    /// Drops a departed unit from the queue (and the lock, if it died
    /// holding it) so the ensemble does not wait on a unit that will
    /// never release.
    pub fn forget(&mut self, unit: UnitId) {
        self.queue.retain(|queued| *queued != unit);
        if self.holder == Some(unit) {
            self.holder = None;
            self.promote();
        }
    }

    /// Units waiting behind the current holder, in grant order.
    pub fn pending(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.queue.iter().copied()
    }

    fn promote(&mut self) {
        if self.holder.is_none() {
            if let Some(next) = self.queue.pop_front() {
                info!(unit = %next, "restart lock granted");
                self.holder = Some(next);
            }
        }
    }
}
