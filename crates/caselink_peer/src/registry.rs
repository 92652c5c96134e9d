//! Per-peer exclusivity tracking.
//!
//! At most one sync per upstream peer runs at a time. A second request
//! while one is running marks the peer for a deferred retrigger instead
//! of queuing: any number of requests during a run collapse into one
//! follow-up sync.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct PeerSlot {
    running: bool,
    deferred: bool,
}

/// Tracks which peers have a sync in flight.
#[derive(Debug, Default)]
pub struct InProgressRegistry {
    slots: Mutex<HashMap<String, PeerSlot>>,
}

impl InProgressRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to claim the slot for a peer. Returns true when this
    /// caller now owns the run, false when one is already in flight.
    pub fn try_begin(&self, peer_url: &str) -> bool {
        let mut slots = self.slots.lock();
        let slot = slots.entry(peer_url.to_string()).or_default();
        if slot.running {
            false
        } else {
            slot.running = true;
            true
        }
    }

    /// Marks the peer for one follow-up sync after the current run ends.
    pub fn defer(&self, peer_url: &str) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(peer_url.to_string()).or_default();
        if slot.running {
            slot.deferred = true;
        }
    }

    /// Releases the slot. Returns true when a retrigger was requested
    /// while the run was in flight.
    pub fn finish(&self, peer_url: &str) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(peer_url) {
            Some(slot) => {
                let deferred = slot.deferred;
                slot.running = false;
                slot.deferred = false;
                deferred
            }
            None => false,
        }
    }

    /// Returns true when a sync against the peer is in flight.
    #[must_use]
    pub fn is_running(&self, peer_url: &str) -> bool {
        self.slots
            .lock()
            .get(peer_url)
            .map(|s| s.running)
            .unwrap_or(false)
    }
}
