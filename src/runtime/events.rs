//! Decode progress notifications
//!
//! The decode thread broadcasts events to every subscriber over unbounded
//! crossbeam channels, so a slow viewer never stalls decoding. Subscribers
//! that dropped their receiver are pruned on the next send.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Mutex, PoisonError};

/// Notification emitted by a running decode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// More samples have been decoded; rate-limited to about once per 1%
    Progress { samples_decoded: u64 },
    /// The decode run ended, whatever the reason
    Done,
}

/// Broadcast sender that fans events out to all subscribers
#[derive(Default)]
pub struct EventBroadcaster {
    destinations: Mutex<Vec<Sender<DecodeEvent>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<DecodeEvent> {
        let (tx, rx) = unbounded();
        self.destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Send an event to all live subscribers
    pub fn send(&self, event: DecodeEvent) {
        self.destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|dest| dest.send(event).is_ok());
    }

    /// Get the number of live subscribers
    pub fn num_destinations(&self) -> usize {
        self.destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
