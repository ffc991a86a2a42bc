//! Broadcast group for connected clients.
//!
//! A single `tokio::sync::broadcast` channel. Every client connection
//! subscribes once and receives every event; slow receivers that fall
//! behind skip events (`RecvError::Lagged`).

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::bridge::BroadcastEvent;

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// The broadcast hub. Cheap to clone.
#[derive(Clone)]
pub struct Fanout {
    sender: broadcast::Sender<Arc<BroadcastEvent>>,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Join the group. Events published after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastEvent>> {
        self.sender.subscribe()
    }

    /// Send an event to every subscriber, returning how many received it
    pub fn publish(&self, event: BroadcastEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
