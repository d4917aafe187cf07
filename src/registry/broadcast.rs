//! State fan-out to consumers
//!
//! Every publish carries the complete state of one device, never a diff.
//! Delivery is best-effort: a consumer that falls behind the channel capacity
//! skips the updates it missed, and a consumer that is gone simply misses
//! everything published while it was away.

use tokio::sync::broadcast;

use super::entry::DeviceState;

/// Default number of updates buffered per consumer before it starts lagging
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Fan-out of device states to subscribed consumers
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<DeviceState>,
}

impl Broadcaster {
    /// Create a broadcaster buffering up to `capacity` updates per consumer
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send a state to all current subscribers
    ///
    /// Returns the number of subscribers that will see it.
    pub fn publish(&self, state: DeviceState) -> usize {
        // send() errors only when nobody is subscribed
        self.tx.send(state).unwrap_or(0)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Attach a new consumer, pairing it with the given full snapshot
    ///
    /// The caller must take the snapshot and subscribe without any publish in
    /// between so the consumer neither misses nor double-counts an update.
    pub fn subscribe(&self, snapshot: Vec<DeviceState>) -> Subscription {
        Subscription {
            snapshot,
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

/// A consumer's view: one full snapshot, then individual updates
#[derive(Debug)]
pub struct Subscription {
    /// States of all devices at subscribe time, in configuration order
    pub snapshot: Vec<DeviceState>,
    rx: broadcast::Receiver<DeviceState>,
}

impl Subscription {
    /// Wait for the next published state
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<DeviceState> {
        loop {
            match self.rx.recv().await {
                Ok(state) => return Some(state),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Consumer lagging, updates skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next already-published state without waiting
    pub fn try_recv(&mut self) -> Option<DeviceState> {
        loop {
            match self.rx.try_recv() {
                Ok(state) => return Some(state),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Consumer lagging, updates skipped");
                }
                Err(_) => return None,
            }
        }
    }
}
