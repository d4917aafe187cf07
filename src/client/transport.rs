//! Pub/sub transport seam
//!
//! A [`Transport`] opens one [`Session`] per device. The session's background
//! machinery reports what happens on the wire as [`TransportEvent`]s through
//! an [`EventSink`]; reconnection is the transport's job, the supervisor only
//! observes it.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

use super::config::ClientConfig;

/// Something that happened on a device session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Session established (sent again after every reconnect)
    Connected,
    /// Subscription acknowledged by the device
    Subscribed {
        /// Whether the device granted the subscription
        accepted: bool,
    },
    /// Message received
    Message { topic: String, payload: Bytes },
    /// Transport error; the transport retries on its own
    Error(String),
    /// Established session lost
    Offline,
    /// Reconnect attempt starting
    Reconnecting,
}

/// A transport event tagged with its device
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    /// Device id
    pub device_id: Arc<str>,
    /// Event
    pub event: TransportEvent,
}

/// Delivers one device's transport events into the monitor loop
#[derive(Debug, Clone)]
pub struct EventSink {
    device_id: Arc<str>,
    tx: mpsc::Sender<DeviceEvent>,
}

impl EventSink {
    /// Create a sink tagging events with `device_id`
    pub fn new(device_id: impl Into<Arc<str>>, tx: mpsc::Sender<DeviceEvent>) -> Self {
        Self {
            device_id: device_id.into(),
            tx,
        }
    }

    /// Device this sink reports for
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Deliver an event
    ///
    /// Returns false once the monitor loop is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(DeviceEvent {
                device_id: Arc::clone(&self.device_id),
                event,
            })
            .await
            .is_ok()
    }
}

/// An open device session
///
/// `subscribe` and `publish` only queue the request and never wait on the
/// network.
pub trait Session: Send + 'static {
    /// Subscribe to a topic
    fn subscribe(&self, topic: &str) -> Result<()>;

    /// Publish a payload to a topic
    fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Disconnect cleanly and wait for the session to finish
    fn close(self) -> impl Future<Output = ()> + Send + 'static;
}

/// Opens device sessions
pub trait Transport: Send + Sync + 'static {
    /// Session type produced by this transport
    type Session: Session;

    /// Open a session; events flow into `events` until the session closes
    fn connect(&self, config: ClientConfig, events: EventSink) -> Result<Self::Session>;
}
