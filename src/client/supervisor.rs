//! Per-device connection supervisor
//!
//! A [`ConnectionSupervisor`] owns one device's session. It turns what the
//! transport reports into [`StateUpdate`]s for the store, subscribes to the
//! report topic on every (re)connect, and issues status polls.
//!
//! ```text
//! Connected ──► subscribe(report) ──► Subscribed ──► pushall
//!     │
//!     ▼
//! Message ──► parse ──► StateUpdate::Telemetry
//! Offline ──► StateUpdate::Connectivity(Disconnected)
//! ```

use std::time::{Duration, Instant};

use crate::config::DeviceConfig;
use crate::registry::{ConnectionStatus, StateUpdate};
use crate::telemetry::TelemetryMessage;

use super::command;
use super::config::ClientConfig;
use super::transport::{EventSink, Session, Transport, TransportEvent};

/// Reconnect attempts logged at info level before dropping to debug
const VERBOSE_RECONNECT_ATTEMPTS: u32 = 5;

/// Supervises the session of one device
pub struct ConnectionSupervisor<S: Session> {
    device: DeviceConfig,
    config: ClientConfig,
    session: Option<S>,
    status: ConnectionStatus,
    reconnect_attempts: u32,
    last_message_at: Option<Instant>,
    connected_at: Option<Instant>,
}

impl<S: Session> ConnectionSupervisor<S> {
    /// Create a supervisor with default session options for the device
    pub fn new(device: DeviceConfig) -> Self {
        let config = ClientConfig::for_device(&device);
        Self::with_config(device, config)
    }

    /// Create a supervisor with explicit session options
    pub fn with_config(device: DeviceConfig, config: ClientConfig) -> Self {
        Self {
            device,
            config,
            session: None,
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            last_message_at: None,
            connected_at: None,
        }
    }

    /// Device being supervised
    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    /// Current connectivity
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether a session object exists (connected or retrying)
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Reconnect attempts since the last successful connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Open the device session
    ///
    /// Failure is logged and leaves the supervisor without a session; other
    /// devices are unaffected.
    pub fn connect<T>(&mut self, transport: &T, events: EventSink) -> bool
    where
        T: Transport<Session = S>,
    {
        match transport.connect(self.config.clone(), events) {
            Ok(session) => {
                self.session = Some(session);
                true
            }
            Err(e) => {
                tracing::warn!(device = %self.device.id, error = %e, "Failed to open session");
                false
            }
        }
    }

    /// Ask the device to push its full status
    ///
    /// Returns whether a request was queued.
    pub fn request_status(&self) -> bool {
        let session = match self.session {
            Some(ref s) if self.status == ConnectionStatus::Connected => s,
            _ => {
                tracing::debug!(device = %self.device.id, "Not connected, skipping status request");
                return false;
            }
        };

        match session.publish(&self.device.request_topic(), command::pushall()) {
            Ok(()) => {
                tracing::trace!(device = %self.device.id, "Status requested");
                true
            }
            Err(e) => {
                tracing::warn!(device = %self.device.id, error = %e, "Status request failed");
                false
            }
        }
    }

    /// Interpret a transport event
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<StateUpdate> {
        self.handle_event_at(event, Instant::now())
    }

    /// Interpret a transport event received at `now`
    pub fn handle_event_at(&mut self, event: TransportEvent, now: Instant) -> Option<StateUpdate> {
        match event {
            TransportEvent::Connected => {
                tracing::info!(device = %self.device.id, "Connected");
                self.status = ConnectionStatus::Connected;
                self.reconnect_attempts = 0;
                self.connected_at = Some(now);
                self.subscribe_reports();
                Some(StateUpdate::Connectivity(ConnectionStatus::Connected))
            }
            TransportEvent::Subscribed { accepted: true } => {
                self.request_status();
                None
            }
            TransportEvent::Subscribed { accepted: false } => {
                tracing::warn!(device = %self.device.id, "Report subscription rejected");
                None
            }
            TransportEvent::Message { topic, payload } => {
                self.last_message_at = Some(now);

                let message = match TelemetryMessage::parse(&payload) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(
                            device = %self.device.id,
                            topic = %topic,
                            error = %e,
                            "Dropping malformed message"
                        );
                        return None;
                    }
                };

                match message.print {
                    Some(report) => Some(StateUpdate::Telemetry(report)),
                    None => {
                        tracing::debug!(device = %self.device.id, "Message without print data");
                        None
                    }
                }
            }
            TransportEvent::Error(e) => {
                tracing::warn!(device = %self.device.id, error = %e, "Connection error");
                None
            }
            TransportEvent::Offline => {
                tracing::warn!(device = %self.device.id, "Connection lost");
                self.status = ConnectionStatus::Disconnected;
                self.connected_at = None;
                Some(StateUpdate::Connectivity(ConnectionStatus::Disconnected))
            }
            TransportEvent::Reconnecting => {
                self.reconnect_attempts += 1;
                if self.reconnect_attempts <= VERBOSE_RECONNECT_ATTEMPTS {
                    tracing::info!(
                        device = %self.device.id,
                        attempt = self.reconnect_attempts,
                        "Reconnecting"
                    );
                } else {
                    tracing::debug!(
                        device = %self.device.id,
                        attempt = self.reconnect_attempts,
                        "Reconnecting"
                    );
                }
                None
            }
        }
    }

    /// Warn when a connected device has been silent longer than `timeout`
    ///
    /// Silence is measured from the last message, or from the connect when
    /// nothing has arrived since. Returns whether the device is silent.
    pub fn check_silence(&self, now: Instant, timeout: Duration) -> bool {
        if self.status != ConnectionStatus::Connected {
            return false;
        }

        let since = match (self.last_message_at, self.connected_at) {
            (Some(msg), Some(conn)) => msg.max(conn),
            (Some(t), None) | (None, Some(t)) => t,
            (None, None) => return false,
        };

        let silent_for = now.saturating_duration_since(since);
        if silent_for > timeout {
            tracing::warn!(
                device = %self.device.id,
                silent_secs = silent_for.as_secs(),
                "No messages received within timeout"
            );
            return true;
        }

        false
    }

    /// Take the session out, leaving the supervisor disconnected
    ///
    /// The caller is responsible for closing the returned session.
    pub fn detach(&mut self) -> Option<S> {
        self.status = ConnectionStatus::Disconnected;
        self.connected_at = None;
        self.session.take()
    }

    /// Close the session, waiting for a clean disconnect
    pub async fn close(&mut self) {
        if let Some(session) = self.detach() {
            session.close().await;
            tracing::debug!(device = %self.device.id, "Session closed");
        }
    }

    fn subscribe_reports(&self) {
        let Some(ref session) = self.session else {
            return;
        };

        let topic = self.device.report_topic();
        if let Err(e) = session.subscribe(&topic) {
            tracing::warn!(device = %self.device.id, topic = %topic, error = %e, "Subscribe failed");
        }
    }
}
