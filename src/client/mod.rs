//! Device client side
//!
//! Provides the device session plumbing:
//! - A [`Transport`] seam with an MQTT-over-TLS implementation
//! - One [`ConnectionSupervisor`] per device interpreting session events
//! - The status request command

pub mod command;
pub mod config;
pub mod mqtt;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use config::ClientConfig;
pub use mqtt::{MqttSession, MqttTransport};
pub use supervisor::ConnectionSupervisor;
pub use transport::{DeviceEvent, EventSink, Session, Transport, TransportEvent};
