//! Per-device session configuration

use std::time::Duration;

use crate::config::DeviceConfig;

/// Port of the device's MQTT-over-TLS endpoint
pub const DEVICE_MQTT_PORT: u16 = 8883;

/// Fixed MQTT username for LAN access
pub const DEVICE_MQTT_USERNAME: &str = "bblp";

/// Prefix for MQTT client ids
pub const CLIENT_ID_PREFIX: &str = "printer-monitor-";

/// Smallest keep-alive the MQTT client accepts
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Options for opening one device session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// MQTT client id
    pub client_id: String,

    /// Device host or IP
    pub host: String,

    /// Device port
    pub port: u16,

    /// MQTT username
    pub username: String,

    /// MQTT password (device access code)
    pub password: String,

    /// Keep-alive interval
    pub keep_alive: Duration,

    /// Fixed delay between reconnect attempts
    pub reconnect_period: Duration,

    /// Largest packet accepted or sent; full status reports are large
    pub max_packet_size: usize,

    /// How long closing waits for a clean disconnect
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Default session options for a device
    pub fn for_device(device: &DeviceConfig) -> Self {
        Self {
            client_id: format!("{}{}", CLIENT_ID_PREFIX, device.id),
            host: device.ip.clone(),
            port: DEVICE_MQTT_PORT,
            username: DEVICE_MQTT_USERNAME.to_string(),
            password: device.access_code.clone(),
            keep_alive: Duration::from_secs(30),
            reconnect_period: Duration::from_secs(5),
            max_packet_size: 1024 * 1024, // 1MB
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Set the reconnect period
    pub fn reconnect_period(mut self, period: Duration) -> Self {
        self.reconnect_period = period;
        self
    }

    /// Set the keep-alive interval (at least 5 seconds)
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval.max(MIN_KEEP_ALIVE);
        self
    }

    /// Set the close timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
