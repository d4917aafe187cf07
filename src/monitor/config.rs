//! Monitor configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::registry::DEFAULT_BROADCAST_CAPACITY;
use crate::telemetry::DEFAULT_TEMPERATURE_DELTA;

/// Monitor configuration options
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between status polls of every device
    pub poll_interval: Duration,

    /// Nozzle deviation from target (degrees) that counts as an anomaly
    pub temperature_delta: f64,

    /// Silence after which a connected device is reported
    pub message_timeout: Duration,

    /// Fixed delay between reconnect attempts
    pub reconnect_period: Duration,

    /// MQTT keep-alive interval
    pub keep_alive: Duration,

    /// How long closing a session waits for a clean disconnect
    pub shutdown_timeout: Duration,

    /// State updates buffered per subscriber before it lags
    pub broadcast_capacity: usize,

    /// Transport events buffered before sessions wait on the monitor
    pub event_capacity: usize,

    /// Directory holding project archives for thumbnails
    pub archive_dir: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            temperature_delta: DEFAULT_TEMPERATURE_DELTA,
            message_timeout: Duration::from_secs(120),
            reconnect_period: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            event_capacity: 1024,
            archive_dir: PathBuf::from("uploads"),
        }
    }
}

impl MonitorConfig {
    /// Create a new config reading archives from `dir`
    pub fn with_archive_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the temperature anomaly threshold
    pub fn temperature_delta(mut self, delta: f64) -> Self {
        self.temperature_delta = delta.abs();
        self
    }

    /// Set the message timeout
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    /// Set the reconnect period
    pub fn reconnect_period(mut self, period: Duration) -> Self {
        self.reconnect_period = period;
        self
    }

    /// Set the keep-alive interval
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Set the session close timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the per-subscriber buffer
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the archive directory
    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }
}
