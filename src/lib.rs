//! Live telemetry monitor for networked 3D printers
//!
//! Each configured printer is reached over its LAN MQTT-over-TLS endpoint.
//! Raw vendor reports are normalized into one canonical [`DeviceState`] per
//! printer, annotated with a classified fault and a resolved 3D model asset,
//! and every change is fanned out to subscribers.
//!
//! ```no_run
//! use printer_telemetry::{
//!     DeviceRegistry, ModelResolver, Monitor, MonitorConfig, MqttTransport,
//! };
//!
//! # async fn run() -> printer_telemetry::Result<()> {
//! let devices = DeviceRegistry::load("printers.json")?;
//! let models = ModelResolver::load("models.json")?;
//!
//! let handle = Monitor::start(MonitorConfig::default(), devices, models, MqttTransport::new());
//!
//! let mut updates = handle.subscribe().await?;
//! while let Some(state) = updates.recv().await {
//!     println!("{} {} {}%", state.name, state.state, state.progress);
//! }
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod registry;
pub mod telemetry;
pub mod thumbnail;

pub use client::{ConnectionSupervisor, MqttTransport, Session, Transport, TransportEvent};
pub use config::{DeviceConfig, DeviceRegistry};
pub use error::{ConfigError, Error, Result};
pub use models::{ModelAsset, ModelResolver};
pub use monitor::{Monitor, MonitorConfig, MonitorHandle};
pub use registry::{ConnectionStatus, DeviceState, StateStore, Subscription};
pub use telemetry::{ErrorClassifier, Fault, FaultKind};
pub use thumbnail::ThumbnailCache;
