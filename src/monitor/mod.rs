//! Fleet monitor service
//!
//! [`Monitor::start`] connects every configured device and spawns the loop
//! that owns all device state. Consumers talk to it through a cloneable
//! [`MonitorHandle`].

pub mod config;
pub mod handle;
pub mod service;

pub use config::MonitorConfig;
pub use handle::MonitorHandle;
pub use service::Monitor;
