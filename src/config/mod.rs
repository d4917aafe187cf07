//! Startup configuration
//!
//! Device records are read once at startup and never change afterwards.

pub mod devices;

pub use devices::{DeviceConfig, DeviceRegistry};
