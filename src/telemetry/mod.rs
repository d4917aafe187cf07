//! Device telemetry
//!
//! This module provides:
//! - Defensive parsing of vendor report payloads into typed snapshots
//! - Heuristic fault classification over a single snapshot

pub mod classifier;
pub mod report;

pub use classifier::{ErrorClassifier, Fault, FaultKind, DEFAULT_TEMPERATURE_DELTA};
pub use report::{AmsTray, AmsUnit, HmsAlert, PrintReport, TelemetryMessage};
