//! Device state types
//!
//! This module defines the canonical per-device state held by the store and
//! the updates that may be merged into it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::DeviceConfig;
use crate::models::ModelAsset;
use crate::telemetry::{AmsUnit, Fault, PrintReport};

/// Job state assumed before the device reports one
pub const INITIAL_JOB_STATE: &str = "IDLE";

/// Connectivity of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No established session
    Disconnected,
    /// Session established with the device
    Connected,
}

/// One material slot of an AMS unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmsSlot {
    /// AMS unit index (0-based)
    pub unit: u32,
    /// Slot index within the unit (0-based)
    pub slot: u32,
    /// Material type (e.g. "PLA"), empty when the slot is empty
    pub material: String,
    /// Color as hex RGBA, empty when unknown
    pub color: String,
    /// Remaining material as a fraction in `0.0..=1.0`, `None` when unknown
    pub remaining: Option<f64>,
}

impl AmsSlot {
    /// Flatten reported AMS units into slots
    pub fn from_units(units: &[AmsUnit]) -> Vec<AmsSlot> {
        units
            .iter()
            .enumerate()
            .flat_map(|(unit_pos, unit)| {
                let unit_idx = unit.id.map(|i| i as u32).unwrap_or(unit_pos as u32);
                unit.tray.iter().enumerate().map(move |(tray_pos, tray)| AmsSlot {
                    unit: unit_idx,
                    slot: tray.id.map(|i| i as u32).unwrap_or(tray_pos as u32),
                    material: tray.tray_type.clone().unwrap_or_default(),
                    color: tray.tray_color.clone().unwrap_or_default(),
                    remaining: tray
                        .remain
                        .filter(|r| *r >= 0.0)
                        .map(|r| (r / 100.0).min(1.0)),
                })
            })
            .collect()
    }
}

/// Canonical live state of one device
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// Device id
    pub id: String,
    /// Display name
    pub name: String,
    /// Session connectivity
    pub status: ConnectionStatus,
    /// Vendor job state
    pub state: String,
    /// Progress percent
    pub progress: u32,
    /// Current job filename
    pub current_file: String,
    /// Remaining time in minutes
    pub remaining_time: u32,
    /// Current layer
    pub layer: u32,
    /// Total layers
    pub total_layers: u32,
    /// Nozzle temperature
    pub nozzle_temp: f64,
    /// Bed temperature
    pub bed_temp: f64,
    /// Receipt time of the last telemetry merge
    pub last_update: Option<DateTime<Utc>>,
    /// Model asset resolved from the current filename
    #[serde(rename = "modelFile")]
    pub model: Option<ModelAsset>,
    /// Active fault from the last telemetry snapshot
    pub error: Option<Fault>,
    /// AMS slots from the last snapshot that carried AMS data
    pub ams: Vec<AmsSlot>,
}

impl DeviceState {
    /// Default state for a configured device before any telemetry
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            status: ConnectionStatus::Disconnected,
            state: INITIAL_JOB_STATE.to_string(),
            progress: 0,
            current_file: String::new(),
            remaining_time: 0,
            layer: 0,
            total_layers: 0,
            nozzle_temp: 0.0,
            bed_temp: 0.0,
            last_update: None,
            model: None,
            error: None,
            ams: Vec::new(),
        }
    }

    /// Whether the device session is established
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Overwrite the known telemetry fields from a snapshot
    ///
    /// Absent numbers become 0 and absent strings become empty, except the job
    /// state, which devices only resend on transitions. AMS slots are replaced
    /// only when the snapshot carries unit data.
    pub(super) fn apply_report(&mut self, report: &PrintReport, received_at: DateTime<Utc>) {
        if let Some(ref state) = report.gcode_state {
            self.state = state.clone();
        }

        self.progress = as_count(report.mc_percent);
        self.current_file = report.gcode_file.clone().unwrap_or_default();
        self.remaining_time = as_count(report.mc_remaining_time);
        self.layer = as_count(report.layer_num);
        self.total_layers = as_count(report.total_layer_num);
        self.nozzle_temp = report.nozzle_temper.unwrap_or(0.0);
        self.bed_temp = report.bed_temper.unwrap_or(0.0);
        self.last_update = Some(received_at);

        if let Some(units) = report.ams_units() {
            self.ams = AmsSlot::from_units(units);
        }
    }
}

/// Non-negative integer field, 0 when absent
fn as_count(value: Option<f64>) -> u32 {
    value.map(|v| v.max(0.0) as u32).unwrap_or(0)
}

/// An update to be merged into a device's state
#[derive(Debug, Clone)]
pub enum StateUpdate {
    /// Session connectivity changed
    Connectivity(ConnectionStatus),
    /// Telemetry snapshot received
    Telemetry(PrintReport),
}
