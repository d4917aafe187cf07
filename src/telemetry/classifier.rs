//! Fault classification
//!
//! Maps one telemetry snapshot to at most one [`Fault`]. Conditions are
//! checked in a fixed order and the first match wins:
//!
//! 1. Hardware management (HMS) alerts
//! 2. Vendor print error code
//! 3. Filament runout on a paused job
//! 4. Nozzle temperature deviating from target on a running job
//!
//! Runout triggers on any reported `remain` at or below zero. Trays without
//! spool data report `-1`, so a paused job with such a tray is classified as a
//! runout even though [`AmsSlot`](crate::registry::AmsSlot) shows its
//! remaining material as unknown.
//!
//! The classifier only ever sees the raw snapshot, never merged state, so a
//! fault disappears as soon as a snapshot no longer shows it.

use serde::Serialize;

use super::report::PrintReport;

/// Default allowed nozzle deviation from target, in degrees
pub const DEFAULT_TEMPERATURE_DELTA: f64 = 15.0;

/// Category of a detected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Printer raised one or more HMS alerts
    HardwareAlert,
    /// Printer reported a nonzero print error code
    PrintError,
    /// An AMS tray ran empty while the job is paused
    FilamentRunout,
    /// Nozzle temperature far from target while printing
    TemperatureAnomaly,
}

/// A detected abnormal condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    /// Category
    pub kind: FaultKind,
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl Fault {
    fn new(kind: FaultKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Known vendor print error codes
const PRINT_ERRORS: &[(u64, &str)] = &[
    (0x0300_400C, "Printing was cancelled"),
    (0x0300_8001, "Printing was paused by the user"),
    (0x0300_8003, "Printing paused: nozzle may be clogged"),
    (0x0300_800A, "Printing paused: first layer defects detected"),
    (0x0300_800B, "Printing paused: cutter is stuck"),
    (0x0300_8010, "Printing paused: heatbed temperature malfunction"),
    (0x0500_8030, "Printing paused: front cover fell off"),
    (0x0700_8011, "AMS filament ran out"),
    (0x0700_8012, "AMS failed to feed filament"),
    (0x0C00_8001, "Printing paused: spaghetti failure detected"),
];

fn print_error_text(code: u64) -> Option<&'static str> {
    PRINT_ERRORS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, text)| *text)
}

/// Stateless snapshot classifier
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier {
    temperature_delta: f64,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPERATURE_DELTA)
    }
}

impl ErrorClassifier {
    /// Create a classifier with the given temperature deviation threshold
    pub fn new(temperature_delta: f64) -> Self {
        Self { temperature_delta }
    }

    /// Temperature deviation threshold in degrees
    pub fn temperature_delta(&self) -> f64 {
        self.temperature_delta
    }

    /// Classify one snapshot
    pub fn classify(&self, report: &PrintReport) -> Option<Fault> {
        Self::hardware_alert(report)
            .or_else(|| Self::print_error(report))
            .or_else(|| Self::filament_runout(report))
            .or_else(|| self.temperature_anomaly(report))
    }

    fn hardware_alert(report: &PrintReport) -> Option<Fault> {
        let alerts = report.hms.as_deref().filter(|a| !a.is_empty())?;

        let attrs: Vec<String> = alerts
            .iter()
            .map(|a| format!("{:08X}", a.attr.unwrap_or(0.0) as u64))
            .collect();

        let message = alerts[0]
            .msg
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("Hardware alert reported by printer");

        Some(Fault::new(
            FaultKind::HardwareAlert,
            format!("HMS_{}", attrs.join("_")),
            message,
        ))
    }

    fn print_error(report: &PrintReport) -> Option<Fault> {
        let code = report.print_error.map(|c| c as u64).filter(|c| *c != 0)?;

        let message = match print_error_text(code) {
            Some(text) => text.to_string(),
            None => format!("Print error (code: {})", code),
        };

        Some(Fault::new(
            FaultKind::PrintError,
            format!("PRINT_ERROR_{}", code),
            message,
        ))
    }

    /// First tray with `remain <= 0` on a paused job, unknown (`-1`) included
    fn filament_runout(report: &PrintReport) -> Option<Fault> {
        if !report.is_state("PAUSE") {
            return None;
        }

        for (unit_pos, unit) in report.ams_units()?.iter().enumerate() {
            for (tray_pos, tray) in unit.tray.iter().enumerate() {
                if tray.remain.is_some_and(|r| r <= 0.0) {
                    let unit_no = unit.id.map(|i| i as usize).unwrap_or(unit_pos) + 1;
                    let tray_no = tray.id.map(|i| i as usize).unwrap_or(tray_pos) + 1;

                    return Some(Fault::new(
                        FaultKind::FilamentRunout,
                        "FILAMENT_RUNOUT",
                        format!("Filament runout on AMS unit {}, tray {}", unit_no, tray_no),
                    ));
                }
            }
        }

        None
    }

    fn temperature_anomaly(&self, report: &PrintReport) -> Option<Fault> {
        if !report.is_state("RUNNING") {
            return None;
        }

        // A missing reading is not evidence of a fault
        let (Some(nozzle), Some(target)) = (report.nozzle_temper, report.nozzle_target_temper)
        else {
            return None;
        };

        if (nozzle - target).abs() <= self.temperature_delta {
            return None;
        }

        Some(Fault::new(
            FaultKind::TemperatureAnomaly,
            "TEMPERATURE_ANOMALY",
            format!(
                "Nozzle temperature {}°C deviates from target {}°C",
                nozzle.round() as i64,
                target.round() as i64
            ),
        ))
    }
}
