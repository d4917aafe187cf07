//! Vendor report payloads
//!
//! Printers push JSON reports on `device/<serial>/report`. Job telemetry lives
//! under the `print` key; other top-level sections (`info`, `system`, ...) are
//! command replies this crate does not track.
//!
//! Reports are sparse: any field may be absent, and some firmware versions
//! encode numbers as strings. Every field is therefore optional and numbers
//! are accepted in either encoding. A payload that is not JSON, or whose
//! known fields have an incompatible shape, fails to parse as a whole.

use serde::{Deserialize, Deserializer};

/// Top-level report envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryMessage {
    /// Job telemetry section
    #[serde(default)]
    pub print: Option<PrintReport>,
}

impl TelemetryMessage {
    /// Parse a raw payload
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// One job telemetry snapshot, exactly as reported
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrintReport {
    /// Vendor job state (`IDLE`, `PREPARE`, `RUNNING`, `PAUSE`, `FINISH`, `FAILED`)
    #[serde(default)]
    pub gcode_state: Option<String>,

    /// Progress percent
    #[serde(default, deserialize_with = "lenient_number")]
    pub mc_percent: Option<f64>,

    /// Current job filename
    #[serde(default)]
    pub gcode_file: Option<String>,

    /// Remaining time in minutes
    #[serde(default, deserialize_with = "lenient_number")]
    pub mc_remaining_time: Option<f64>,

    /// Current layer
    #[serde(default, deserialize_with = "lenient_number")]
    pub layer_num: Option<f64>,

    /// Total layers
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_layer_num: Option<f64>,

    /// Nozzle temperature
    #[serde(default, deserialize_with = "lenient_number")]
    pub nozzle_temper: Option<f64>,

    /// Nozzle target temperature
    #[serde(default, deserialize_with = "lenient_number")]
    pub nozzle_target_temper: Option<f64>,

    /// Bed temperature
    #[serde(default, deserialize_with = "lenient_number")]
    pub bed_temper: Option<f64>,

    /// Vendor print error code (0 = none)
    #[serde(default, deserialize_with = "lenient_number")]
    pub print_error: Option<f64>,

    /// Hardware management alerts
    #[serde(default)]
    pub hms: Option<Vec<HmsAlert>>,

    /// AMS section
    #[serde(default)]
    pub ams: Option<AmsSection>,
}

impl PrintReport {
    /// AMS units carried by this snapshot, if the snapshot carries unit data
    pub fn ams_units(&self) -> Option<&[AmsUnit]> {
        match self.ams.as_ref()? {
            AmsSection::Units(units) => Some(units),
            AmsSection::Wrapped { ams } => ams.as_deref(),
        }
    }

    /// Whether the job state equals `state`
    pub fn is_state(&self, state: &str) -> bool {
        self.gcode_state.as_deref() == Some(state)
    }
}

/// AMS section, either the vendor wrapper object or a bare unit list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmsSection {
    /// Bare list of units
    Units(Vec<AmsUnit>),
    /// `{ "ams": [...], "tray_now": ... }`; `ams` is absent when only the
    /// active tray changed
    Wrapped {
        #[serde(default)]
        ams: Option<Vec<AmsUnit>>,
    },
}

/// One AMS unit
#[derive(Debug, Clone, Deserialize)]
pub struct AmsUnit {
    /// Unit index (0-based)
    #[serde(default, deserialize_with = "lenient_number")]
    pub id: Option<f64>,

    /// Trays in this unit
    #[serde(default, alias = "trays")]
    pub tray: Vec<AmsTray>,
}

/// One AMS tray
#[derive(Debug, Clone, Deserialize)]
pub struct AmsTray {
    /// Tray index within its unit (0-based)
    #[serde(default, deserialize_with = "lenient_number")]
    pub id: Option<f64>,

    /// Material type
    #[serde(default, alias = "type")]
    pub tray_type: Option<String>,

    /// Color as hex RGBA
    #[serde(default, alias = "color")]
    pub tray_color: Option<String>,

    /// Remaining material percent; negative when unknown
    #[serde(default, deserialize_with = "lenient_number")]
    pub remain: Option<f64>,
}

/// Hardware management alert
#[derive(Debug, Clone, Deserialize)]
pub struct HmsAlert {
    /// Attribute code (module and severity)
    #[serde(default, deserialize_with = "lenient_number")]
    pub attr: Option<f64>,

    /// Alert code
    #[serde(default, deserialize_with = "lenient_number")]
    pub code: Option<f64>,

    /// Human-readable text, when the firmware provides one
    #[serde(default)]
    pub msg: Option<String>,
}

/// Accept a JSON number, a numeric string, or null
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_report() {
        let payload = br#"{"print": {
            "gcode_state": "RUNNING",
            "mc_percent": 42,
            "gcode_file": "benchy.gcode",
            "mc_remaining_time": 17,
            "layer_num": 30,
            "total_layer_num": 120,
            "nozzle_temper": 219.8,
            "nozzle_target_temper": 220,
            "bed_temper": 55.1,
            "print_error": 0,
            "hms": [],
            "command": "push_status"
        }}"#;

        let msg = TelemetryMessage::parse(payload).unwrap();
        let print = msg.print.unwrap();

        assert!(print.is_state("RUNNING"));
        assert_eq!(print.mc_percent, Some(42.0));
        assert_eq!(print.gcode_file.as_deref(), Some("benchy.gcode"));
        assert_eq!(print.total_layer_num, Some(120.0));
        assert_eq!(print.nozzle_temper, Some(219.8));
        assert!(print.ams_units().is_none());
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let payload = br#"{"print": {"mc_percent": "7", "nozzle_temper": " 200.5 ", "layer_num": "n/a"}}"#;

        let print = TelemetryMessage::parse(payload).unwrap().print.unwrap();
        assert_eq!(print.mc_percent, Some(7.0));
        assert_eq!(print.nozzle_temper, Some(200.5));
        assert_eq!(print.layer_num, None);
    }

    #[test]
    fn test_non_print_message() {
        let payload = br#"{"info": {"command": "get_version", "module": []}}"#;

        let msg = TelemetryMessage::parse(payload).unwrap();
        assert!(msg.print.is_none());
    }

    #[test]
    fn test_malformed_payload() {
        assert!(TelemetryMessage::parse(b"{\"print\": ").is_err());
        assert!(TelemetryMessage::parse(b"\xff\xfe").is_err());
        // Known field with the wrong shape
        assert!(TelemetryMessage::parse(br#"{"print": {"gcode_state": 5}}"#).is_err());
    }

    #[test]
    fn test_wrapped_ams() {
        let payload = br#"{"print": {"ams": {"ams": [
            {"id": "0", "tray": [
                {"id": "0", "tray_type": "PLA", "tray_color": "FF0000FF", "remain": 80},
                {"id": "1"}
            ]}
        ], "tray_now": "0"}}}"#;

        let print = TelemetryMessage::parse(payload).unwrap().print.unwrap();
        let units = print.ams_units().unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, Some(0.0));
        assert_eq!(units[0].tray.len(), 2);
        assert_eq!(units[0].tray[0].tray_type.as_deref(), Some("PLA"));
        assert_eq!(units[0].tray[1].remain, None);
    }

    #[test]
    fn test_wrapped_ams_without_units() {
        let payload = br#"{"print": {"ams": {"tray_now": "255"}}}"#;

        let print = TelemetryMessage::parse(payload).unwrap().print.unwrap();
        assert!(print.ams.is_some());
        assert!(print.ams_units().is_none());
    }

    #[test]
    fn test_bare_ams_list() {
        let payload = br#"{"print": {"ams": [
            {"id": 0, "trays": [{"type": "PETG", "color": "00FF00", "remain": 0}]}
        ]}}"#;

        let print = TelemetryMessage::parse(payload).unwrap().print.unwrap();
        let units = print.ams_units().unwrap();

        assert_eq!(units[0].tray[0].tray_type.as_deref(), Some("PETG"));
        assert_eq!(units[0].tray[0].remain, Some(0.0));
    }
}
