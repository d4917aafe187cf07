//! Device configuration records
//!
//! Loads the ordered list of printers from `printers.json`:
//!
//! ```json
//! [
//!   { "id": "p1", "name": "Workshop X1C", "ip": "192.168.1.40",
//!     "accessCode": "12345678", "serialNumber": "00M09A350100123" }
//! ]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Immutable configuration for one device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Unique device id
    pub id: String,
    /// Display name
    pub name: String,
    /// Network address (host or IP) of the device's MQTT endpoint
    #[serde(alias = "address")]
    pub ip: String,
    /// LAN access credential, used as the MQTT password
    pub access_code: String,
    /// Serial identifier, used to build report/request topics
    pub serial_number: String,
}

impl DeviceConfig {
    /// Create a device record
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        ip: impl Into<String>,
        access_code: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ip: ip.into(),
            access_code: access_code.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Topic the device publishes its reports on
    pub fn report_topic(&self) -> String {
        format!("device/{}/report", self.serial_number)
    }

    /// Topic the device accepts commands on
    pub fn request_topic(&self) -> String {
        format!("device/{}/request", self.serial_number)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required: [(&'static str, &str); 3] = [
            ("id", &self.id),
            ("ip", &self.ip),
            ("serialNumber", &self.serial_number),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    device: if self.id.is_empty() {
                        self.name.clone()
                    } else {
                        self.id.clone()
                    },
                    field,
                });
            }
        }

        Ok(())
    }
}

/// Ordered, immutable set of configured devices
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceConfig>,
}

impl DeviceRegistry {
    /// Build a registry from records, rejecting empty lists, duplicate ids and
    /// records missing required fields.
    pub fn new(devices: Vec<DeviceConfig>) -> Result<Self, ConfigError> {
        if devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        let mut seen = HashSet::with_capacity(devices.len());
        for device in &devices {
            device.validate()?;
            if !seen.insert(device.id.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.id.clone()));
            }
        }

        Ok(Self { devices })
    }

    /// Parse a registry from JSON text
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let devices: Vec<DeviceConfig> =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(devices)
    }

    /// Load a registry from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let registry = Self::from_json(path, &text)?;
        tracing::info!(
            path = %path.display(),
            devices = registry.len(),
            "Loaded device configuration"
        );
        Ok(registry)
    }

    /// Look up a device by id
    pub fn get(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Iterate devices in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.iter()
    }

    /// Number of configured devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Always false for a successfully built registry
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
