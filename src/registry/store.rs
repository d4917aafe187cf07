//! Device state store
//!
//! Holds exactly one [`DeviceState`] per configured device for the lifetime of
//! the process. All mutation goes through [`StateStore::merge`], which applies
//! the update, recomputes derived fields and publishes the result.
//!
//! The store is owned by a single task and needs no locking; readers get
//! cloned snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::DeviceRegistry;
use crate::models::ModelResolver;
use crate::telemetry::ErrorClassifier;

use super::broadcast::{Broadcaster, Subscription};
use super::entry::{DeviceState, StateUpdate};
use super::error::RegistryError;

/// Canonical per-device state store
pub struct StateStore {
    /// States in configuration order
    states: Vec<DeviceState>,

    /// Device id to position in `states`
    index: HashMap<String, usize>,

    resolver: Arc<ModelResolver>,
    classifier: ErrorClassifier,
    broadcaster: Broadcaster,
}

impl StateStore {
    /// Create default states for every configured device
    pub fn new(
        devices: &DeviceRegistry,
        resolver: Arc<ModelResolver>,
        classifier: ErrorClassifier,
        broadcaster: Broadcaster,
    ) -> Self {
        let states: Vec<DeviceState> = devices.iter().map(DeviceState::new).collect();
        let index = states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        Self {
            states,
            index,
            resolver,
            classifier,
            broadcaster,
        }
    }

    /// Merge an update into a device's state and publish the result
    pub fn merge(
        &mut self,
        device_id: &str,
        update: StateUpdate,
    ) -> Result<DeviceState, RegistryError> {
        self.merge_at(device_id, update, Utc::now())
    }

    /// Merge with an explicit receipt time
    pub fn merge_at(
        &mut self,
        device_id: &str,
        update: StateUpdate,
        received_at: DateTime<Utc>,
    ) -> Result<DeviceState, RegistryError> {
        let pos = *self
            .index
            .get(device_id)
            .ok_or_else(|| RegistryError::UnknownDevice(device_id.to_string()))?;
        let state = &mut self.states[pos];

        match update {
            StateUpdate::Connectivity(status) => {
                if state.status == status {
                    return Ok(state.clone());
                }

                tracing::debug!(device = %device_id, status = ?status, "Connectivity changed");
                state.status = status;
            }
            StateUpdate::Telemetry(report) => {
                state.apply_report(&report, received_at);
                state.model = self.resolver.resolve(&state.current_file).cloned();

                let fault = self.classifier.classify(&report);
                if fault != state.error {
                    match fault {
                        Some(ref f) => tracing::warn!(
                            device = %device_id,
                            code = %f.code,
                            message = %f.message,
                            "Fault detected"
                        ),
                        None => tracing::info!(device = %device_id, "Fault cleared"),
                    }
                }
                state.error = fault;
            }
        }

        let snapshot = state.clone();
        self.broadcaster.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// State of one device
    pub fn get(&self, device_id: &str) -> Option<&DeviceState> {
        self.index.get(device_id).map(|&i| &self.states[i])
    }

    /// Snapshot of all states in configuration order
    pub fn snapshot(&self) -> Vec<DeviceState> {
        self.states.clone()
    }

    /// Attach a consumer: full snapshot first, then every later publish
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe(self.snapshot())
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false once built from a valid registry
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::models::ModelAsset;
    use crate::registry::entry::ConnectionStatus;
    use crate::telemetry::{FaultKind, PrintReport, TelemetryMessage};

    fn store() -> StateStore {
        let devices = DeviceRegistry::new(vec![
            DeviceConfig::new("p1", "Left", "10.0.0.2", "a", "SN1"),
            DeviceConfig::new("p2", "Right", "10.0.0.3", "b", "SN2"),
        ])
        .unwrap();
        let resolver = ModelResolver::new([("benchy", ModelAsset::new("benchy.stl"))]);

        StateStore::new(
            &devices,
            Arc::new(resolver),
            ErrorClassifier::default(),
            Broadcaster::default(),
        )
    }

    fn telemetry(json: &str) -> StateUpdate {
        let payload = format!(r#"{{"print": {}}}"#, json);
        let report: PrintReport = TelemetryMessage::parse(payload.as_bytes())
            .unwrap()
            .print
            .unwrap();
        StateUpdate::Telemetry(report)
    }

    #[test]
    fn test_one_default_state_per_device() {
        let store = store();
        let states = store.snapshot();

        assert_eq!(states.len(), 2);
        assert_eq!(states[0].id, "p1");
        assert_eq!(states[1].id, "p2");
        assert!(states.iter().all(|s| s.state == "IDLE" && !s.is_connected()));
    }

    #[test]
    fn test_merge_extracts_fields() {
        let mut store = store();

        let state = store
            .merge(
                "p1",
                telemetry(
                    r#"{"gcode_state": "RUNNING", "mc_percent": 42, "gcode_file": "benchy_v2.gcode",
                        "mc_remaining_time": 33, "layer_num": 12, "total_layer_num": 200,
                        "nozzle_temper": 220.4, "nozzle_target_temper": 220, "bed_temper": 60}"#,
                ),
            )
            .unwrap();

        assert_eq!(state.state, "RUNNING");
        assert_eq!(state.progress, 42);
        assert_eq!(state.current_file, "benchy_v2.gcode");
        assert_eq!(state.remaining_time, 33);
        assert_eq!(state.layer, 12);
        assert_eq!(state.total_layers, 200);
        assert_eq!(state.nozzle_temp, 220.4);
        assert_eq!(state.bed_temp, 60.0);
        assert!(state.last_update.is_some());
        assert_eq!(state.model.unwrap().model_file, "benchy.stl");
        assert!(state.error.is_none());

        // The other device is untouched
        assert_eq!(store.get("p2").unwrap().progress, 0);
    }

    #[test]
    fn test_absent_fields_take_defaults() {
        let mut store = store();

        store
            .merge(
                "p1",
                telemetry(r#"{"gcode_state": "RUNNING", "mc_percent": 50, "gcode_file": "benchy.gcode"}"#),
            )
            .unwrap();
        let state = store.merge("p1", telemetry(r#"{"layer_num": 3}"#)).unwrap();

        assert_eq!(state.progress, 0);
        assert!(state.current_file.is_empty());
        assert!(state.model.is_none());
        assert_eq!(state.layer, 3);
        // Job state is only resent on transitions
        assert_eq!(state.state, "RUNNING");
    }

    #[test]
    fn test_ams_retained_when_absent() {
        let mut store = store();

        let with_ams = store
            .merge(
                "p1",
                telemetry(r#"{"ams": [{"id": 0, "trays": [{"type": "PLA", "color": "FF0000", "remain": 60}]}]}"#),
            )
            .unwrap();
        assert_eq!(with_ams.ams.len(), 1);

        let without_ams = store
            .merge("p1", telemetry(r#"{"gcode_state": "RUNNING", "mc_percent": 5}"#))
            .unwrap();
        assert_eq!(without_ams.ams, with_ams.ams);

        // Wrapper without unit data also leaves slots alone
        let tray_change = store
            .merge("p1", telemetry(r#"{"ams": {"tray_now": "1"}}"#))
            .unwrap();
        assert_eq!(tray_change.ams, with_ams.ams);
    }

    #[test]
    fn test_ams_replaced_wholesale() {
        let mut store = store();

        store
            .merge(
                "p1",
                telemetry(r#"{"ams": [{"id": 0, "trays": [{"type": "PLA"}, {"type": "PETG"}]}]}"#),
            )
            .unwrap();
        let state = store
            .merge("p1", telemetry(r#"{"ams": [{"id": 0, "trays": [{"type": "ABS"}]}]}"#))
            .unwrap();

        assert_eq!(state.ams.len(), 1);
        assert_eq!(state.ams[0].material, "ABS");
    }

    #[test]
    fn test_fault_is_not_sticky() {
        let mut store = store();

        let faulted = store
            .merge(
                "p1",
                telemetry(r#"{"gcode_state": "RUNNING", "nozzle_temper": 210, "nozzle_target_temper": 190}"#),
            )
            .unwrap();
        assert_eq!(
            faulted.error.map(|f| f.kind),
            Some(FaultKind::TemperatureAnomaly)
        );

        let cleared = store
            .merge(
                "p1",
                telemetry(r#"{"gcode_state": "RUNNING", "nozzle_temper": 191, "nozzle_target_temper": 190}"#),
            )
            .unwrap();
        assert!(cleared.error.is_none());
    }

    #[test]
    fn test_fault_uses_raw_snapshot() {
        let mut store = store();

        store
            .merge("p1", telemetry(r#"{"gcode_state": "PAUSE", "ams": [{"id": 0, "trays": [{"remain": 0}]}]}"#))
            .unwrap();

        // Slots are retained in state, but this snapshot carries no AMS data
        let state = store.merge("p1", telemetry(r#"{"gcode_state": "PAUSE"}"#)).unwrap();
        assert_eq!(state.ams.len(), 1);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_connectivity_publishes_only_on_change() {
        let mut store = store();
        let mut sub = store.subscribe();

        let state = store
            .merge("p1", StateUpdate::Connectivity(ConnectionStatus::Connected))
            .unwrap();
        assert!(state.is_connected());
        assert_eq!(sub.try_recv().unwrap().id, "p1");

        store
            .merge("p1", StateUpdate::Connectivity(ConnectionStatus::Connected))
            .unwrap();
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_merge_publishes_full_state() {
        let mut store = store();
        let mut sub = store.subscribe();
        assert_eq!(sub.snapshot.len(), 2);

        store
            .merge("p2", telemetry(r#"{"gcode_state": "FINISH", "mc_percent": 100}"#))
            .unwrap();

        let published = sub.try_recv().unwrap();
        assert_eq!(published.id, "p2");
        assert_eq!(published.name, "Right");
        assert_eq!(published.progress, 100);
    }

    #[test]
    fn test_unknown_device() {
        let mut store = store();

        let result = store.merge("ghost", telemetry("{}"));
        assert_eq!(result, Err(RegistryError::UnknownDevice("ghost".into())));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_receipt_time_recorded() {
        let mut store = store();
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        let state = store.merge_at("p1", telemetry("{}"), at).unwrap();
        assert_eq!(state.last_update, Some(at));
    }
}
