//! Model resolver
//!
//! Maps the filename of the job a printer is running to a configured model
//! asset. Configuration is a flat JSON object read once at startup:
//!
//! ```json
//! {
//!   "benchy": { "modelFile": "benchy.stl" },
//!   "calibration_cube.gcode": { "modelFile": "cube.stl", "color": "#ff0000" }
//! }
//! ```
//!
//! Lookup is an exact key match first, then a case-insensitive substring match
//! in either direction, taking the first key in file order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Asset descriptor for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAsset {
    /// Model file served by the presentation layer
    pub model_file: String,

    /// Any additional descriptor fields, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModelAsset {
    /// Create an asset with no extra fields
    pub fn new(model_file: impl Into<String>) -> Self {
        Self {
            model_file: model_file.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Stateless filename to asset lookup
#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    /// Entries in configuration order, with the lowercased key cached
    entries: Vec<(String, String, ModelAsset)>,
}

impl ModelResolver {
    /// Build a resolver from ordered (key, asset) pairs
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ModelAsset)>,
        K: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, asset)| {
                let key = key.into();
                let lower = key.to_lowercase();
                (key, lower, asset)
            })
            .collect();

        Self { entries }
    }

    /// Parse a resolver from JSON object text
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let asset: ModelAsset =
                serde_json::from_value(value).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            entries.push((key, asset));
        }

        Ok(Self::new(entries))
    }

    /// Load a resolver from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let resolver = Self::from_json(path, &text)?;
        tracing::info!(
            path = %path.display(),
            models = resolver.len(),
            "Loaded model configuration"
        );
        Ok(resolver)
    }

    /// Resolve a job filename to an asset
    pub fn resolve(&self, filename: &str) -> Option<&ModelAsset> {
        if filename.is_empty() {
            return None;
        }

        if let Some((_, _, asset)) = self.entries.iter().find(|(key, _, _)| key == filename) {
            return Some(asset);
        }

        let filename = filename.to_lowercase();
        self.entries
            .iter()
            .find(|(_, key, _)| filename.contains(key.as_str()) || key.contains(filename.as_str()))
            .map(|(_, _, asset)| asset)
    }

    /// Number of configured keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
