//! Job filename to 3D model asset lookup

pub mod resolver;

pub use resolver::{ModelAsset, ModelResolver};
