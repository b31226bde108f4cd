//! Configuration loading utilities.

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::NodeError;

/// Load configuration from a YAML file.
///
/// ```rust,ignore
/// let config: camera_movement::Config = load_config("camera.yaml")?;
/// ```
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, NodeError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        NodeError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str(&contents).map_err(|e| {
        NodeError::Parse(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Load configuration from an optional file, falling back to `T::default()`.
///
/// Nodes take most of their settings from CLI flags, so a config file is
/// optional. A path that is given but missing is still an error.
pub fn load_config_or_default<T: DeserializeOwned + Default>(
    path: Option<&Path>,
) -> Result<T, NodeError> {
    match path {
        Some(path) => load_config(path),
        None => {
            log::info!("No config file given, using defaults");
            Ok(T::default())
        }
    }
}
