use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Viewer tuning knobs, loaded from `config.toml` in the data directory
/// when present.
///
/// The zoom factor is clamped to `[min_zoom, max_zoom]`; the upstream
/// behavior this replaces had no bounds at all, which let rapid zooming
/// reach degenerate raster sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Multiplier applied per zoom-in step (zoom-out divides by it).
    pub zoom_step: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Horizontal padding subtracted from the container width before
    /// computing the fit-to-width scale.
    pub container_padding: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom_step: 1.2,
            min_zoom: 0.1,
            max_zoom: 10.0,
            container_padding: 40.0,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads the config file, falling back to defaults when it is missing
    /// or malformed. A malformed file is logged, never fatal.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(text) => match Self::from_toml(&text) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring malformed config file");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read config file");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_step() {
        let config = ViewerConfig::default();
        assert!((config.zoom_step - 1.2).abs() < f32::EPSILON);
        assert!(config.min_zoom < 1.0 && config.max_zoom > 1.0);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = ViewerConfig::from_toml("zoom_step = 1.5\n").unwrap();
        assert!((config.zoom_step - 1.5).abs() < f32::EPSILON);
        assert!((config.container_padding - 40.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ViewerConfig::load_or_default(&dir.path().join("config.toml"));
        assert!((config.zoom_step - 1.2).abs() < f32::EPSILON);
    }
}
