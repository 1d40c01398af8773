//! Tunable constants for the canvas engine.
//!
//! Every field has a default, so a JSON file only needs the keys it overrides.

use crate::layers::Rgb;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Width and height pair used for default layer boxes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width: f64,
    pub height: f64,
}

impl BoxSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Canvas engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Maximum number of layers on one canvas.
    pub max_layers: usize,
    /// Minimum width/height of a resizable layer.
    pub min_layer_size: f64,
    /// Padding added to every side of a layer box when testing the selection net.
    pub selection_net_tolerance: f64,
    /// Manhattan distance a press must travel before it becomes a selection net.
    pub selection_net_threshold: f64,
    /// Eraser hit tolerance around the pointer.
    pub eraser_tolerance: f64,
    /// Multiplier on the eraser tolerance for freehand paths.
    pub path_eraser_multiplier: f64,
    /// Default box for rectangles, ellipses and notes (centered on the cursor).
    pub default_shape_size: BoxSize,
    /// Default box for text (anchored at the cursor).
    pub default_text_size: BoxSize,
    /// Default box for diagrams (centered on the cursor).
    pub default_diagram_size: BoxSize,
    /// Specification given to freshly inserted diagrams.
    pub diagram_placeholder: String,
    /// Fill used for insertions until the user picks another color.
    pub default_fill: Rgb,
    /// Pen color used for freehand strokes.
    pub default_pen_color: Rgb,
    /// Stroke width used when the pencil tool carries none.
    pub default_stroke_width: f64,
    /// Undo depth kept by the backends.
    pub max_undo_steps: usize,
    /// Loro undo merge window; 0 keeps every commit as its own step.
    pub history_merge_interval_ms: i64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            max_layers: 100,
            min_layer_size: 20.0,
            selection_net_tolerance: 5.0,
            selection_net_threshold: 2.0,
            eraser_tolerance: 15.0,
            path_eraser_multiplier: 2.0,
            default_shape_size: BoxSize::new(100.0, 100.0),
            default_text_size: BoxSize::new(120.0, 40.0),
            default_diagram_size: BoxSize::new(320.0, 240.0),
            diagram_placeholder: "graph TD\n  A[Start] --> B[End]".to_string(),
            default_fill: Rgb::new(252, 142, 42),
            default_pen_color: Rgb::new(0, 0, 0),
            default_stroke_width: 8.0,
            max_undo_steps: 100,
            history_merge_interval_ms: 0,
        }
    }
}

impl CanvasConfig {
    /// Parse a config from JSON text and validate it.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded canvas config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_layers == 0 {
            return Err(ConfigError::Invalid("max_layers must be at least 1".into()));
        }
        if self.min_layer_size <= 0.0 {
            return Err(ConfigError::Invalid("min_layer_size must be positive".into()));
        }
        if self.default_stroke_width <= 0.0 {
            return Err(ConfigError::Invalid("default_stroke_width must be positive".into()));
        }
        for (name, size) in [
            ("default_shape_size", self.default_shape_size),
            ("default_text_size", self.default_text_size),
            ("default_diagram_size", self.default_diagram_size),
        ] {
            if size.width < self.min_layer_size || size.height < self.min_layer_size {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be at least {} on both sides",
                    self.min_layer_size
                )));
            }
        }
        if self.selection_net_tolerance < 0.0 || self.eraser_tolerance < 0.0 {
            return Err(ConfigError::Invalid("tolerances must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CanvasConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_layers, 100);
        assert!((config.min_layer_size - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CanvasConfig::from_json_str(r#"{ "max_layers": 5 }"#).unwrap();
        assert_eq!(config.max_layers, 5);
        assert!((config.eraser_tolerance - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = CanvasConfig::from_json_str(r#"{ "max_layers": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = CanvasConfig::from_json_str(r#"{ "default_text_size": { "width": 5.0, "height": 40.0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = CanvasConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "selection_net_tolerance": 8.0 }}"#).unwrap();

        let config = CanvasConfig::load(file.path()).unwrap();
        assert!((config.selection_net_tolerance - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = CanvasConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = CanvasConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(CanvasConfig::from_json_str(&json).unwrap(), config);
    }
}
