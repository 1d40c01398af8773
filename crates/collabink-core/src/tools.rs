//! Tool selection and the settings tools draw with.

use crate::config::CanvasConfig;
use crate::layers::{LayerKind, Rgb};
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "tool", content = "layer", rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Select,
    /// Place a layer of this kind on the next click.
    Insert(LayerKind),
    Pencil,
    Eraser,
}

/// Pen settings shared by the pencil and by presence broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub pen_color: Rgb,
    pub stroke_width: f64,
}

impl ToolSettings {
    pub fn from_config(config: &CanvasConfig) -> Self {
        Self {
            pen_color: config.default_pen_color,
            stroke_width: config.default_stroke_width,
        }
    }

    /// Set the stroke width, ignoring non-positive values.
    pub fn set_stroke_width(&mut self, width: f64) {
        if width > 0.0 {
            self.stroke_width = width;
        } else {
            log::debug!("Ignoring stroke width {width}");
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from_config(&CanvasConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tool_is_select() {
        assert_eq!(ToolKind::default(), ToolKind::Select);
    }

    #[test]
    fn test_settings_follow_config() {
        let settings = ToolSettings::default();
        assert_eq!(settings.pen_color, Rgb::new(0, 0, 0));
        assert!((settings.stroke_width - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_bad_width() {
        let mut settings = ToolSettings::default();
        settings.set_stroke_width(0.0);
        assert!((settings.stroke_width - 8.0).abs() < f64::EPSILON);
        settings.set_stroke_width(3.0);
        assert!((settings.stroke_width - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tool_serde() {
        let json = serde_json::to_string(&ToolKind::Insert(LayerKind::Note)).unwrap();
        assert_eq!(json, r#"{"tool":"insert","layer":"note"}"#);
    }
}
