//! Renderer trait abstraction.

use crate::diagram::DiagramCache;
use collabink_core::CanvasFrame;
use kurbo::Size;
use peniko::Color;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Invalid viewport {0:?}")]
    InvalidViewport(Size),
    #[error("Invalid scale factor {0}")]
    InvalidScale(f64),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Context for a single render frame.
pub struct RenderContext<'a> {
    /// The canvas snapshot to render.
    pub frame: &'a CanvasFrame,
    /// Viewport size in physical pixels.
    pub viewport_size: Size,
    /// Device pixel ratio (for HiDPI).
    pub scale_factor: f64,
    /// Background color.
    pub background_color: Color,
    /// Selection highlight color.
    pub selection_color: Color,
    /// Render results for Diagram layers.
    pub diagrams: Option<&'a DiagramCache>,
}

impl<'a> RenderContext<'a> {
    /// Create a new render context.
    pub fn new(frame: &'a CanvasFrame, viewport_size: Size) -> Self {
        Self {
            frame,
            viewport_size,
            scale_factor: 1.0,
            background_color: Color::from_rgba8(250, 250, 250, 255),
            selection_color: Color::from_rgba8(59, 130, 246, 255), // Blue
            diagrams: None,
        }
    }

    /// Set the scale factor for HiDPI.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_selection_color(mut self, color: Color) -> Self {
        self.selection_color = color;
        self
    }

    /// Use cached diagram renders for Diagram layers.
    pub fn with_diagrams(mut self, diagrams: &'a DiagramCache) -> Self {
        self.diagrams = Some(diagrams);
        self
    }

    /// Reject contexts no backend can draw into.
    pub fn validate(&self) -> RenderResult<()> {
        if !(self.viewport_size.width > 0.0 && self.viewport_size.height > 0.0) {
            return Err(RendererError::InvalidViewport(self.viewport_size));
        }
        if !(self.scale_factor > 0.0 && self.scale_factor.is_finite()) {
            return Err(RendererError::InvalidScale(self.scale_factor));
        }
        Ok(())
    }
}

/// Trait for rendering backends.
///
/// Implementations can target a GPU scene, an SVG writer or a plain command list.
pub trait Renderer {
    /// Build the scene/command buffer for a frame.
    ///
    /// This method is called once per frame and should prepare all drawing commands.
    fn build_scene(&mut self, ctx: &RenderContext) -> RenderResult<()>;

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}
