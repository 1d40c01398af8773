//! CollabInk Render Library
//!
//! Renderer abstraction for CollabInk, a display-list implementation that
//! turns a canvas frame into backend-neutral draw commands, and the diagram
//! adapter boundary.

mod diagram;
mod display_list;
mod renderer;

pub use diagram::{BoxFuture, DiagramAdapter, DiagramCache, DiagramError, DiagramState};
pub use display_list::{DisplayListRenderer, DrawCommand};
pub use renderer::{RenderContext, RenderResult, Renderer, RendererError};
