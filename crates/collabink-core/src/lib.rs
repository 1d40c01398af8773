//! CollabInk Core Library
//!
//! Layer model, replicated layer store and pointer state machine for a
//! collaborative vector canvas. Rendering lives in `collabink-render`.

pub mod camera;
pub mod canvas;
pub mod config;
pub mod crdt;
pub mod geometry;
pub mod input;
pub mod layers;
pub mod presence;
pub mod selection;
pub mod store;
pub mod stroke;
pub mod tools;

pub use camera::Camera;
pub use canvas::{Canvas, CanvasError, CanvasFrame, CanvasResult, CanvasState};
pub use config::{CanvasConfig, ConfigError};
pub use crdt::{BackendError, Change, LayerBackend, LoroBackend, MemoryBackend};
pub use input::{InputState, KeyEvent, Modifiers, MouseButton, PointerEvent};
pub use layers::{Layer, LayerId, LayerKind, LayerPatch, LayerTrait, Rgb, StrokePoint};
pub use presence::{
    Member, ParticipantDirectory, Presence, PresenceBroadcaster, PresenceChannel, PresenceError, PresenceMessage,
    QueuedPresenceChannel, RemoteCursor,
};
pub use selection::{Corner, Edge, ResizeHandle, Selection};
pub use store::LayerStore;
pub use stroke::StrokeDraft;
pub use tools::{ToolKind, ToolSettings};
