//! Backend-neutral renderer that records a flat list of draw commands.

use crate::diagram::DiagramState;
use crate::renderer::{RenderContext, RenderResult, Renderer};
use collabink_core::geometry::{contrasting_text_color, stroke_to_path};
use collabink_core::presence::RemoteCursor;
use collabink_core::selection::{HANDLE_SIZE, handles};
use collabink_core::{Layer, LayerId, LayerTrait};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use peniko::Color;

/// Default stroke width for remote strokes that did not announce one.
const FALLBACK_STROKE_WIDTH: f64 = 8.0;
/// Padding between a text box edge and its text.
const TEXT_PADDING: f64 = 6.0;
const LABEL_CHAR_WIDTH: f64 = 7.0;
const LABEL_HEIGHT: f64 = 18.0;

/// One drawing operation.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    FillPath {
        path: BezPath,
        color: Color,
        transform: Affine,
    },
    StrokePath {
        path: BezPath,
        color: Color,
        width: f64,
        dashed: bool,
        transform: Affine,
    },
    Text {
        text: String,
        origin: Point,
        max_width: f64,
        color: Color,
        transform: Affine,
    },
    /// Adapter output for a Diagram layer, drawn inside `bounds`.
    Markup {
        layer: LayerId,
        markup: String,
        bounds: Rect,
        transform: Affine,
    },
}

/// Records the scene as [`DrawCommand`]s for a host to replay.
#[derive(Debug)]
pub struct DisplayListRenderer {
    commands: Vec<DrawCommand>,
    /// Selection highlight color, taken from the context each frame.
    selection_color: Color,
}

impl Default for DisplayListRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayListRenderer {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            selection_color: Color::from_rgba8(59, 130, 246, 255),
        }
    }

    /// Commands of the last built frame.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    fn fill(&mut self, path: BezPath, color: Color, transform: Affine) {
        self.commands.push(DrawCommand::FillPath { path, color, transform });
    }

    fn stroke(&mut self, path: BezPath, color: Color, width: f64, dashed: bool, transform: Affine) {
        self.commands.push(DrawCommand::StrokePath {
            path,
            color,
            width,
            dashed,
            transform,
        });
    }

    fn text(&mut self, text: &str, bounds: Rect, color: Color, transform: Affine) {
        if text.is_empty() {
            return;
        }
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            origin: Point::new(bounds.x0 + TEXT_PADDING, bounds.y0 + TEXT_PADDING),
            max_width: (bounds.width() - 2.0 * TEXT_PADDING).max(0.0),
            color,
            transform,
        });
    }

    fn render_layer(&mut self, ctx: &RenderContext, id: &LayerId, layer: &Layer, transform: Affine) {
        let editing = ctx.frame.editing.as_ref() == Some(id);
        match layer {
            Layer::Rectangle(_) | Layer::Ellipse(_) | Layer::Path(_) => {
                self.fill(layer.to_path(), layer.fill().into(), transform);
            }
            Layer::Text(text) => {
                // Text is drawn in its fill color; the editor overlays it while editing.
                if !editing {
                    self.text(&text.value, text.bounds(), text.fill.into(), transform);
                }
            }
            Layer::Note(note) => {
                self.fill(note.to_path(), note.fill.into(), transform);
                if !editing {
                    self.text(&note.value, note.bounds(), note.text_color().into(), transform);
                }
            }
            Layer::Diagram(diagram) => self.render_diagram(ctx, id, diagram.bounds(), transform),
        }
    }

    fn render_diagram(&mut self, ctx: &RenderContext, id: &LayerId, bounds: Rect, transform: Affine) {
        let state = ctx.diagrams.and_then(|cache| cache.state(id));
        match state {
            Some(DiagramState::Ready(markup)) => self.commands.push(DrawCommand::Markup {
                layer: id.clone(),
                markup: markup.clone(),
                bounds,
                transform,
            }),
            Some(DiagramState::Failed(e)) => {
                self.fill(bounds.to_path(0.1), Color::from_rgba8(254, 226, 226, 255), transform);
                self.stroke(bounds.to_path(0.1), Color::from_rgba8(220, 38, 38, 255), 1.0, false, transform);
                self.text(&e.to_string(), bounds, Color::from_rgba8(153, 27, 27, 255), transform);
            }
            Some(DiagramState::Pending) | None => {
                let gray = Color::from_rgba8(156, 163, 175, 255);
                self.stroke(bounds.to_path(0.1), gray, 1.0, true, transform);
                self.text("Rendering diagram", bounds, gray, transform);
            }
        }
    }

    /// Selection outline plus resize handles.
    fn render_selection(&mut self, ctx: &RenderContext, transform: Affine) {
        let selected = ctx
            .frame
            .layers
            .iter()
            .filter(|(id, _)| ctx.frame.selection.contains(id));
        let outlines: Vec<BezPath> = selected.map(|(_, layer)| layer.bounds().to_path(0.1)).collect();
        for outline in outlines {
            self.stroke(outline, self.selection_color, 1.0, false, transform);
        }

        if let Some(bounds) = ctx.frame.handle_bounds {
            let half = HANDLE_SIZE / 2.0;
            for handle in handles(bounds) {
                let p = handle.position;
                let square = Rect::new(p.x - half, p.y - half, p.x + half, p.y + half).to_path(0.1);
                self.fill(square.clone(), Color::WHITE, transform);
                self.stroke(square, self.selection_color, 1.5, false, transform);
            }
        }
    }

    /// Render a selection rectangle (marquee).
    fn render_selection_net(&mut self, rect: Rect, transform: Affine) {
        let path = rect.to_path(0.1);
        // Fill with semi-transparent blue
        self.fill(path.clone(), Color::from_rgba8(59, 130, 246, 25), transform);
        self.stroke(path, self.selection_color, 1.0, true, transform);
    }

    /// Other participants' live strokes, in canvas coordinates.
    fn render_remote_strokes(&mut self, remote: &[RemoteCursor], transform: Affine) {
        for cursor in remote {
            let Some(points) = cursor.pencil_draft.as_deref() else {
                continue;
            };
            let width = cursor.stroke_width.unwrap_or(FALLBACK_STROKE_WIDTH);
            let path = stroke_to_path(points, Point::ZERO, width);
            if !path.elements().is_empty() {
                self.fill(path, cursor.pen_color.into(), transform);
            }
        }
    }

    /// Draw a remote user's cursor with a name label, in screen coordinates.
    fn render_cursor(&mut self, cursor: &RemoteCursor, screen_pos: Point, screen: Affine) {
        let color: Color = cursor.color.into();

        let mut path = BezPath::new();
        path.move_to(screen_pos); // tip
        path.line_to(Point::new(screen_pos.x, screen_pos.y + 18.0));
        path.line_to(Point::new(screen_pos.x + 14.0, screen_pos.y + 14.0));
        path.close_path();
        self.fill(path.clone(), color, screen);
        // White stroke for visibility against any background
        self.stroke(path, Color::WHITE, 1.5, false, screen);

        let label_width = cursor.name.chars().count() as f64 * LABEL_CHAR_WIDTH + 2.0 * TEXT_PADDING;
        let label = Rect::new(
            screen_pos.x + 12.0,
            screen_pos.y + 18.0,
            screen_pos.x + 12.0 + label_width,
            screen_pos.y + 18.0 + LABEL_HEIGHT + TEXT_PADDING,
        );
        self.fill(label.to_rounded_rect(4.0).to_path(0.1), color, screen);
        let text_color: Color = contrasting_text_color(cursor.color).into();
        self.text(&cursor.name, label, text_color, screen);
    }
}

impl Renderer for DisplayListRenderer {
    fn build_scene(&mut self, ctx: &RenderContext) -> RenderResult<()> {
        ctx.validate()?;
        self.commands.clear();
        self.selection_color = ctx.selection_color;

        let screen = Affine::scale(ctx.scale_factor);
        let world = screen * ctx.frame.camera.transform();

        // Layers back to front
        for (id, layer) in &ctx.frame.layers {
            self.render_layer(ctx, id, layer, world);
        }

        self.render_selection(ctx, world);

        if let Some(rect) = ctx.frame.selection_net {
            self.render_selection_net(rect, world);
        }

        if let Some(draft) = &ctx.frame.local_draft {
            let path = stroke_to_path(draft.points(), Point::ZERO, ctx.frame.stroke_width);
            if !path.elements().is_empty() {
                self.fill(path, draft.color().into(), world);
            }
        }

        self.render_remote_strokes(&ctx.frame.remote, world);

        for cursor in &ctx.frame.remote {
            if let Some(position) = cursor.position {
                let screen_pos = ctx.frame.camera.world_to_screen(position);
                self.render_cursor(cursor, screen_pos, screen);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{DiagramCache, DiagramError};
    use crate::renderer::RendererError;
    use collabink_core::layers::{Diagram, Note, Rectangle};
    use collabink_core::{Camera, CanvasFrame, Rgb, StrokeDraft, StrokePoint};
    use kurbo::{Size, Vec2};

    fn frame(layers: Vec<(LayerId, Layer)>) -> CanvasFrame {
        CanvasFrame {
            camera: Camera::new(),
            layers,
            selection: Vec::new(),
            handle_bounds: None,
            selection_net: None,
            local_draft: None,
            stroke_width: 8.0,
            editing: None,
            remote: Vec::new(),
        }
    }

    fn build(frame: &CanvasFrame) -> Vec<DrawCommand> {
        let mut renderer = DisplayListRenderer::new();
        let ctx = RenderContext::new(frame, Size::new(800.0, 600.0));
        renderer.build_scene(&ctx).unwrap();
        renderer.take_commands()
    }

    fn rect_layer(x: f64, y: f64) -> Layer {
        Layer::Rectangle(Rectangle::new(Point::new(x, y), 100.0, 100.0, Rgb::new(252, 142, 42)))
    }

    #[test]
    fn test_empty_frame_draws_nothing() {
        assert!(build(&frame(Vec::new())).is_empty());
    }

    #[test]
    fn test_invalid_viewport() {
        let frame = frame(Vec::new());
        let mut renderer = DisplayListRenderer::new();
        let ctx = RenderContext::new(&frame, Size::new(0.0, 600.0));
        assert!(matches!(renderer.build_scene(&ctx), Err(RendererError::InvalidViewport(_))));
    }

    #[test]
    fn test_camera_transform_applied() {
        let mut frame = frame(vec![(LayerId::from("a"), rect_layer(0.0, 0.0))]);
        frame.camera.pan(Vec2::new(20.0, 10.0));
        let commands = build(&frame);
        let DrawCommand::FillPath { transform, .. } = &commands[0] else {
            panic!("expected a fill");
        };
        assert_eq!(*transform * Point::new(0.0, 0.0), Point::new(20.0, 10.0));
    }

    #[test]
    fn test_note_text_uses_contrasting_color() {
        let mut note = Note::new(Point::ZERO, 100.0, 100.0, Rgb::new(20, 20, 20));
        note.value = "hi".into();
        let commands = build(&frame(vec![(LayerId::from("n"), Layer::Note(note.clone()))]));
        assert_eq!(commands.len(), 2);
        let DrawCommand::Text { text, color, .. } = &commands[1] else {
            panic!("expected text");
        };
        assert_eq!(text, "hi");
        let expected: Color = note.text_color().into();
        assert_eq!(color.to_rgba8(), expected.to_rgba8());
    }

    #[test]
    fn test_editing_note_skips_text() {
        let mut note = Note::new(Point::ZERO, 100.0, 100.0, Rgb::new(255, 255, 255));
        note.value = "draft".into();
        let id = LayerId::from("n");
        let mut frame = frame(vec![(id.clone(), Layer::Note(note))]);
        frame.editing = Some(id);
        assert_eq!(build(&frame).len(), 1);
    }

    #[test]
    fn test_selection_outline_and_handles() {
        let id = LayerId::from("a");
        let mut frame = frame(vec![(id.clone(), rect_layer(0.0, 0.0))]);
        frame.selection = vec![id];
        frame.handle_bounds = Some(Rect::new(0.0, 0.0, 100.0, 100.0));
        let commands = build(&frame);
        // layer + outline + 8 handles drawn as fill and stroke
        assert_eq!(commands.len(), 1 + 1 + 16);
    }

    #[test]
    fn test_selection_net_is_dashed() {
        let mut frame = frame(Vec::new());
        frame.selection_net = Some(Rect::new(0.0, 0.0, 50.0, 50.0));
        let commands = build(&frame);
        assert!(matches!(commands[1], DrawCommand::StrokePath { dashed: true, .. }));
    }

    #[test]
    fn test_diagram_states() {
        let ok = LayerId::from("ok");
        let bad = LayerId::from("bad");
        let waiting = LayerId::from("waiting");
        let layer = |spec: &str| Layer::Diagram(Diagram::new(Point::ZERO, 320.0, 240.0, Rgb::new(255, 255, 255), spec));

        let mut cache = DiagramCache::new();
        cache.mark_pending(ok.clone(), "a");
        cache.store_result(&ok, "a", Ok("<svg/>".into()));
        cache.mark_pending(bad.clone(), "b");
        cache.store_result(&bad, "b", Err(DiagramError::Syntax("line 1".into())));

        let frame = frame(vec![
            (ok.clone(), layer("a")),
            (bad, layer("b")),
            (waiting, layer("c")),
        ]);
        let mut renderer = DisplayListRenderer::new();
        let ctx = RenderContext::new(&frame, Size::new(800.0, 600.0)).with_diagrams(&cache);
        renderer.build_scene(&ctx).unwrap();
        let commands = renderer.commands();

        assert!(matches!(&commands[0], DrawCommand::Markup { layer, .. } if *layer == ok));
        assert!(
            commands
                .iter()
                .any(|c| matches!(c, DrawCommand::Text { text, .. } if text.contains("line 1")))
        );
        assert!(
            commands
                .iter()
                .any(|c| matches!(c, DrawCommand::Text { text, .. } if text == "Rendering diagram"))
        );
    }

    #[test]
    fn test_remote_cursor_and_live_stroke() {
        let mut frame = frame(Vec::new());
        frame.camera.pan(Vec2::new(100.0, 0.0));
        frame.remote = vec![RemoteCursor {
            connection_id: 2,
            name: "Grace".into(),
            avatar: None,
            color: Rgb::from_hex("#059669").unwrap(),
            position: Some(Point::new(10.0, 10.0)),
            pencil_draft: Some(vec![StrokePoint::new(0.0, 0.0, 0.5), StrokePoint::new(30.0, 0.0, 0.5)]),
            pen_color: Rgb::new(220, 38, 38),
            stroke_width: Some(4.0),
        }];
        let commands = build(&frame);

        // live stroke, cursor fill + outline, label background, label text
        assert_eq!(commands.len(), 5);
        let DrawCommand::FillPath { path, transform, .. } = &commands[1] else {
            panic!("expected cursor fill");
        };
        assert_eq!(*transform, Affine::IDENTITY);
        assert_eq!(path.elements()[0], kurbo::PathEl::MoveTo(Point::new(110.0, 10.0)));
        assert!(matches!(&commands[4], DrawCommand::Text { text, .. } if text == "Grace"));
    }

    #[test]
    fn test_local_draft_drawn() {
        let mut frame = frame(Vec::new());
        let mut draft = StrokeDraft::start(Point::new(0.0, 0.0), 0.5, Rgb::new(0, 0, 0));
        draft.continue_to(Point::new(10.0, 10.0), 0.5);
        frame.local_draft = Some(draft);
        assert_eq!(build(&frame).len(), 1);
    }
}
