//! Conversion between Layer types and Loro values.

use super::{BackendError, BackendResult};
use crate::layers::{Diagram, Ellipse, Layer, LayerKind, LayerPatch, Note, Path, Rectangle, Rgb, StrokePoint, Text};
use kurbo::Point;
use loro::{LoroList, LoroMap, LoroMapValue, LoroResult, LoroValue};

// Common keys
const KEY_TYPE: &str = "type";
const KEY_X: &str = "x";
const KEY_Y: &str = "y";
const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";
const KEY_FILL_R: &str = "fill_r";
const KEY_FILL_G: &str = "fill_g";
const KEY_FILL_B: &str = "fill_b";

// Content keys
const KEY_VALUE: &str = "value";
const KEY_SPEC: &str = "spec";

// Path keys
const KEY_POINTS: &str = "points";
const KEY_STROKE_WIDTH: &str = "stroke_width";

// Helper functions to extract values from LoroMapValue
fn get_double(map: &LoroMapValue, key: &str) -> Option<f64> {
    match map.get(key)? {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

fn get_i64(map: &LoroMapValue, key: &str) -> Option<i64> {
    match map.get(key)? {
        LoroValue::I64(i) => Some(*i),
        LoroValue::Double(d) => Some(*d as i64),
        _ => None,
    }
}

fn get_string(map: &LoroMapValue, key: &str) -> Option<String> {
    match map.get(key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn as_f64(value: &LoroValue) -> Option<f64> {
    match value {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

fn require_double(map: &LoroMapValue, key: &str) -> BackendResult<f64> {
    get_double(map, key).ok_or_else(|| BackendError::Conversion(format!("missing number field `{key}`")))
}

fn channel(map: &LoroMapValue, key: &str) -> BackendResult<u8> {
    let raw = get_i64(map, key).ok_or_else(|| BackendError::Conversion(format!("missing color field `{key}`")))?;
    u8::try_from(raw).map_err(|_| BackendError::Conversion(format!("color field `{key}` out of range: {raw}")))
}

fn fill_to_loro(fill: Rgb, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_FILL_R, i64::from(fill.r))?;
    map.insert(KEY_FILL_G, i64::from(fill.g))?;
    map.insert(KEY_FILL_B, i64::from(fill.b))?;
    Ok(())
}

fn points_to_loro(points: &[StrokePoint], map: &LoroMap) -> LoroResult<()> {
    // Store points as a list of [x, y, pressure] triples
    let points_list = map.insert_container(KEY_POINTS, LoroList::new())?;
    for point in points {
        let triple = points_list.insert_container(points_list.len(), LoroList::new())?;
        triple.push(point.x)?;
        triple.push(point.y)?;
        triple.push(point.pressure)?;
    }
    Ok(())
}

fn points_from_loro(map: &LoroMapValue) -> Vec<StrokePoint> {
    let Some(LoroValue::List(points_list)) = map.get(KEY_POINTS) else {
        return Vec::new();
    };
    points_list
        .iter()
        .filter_map(|p| {
            let LoroValue::List(coords) = p else {
                return None;
            };
            let x = as_f64(coords.first()?)?;
            let y = as_f64(coords.get(1)?)?;
            // Older records may lack pressure.
            let pressure = coords.get(2).and_then(as_f64).unwrap_or(0.5);
            Some(StrokePoint::new(x, y, pressure))
        })
        .collect()
}

/// Write every field of `layer` into `map`.
pub fn layer_to_loro(layer: &Layer, map: &LoroMap) -> LoroResult<()> {
    let bounds = layer.bounds();
    map.insert(KEY_TYPE, layer.kind().as_str())?;
    map.insert(KEY_X, bounds.x0)?;
    map.insert(KEY_Y, bounds.y0)?;
    map.insert(KEY_WIDTH, bounds.width())?;
    map.insert(KEY_HEIGHT, bounds.height())?;
    fill_to_loro(layer.fill(), map)?;

    match layer {
        Layer::Rectangle(_) | Layer::Ellipse(_) => {}
        Layer::Text(text) => {
            map.insert(KEY_VALUE, text.value.clone())?;
        }
        Layer::Note(note) => {
            map.insert(KEY_VALUE, note.value.clone())?;
        }
        Layer::Diagram(diagram) => {
            map.insert(KEY_SPEC, diagram.spec.clone())?;
        }
        Layer::Path(path) => {
            map.insert(KEY_STROKE_WIDTH, path.stroke_width)?;
            points_to_loro(&path.points, map)?;
        }
    }
    Ok(())
}

/// Write only the fields present in `patch` into `map`.
///
/// `kind` guards content fields, so a patch carrying `value` never adds one to a
/// Rectangle record.
pub fn patch_to_loro(patch: &LayerPatch, kind: LayerKind, map: &LoroMap) -> LoroResult<()> {
    if let Some(position) = patch.position {
        map.insert(KEY_X, position.x)?;
        map.insert(KEY_Y, position.y)?;
    }
    if let Some((width, height)) = patch.size {
        map.insert(KEY_WIDTH, width)?;
        map.insert(KEY_HEIGHT, height)?;
    }
    if let Some(fill) = patch.fill {
        fill_to_loro(fill, map)?;
    }
    match kind {
        LayerKind::Text | LayerKind::Note => {
            if let Some(value) = &patch.value {
                map.insert(KEY_VALUE, value.clone())?;
            }
        }
        LayerKind::Diagram => {
            if let Some(spec) = &patch.spec {
                map.insert(KEY_SPEC, spec.clone())?;
            }
        }
        LayerKind::Path => {
            if let Some(points) = &patch.points {
                points_to_loro(points, map)?;
            }
        }
        LayerKind::Rectangle | LayerKind::Ellipse => {}
    }
    Ok(())
}

/// Convert a Loro map value to a Layer.
pub fn layer_from_loro(map: &LoroMapValue) -> BackendResult<Layer> {
    let tag = get_string(map, KEY_TYPE).ok_or_else(|| BackendError::Conversion("missing `type`".into()))?;
    let kind = LayerKind::parse(&tag).ok_or_else(|| BackendError::Conversion(format!("unknown layer type `{tag}`")))?;

    let position = Point::new(require_double(map, KEY_X)?, require_double(map, KEY_Y)?);
    let width = require_double(map, KEY_WIDTH)?;
    let height = require_double(map, KEY_HEIGHT)?;
    let fill = Rgb::new(channel(map, KEY_FILL_R)?, channel(map, KEY_FILL_G)?, channel(map, KEY_FILL_B)?);

    let layer = match kind {
        LayerKind::Rectangle => Layer::Rectangle(Rectangle::new(position, width, height, fill)),
        LayerKind::Ellipse => Layer::Ellipse(Ellipse::new(position, width, height, fill)),
        LayerKind::Text => {
            let mut text = Text::new(position, width, height, fill);
            text.value = get_string(map, KEY_VALUE).unwrap_or_default();
            Layer::Text(text)
        }
        LayerKind::Note => {
            let mut note = Note::new(position, width, height, fill);
            note.value = get_string(map, KEY_VALUE).unwrap_or_default();
            Layer::Note(note)
        }
        LayerKind::Diagram => {
            let spec = get_string(map, KEY_SPEC).unwrap_or_default();
            Layer::Diagram(Diagram::new(position, width, height, fill, spec))
        }
        LayerKind::Path => {
            let stroke_width = require_double(map, KEY_STROKE_WIDTH)?;
            Layer::Path(Path::new(position, width, height, fill, points_from_loro(map), stroke_width))
        }
    };
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loro::LoroDoc;

    fn roundtrip(layer: &Layer) -> Layer {
        let doc = LoroDoc::new();
        let map = doc.get_map("layers").insert_container("id", LoroMap::new()).unwrap();
        layer_to_loro(layer, &map).unwrap();
        doc.commit();
        match map.get_deep_value() {
            LoroValue::Map(value) => layer_from_loro(&value).unwrap(),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_path_keeps_pressure() {
        let path = Layer::Path(Path::new(
            Point::new(10.0, 10.0),
            10.0,
            10.0,
            Rgb::new(1, 2, 3),
            vec![StrokePoint::new(0.0, 0.0, 0.2), StrokePoint::new(10.0, 10.0, 0.9)],
            8.0,
        ));
        assert_eq!(roundtrip(&path), path);
    }

    #[test]
    fn test_diagram_keeps_spec() {
        let diagram = Layer::Diagram(Diagram::new(Point::ZERO, 320.0, 240.0, Rgb::new(255, 255, 255), "graph TD"));
        assert_eq!(roundtrip(&diagram), diagram);
    }

    #[test]
    fn test_patch_writes_only_given_fields() {
        let doc = LoroDoc::new();
        let map = doc.get_map("layers").insert_container("id", LoroMap::new()).unwrap();
        let note = Layer::Note(Note::new(Point::new(5.0, 5.0), 100.0, 100.0, Rgb::new(10, 10, 10)));
        layer_to_loro(&note, &map).unwrap();

        patch_to_loro(&LayerPatch::value("hi"), LayerKind::Note, &map).unwrap();
        patch_to_loro(&LayerPatch::spec("ignored"), LayerKind::Note, &map).unwrap();
        doc.commit();

        let LoroValue::Map(value) = map.get_deep_value() else {
            panic!("expected map");
        };
        assert!(value.get(KEY_SPEC).is_none());
        let layer = layer_from_loro(&value).unwrap();
        assert_eq!(layer.value(), Some("hi"));
        assert_eq!(layer.position(), Point::new(5.0, 5.0));
    }

    #[test]
    fn test_malformed_record() {
        let doc = LoroDoc::new();
        let map = doc.get_map("layers").insert_container("id", LoroMap::new()).unwrap();
        map.insert(KEY_TYPE, "hexagon").unwrap();
        doc.commit();

        let LoroValue::Map(value) = map.get_deep_value() else {
            panic!("expected map");
        };
        assert!(matches!(layer_from_loro(&value), Err(BackendError::Conversion(_))));
    }
}
