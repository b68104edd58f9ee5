//! Static arena geometry: map descriptors, boundary walls and wire serialization

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::util::vec2::Vec2;

const WALL_COLOR: &str = "gray";
const DEFAULT_STROKE_COLOR: &str = "#000000";

/// Map loading errors
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid map descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Map dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: f32, height: f32 },
}

/// Map descriptor as produced by the map editor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDescriptor {
    pub name: String,
    pub width: f32,
    pub height: f32,
    #[serde(default, alias = "wall_width")]
    pub wall_width: f32,
    /// Objects are parsed one by one so a bad entry never rejects the map
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
}

/// Rectangle fields, either flat on the object or nested under `properties`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RectangleFields {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_fill")]
    fill_color: String,
    #[serde(default = "default_stroke")]
    stroke_color: String,
    #[serde(default)]
    stroke_width: f32,
}

fn default_fill() -> String {
    WALL_COLOR.to_string()
}

fn default_stroke() -> String {
    DEFAULT_STROKE_COLOR.to_string()
}

/// Axis-aligned rectangle rotated about its center
#[derive(Debug, Clone, PartialEq)]
pub struct RectangleObject {
    /// Center position
    pub position: Vec2,
    /// Full width and height
    pub size: Vec2,
    /// Rotation in radians
    pub rotation: f32,
    pub fill_color: String,
    pub stroke_color: String,
    pub stroke_width: f32,
}

impl RectangleObject {
    fn wall(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            size,
            rotation: 0.0,
            fill_color: WALL_COLOR.to_string(),
            stroke_color: DEFAULT_STROKE_COLOR.to_string(),
            stroke_width: 0.0,
        }
    }
}

/// Immutable piece of static geometry
#[derive(Debug, Clone, PartialEq)]
pub enum MapObject {
    Rectangle(RectangleObject),
}

/// Wire form of a map object for the `map` message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapObjectData {
    #[serde(rename_all = "camelCase")]
    Rectangle {
        x: f32,
        y: f32,
        angle: f32,
        width: f32,
        height: f32,
        color: String,
        stroke_color: String,
        stroke_width: f32,
    },
}

impl MapObject {
    /// Parse one descriptor entry; `None` for unknown type tags or malformed fields
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let kind = value.get("type").and_then(|t| t.as_str())?;
        match kind {
            "RectangleMapObject" | "rectangle" => {
                let fields = value.get("properties").unwrap_or(value);
                let rect: RectangleFields = match serde_json::from_value(fields.clone()) {
                    Ok(rect) => rect,
                    Err(e) => {
                        debug!(error = %e, "Skipping malformed rectangle");
                        return None;
                    }
                };
                Some(MapObject::Rectangle(RectangleObject {
                    position: Vec2::new(rect.x, rect.y),
                    size: Vec2::new(rect.width, rect.height),
                    rotation: rect.rotation,
                    fill_color: rect.fill_color,
                    stroke_color: rect.stroke_color,
                    stroke_width: rect.stroke_width,
                }))
            }
            other => {
                debug!(kind = other, "Skipping unrecognized map object");
                None
            }
        }
    }

    pub fn to_data(&self) -> MapObjectData {
        match self {
            MapObject::Rectangle(rect) => MapObjectData::Rectangle {
                x: rect.position.x,
                y: rect.position.y,
                angle: rect.rotation,
                width: rect.size.x,
                height: rect.size.y,
                color: rect.fill_color.clone(),
                stroke_color: rect.stroke_color.clone(),
                stroke_width: rect.stroke_width,
            },
        }
    }
}

/// Loaded arena: dimensions plus geometry, boundary walls first
#[derive(Debug, Clone)]
pub struct Map {
    pub name: String,
    pub width: f32,
    pub height: f32,
    pub wall_width: f32,
    objects: Vec<MapObject>,
}

impl Map {
    /// Map with only the boundary walls
    pub fn empty(width: f32, height: f32, wall_width: f32) -> Result<Self, MapError> {
        Self::from_descriptor(MapDescriptor {
            name: "default".to_string(),
            width,
            height,
            wall_width,
            objects: Vec::new(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, MapError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, MapError> {
        let descriptor: MapDescriptor = serde_json::from_str(raw)?;
        Self::from_descriptor(descriptor)
    }

    pub fn from_descriptor(descriptor: MapDescriptor) -> Result<Self, MapError> {
        let (width, height) = (descriptor.width, descriptor.height);
        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            return Err(MapError::InvalidDimensions { width, height });
        }
        let wall = descriptor.wall_width.max(0.0);

        let mut objects = vec![
            // top, bottom, left, right
            MapObject::Rectangle(RectangleObject::wall(
                Vec2::new(width / 2.0, 0.0),
                Vec2::new(width, wall),
            )),
            MapObject::Rectangle(RectangleObject::wall(
                Vec2::new(width / 2.0, height),
                Vec2::new(width, wall),
            )),
            MapObject::Rectangle(RectangleObject::wall(
                Vec2::new(0.0, height / 2.0),
                Vec2::new(wall, height),
            )),
            MapObject::Rectangle(RectangleObject::wall(
                Vec2::new(width, height / 2.0),
                Vec2::new(wall, height),
            )),
        ];
        let declared = descriptor.objects.len();
        objects.extend(descriptor.objects.iter().filter_map(MapObject::from_value));

        info!(
            map = %descriptor.name,
            width,
            height,
            loaded = objects.len() - 4,
            skipped = declared - (objects.len() - 4),
            "Map loaded"
        );

        Ok(Self {
            name: descriptor.name,
            width,
            height,
            wall_width: wall,
            objects,
        })
    }

    pub fn objects(&self) -> &[MapObject] {
        &self.objects
    }

    pub fn serialize_objects(&self) -> Vec<MapObjectData> {
        self.objects.iter().map(MapObject::to_data).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "name": "courtyard",
        "width": 1000,
        "height": 500,
        "wallWidth": 20,
        "objects": [
            {
                "type": "RectangleMapObject",
                "properties": {
                    "x": 300, "y": 200, "width": 100, "height": 40,
                    "rotation": 0.5, "fillColor": "#ff0000",
                    "strokeColor": "#00ff00", "strokeWidth": 3
                }
            },
            { "type": "rectangle", "x": 10, "y": 20, "width": 5, "height": 6 },
            { "type": "CircleMapObject", "properties": { "x": 1, "y": 1, "radius": 4 } },
            { "type": "RectangleMapObject", "properties": { "x": "oops" } },
            { "no_type": true }
        ]
    }"##;

    #[test]
    fn test_walls_come_first() {
        let map = Map::empty(1000.0, 500.0, 20.0).unwrap();
        assert_eq!(map.objects().len(), 4);
        let MapObject::Rectangle(top) = &map.objects()[0];
        assert_eq!(top.position, Vec2::new(500.0, 0.0));
        assert_eq!(top.size, Vec2::new(1000.0, 20.0));
        let MapObject::Rectangle(right) = &map.objects()[3];
        assert_eq!(right.position, Vec2::new(1000.0, 250.0));
        assert_eq!(right.size, Vec2::new(20.0, 500.0));
    }

    #[test]
    fn test_unknown_and_malformed_objects_are_skipped() {
        let map = Map::from_json(SAMPLE).unwrap();
        assert_eq!(map.name, "courtyard");
        assert_eq!(map.objects().len(), 6);

        let MapObject::Rectangle(rect) = &map.objects()[4];
        assert_eq!(rect.position, Vec2::new(300.0, 200.0));
        assert_eq!(rect.size, Vec2::new(100.0, 40.0));
        assert_eq!(rect.rotation, 0.5);
        assert_eq!(rect.fill_color, "#ff0000");
        assert_eq!(rect.stroke_width, 3.0);

        let MapObject::Rectangle(flat) = &map.objects()[5];
        assert_eq!(flat.stroke_color, DEFAULT_STROKE_COLOR);
        assert_eq!(flat.rotation, 0.0);
    }

    #[test]
    fn test_serialized_rectangle_shape() {
        let map = Map::from_json(SAMPLE).unwrap();
        let data = map.serialize_objects();
        let json = serde_json::to_value(&data[4]).unwrap();
        assert_eq!(json["type"], "rectangle");
        assert_eq!(json["x"], 300.0);
        assert_eq!(json["angle"], 0.5);
        assert_eq!(json["color"], "#ff0000");
        assert_eq!(json["strokeColor"], "#00ff00");
        assert_eq!(json["strokeWidth"], 3.0);
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert!(matches!(
            Map::empty(0.0, 100.0, 10.0),
            Err(MapError::InvalidDimensions { .. })
        ));
        assert!(matches!(Map::from_json("{"), Err(MapError::Json(_))));
    }
}
