//! Mapbox Vector Tile encoding.
//!
//! Features come in as a GeoJSON FeatureCollection in WGS84 and are written
//! to a single layer of a version 2 vector tile. The protobuf messages are
//! declared with `prost` derives, matching `vector_tile.proto`.

use std::collections::HashMap;

use prost::Message;
use serde_json::{Map, Value};

use crate::tiles::TileCoord;

/// Name of the single layer of result tiles.
pub const LAYER_NAME: &str = "results";

/// Resolution of tile coordinates.
pub const EXTENT: u32 = 4096;

/// Margin around the tile, in tile units, kept for shapes crossing the edge.
pub const BUFFER: i32 = 64;

const MOVE_TO: u32 = 1;
const LINE_TO: u32 = 2;
const CLOSE_PATH: u32 = 7;

/// `Tile` message.
#[derive(Clone, PartialEq, Message)]
pub struct Tile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

/// `Tile.Layer` message.
#[derive(Clone, PartialEq, Message)]
pub struct Layer {
    #[prost(uint32, required, tag = "15")]
    pub version: u32,
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<TileValue>,
    #[prost(uint32, optional, tag = "5")]
    pub extent: Option<u32>,
}

/// `Tile.Feature` message.
#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub tags: Vec<u32>,
    #[prost(enumeration = "GeomType", optional, tag = "3")]
    pub r#type: Option<i32>,
    #[prost(uint32, repeated, packed = "true", tag = "4")]
    pub geometry: Vec<u32>,
}

/// `Tile.Value` message.
#[derive(Clone, PartialEq, Message)]
pub struct TileValue {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}

/// `Tile.GeomType` enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    Linestring = 2,
    Polygon = 3,
}

/// Interns keys and values of one layer.
#[derive(Default)]
struct LayerBuilder {
    features: Vec<Feature>,
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<TileValue>,
    value_index: HashMap<String, u32>,
}

impl LayerBuilder {
    fn key(&mut self, key: &str) -> u32 {
        if let Some(i) = self.key_index.get(key) {
            return *i;
        }
        let i = self.keys.len() as u32;
        self.keys.push(key.to_string());
        self.key_index.insert(key.to_string(), i);
        i
    }

    fn value(&mut self, value: &Value) -> Option<u32> {
        let tile_value = match value {
            Value::Null => return None,
            Value::Bool(b) => TileValue {
                bool_value: Some(*b),
                ..Default::default()
            },
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) if i < 0 => TileValue {
                    sint_value: Some(i),
                    ..Default::default()
                },
                (Some(i), _) => TileValue {
                    uint_value: Some(i as u64),
                    ..Default::default()
                },
                (None, Some(f)) => TileValue {
                    double_value: Some(f),
                    ..Default::default()
                },
                (None, None) => return None,
            },
            Value::String(s) => TileValue {
                string_value: Some(s.clone()),
                ..Default::default()
            },
            Value::Array(_) | Value::Object(_) => TileValue {
                string_value: Some(value.to_string()),
                ..Default::default()
            },
        };
        // the JSON text of a value identifies it, numbers and strings never collide
        let identity = match value {
            Value::String(s) => format!("s:{}", s),
            other => format!("j:{}", other),
        };
        if let Some(i) = self.value_index.get(&identity) {
            return Some(*i);
        }
        let i = self.values.len() as u32;
        self.values.push(tile_value);
        self.value_index.insert(identity, i);
        Some(i)
    }

    fn tags(&mut self, properties: &Map<String, Value>) -> Vec<u32> {
        let mut tags = Vec::with_capacity(properties.len() * 2);
        for (key, value) in properties {
            if let Some(v) = self.value(value) {
                let k = self.key(key);
                tags.push(k);
                tags.push(v);
            }
        }
        tags
    }
}

/// Encodes a GeoJSON FeatureCollection as a vector tile.
///
/// Features without a supported geometry are skipped.
pub fn encode_tile(collection: &Value, tile: TileCoord) -> Vec<u8> {
    let mut layer = LayerBuilder::default();
    let features = collection
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for feature in features {
        let Some(geometry) = feature.get("geometry") else {
            continue;
        };
        let mut encoder = GeometryEncoder::new(tile);
        let Some(geom_type) = encoder.encode(geometry) else {
            continue;
        };
        if encoder.commands.is_empty() {
            continue;
        }
        let empty = Map::new();
        let properties = feature
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let tags = layer.tags(properties);
        layer.features.push(Feature {
            id: None,
            tags,
            r#type: Some(geom_type as i32),
            geometry: encoder.commands,
        });
    }

    let tile = Tile {
        layers: vec![Layer {
            version: 2,
            name: LAYER_NAME.to_string(),
            features: layer.features,
            keys: layer.keys,
            values: layer.values,
            extent: Some(EXTENT),
        }],
    };
    tile.encode_to_vec()
}

/// Decodes a vector tile, mostly useful to inspect encoded output.
pub fn decode_tile(bytes: &[u8]) -> Result<Tile, prost::DecodeError> {
    Tile::decode(bytes)
}

fn command(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

fn zigzag(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

type Point = (i32, i32);

/// Twice the signed area of a ring. Positive is clockwise with y pointing down.
fn signed_area(ring: &[Point]) -> i64 {
    let mut area = 0;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        area += i64::from(a.0) * i64::from(b.1) - i64::from(b.0) * i64::from(a.1);
    }
    area
}

struct GeometryEncoder {
    tile: TileCoord,
    cursor: Point,
    commands: Vec<u32>,
}

impl GeometryEncoder {
    fn new(tile: TileCoord) -> Self {
        Self {
            tile,
            cursor: (0, 0),
            commands: Vec::new(),
        }
    }

    fn encode(&mut self, geometry: &Value) -> Option<GeomType> {
        let coordinates = geometry.get("coordinates");
        match geometry.get("type").and_then(Value::as_str)? {
            "Point" => {
                let point = self.point(coordinates?);
                self.points(point.as_slice());
                Some(GeomType::Point)
            }
            "MultiPoint" => {
                let points: Vec<Point> = coordinates?
                    .as_array()?
                    .iter()
                    .filter_map(|p| self.point(p))
                    .collect();
                self.points(&points);
                Some(GeomType::Point)
            }
            "LineString" => {
                let line = self.line(coordinates?);
                self.path(&line, false);
                Some(GeomType::Linestring)
            }
            "MultiLineString" => {
                for line in coordinates?.as_array()? {
                    let line = self.line(line);
                    self.path(&line, false);
                }
                Some(GeomType::Linestring)
            }
            "Polygon" => {
                self.polygon(coordinates?.as_array()?);
                Some(GeomType::Polygon)
            }
            "MultiPolygon" => {
                for polygon in coordinates?.as_array()? {
                    self.polygon(polygon.as_array()?);
                }
                Some(GeomType::Polygon)
            }
            _ => None,
        }
    }

    fn projected(&self, value: &Value) -> Option<(i64, i64)> {
        let pair = value.as_array()?;
        let lon = pair.first()?.as_f64()?;
        let lat = pair.get(1)?.as_f64()?;
        Some(self.tile.project(lon, lat, EXTENT))
    }

    /// Projects a position, clamped to the buffered tile.
    fn position(&self, value: &Value) -> Option<Point> {
        let (x, y) = self.projected(value)?;
        let bound = |n: i64| {
            n.clamp(-i64::from(BUFFER), i64::from(EXTENT) + i64::from(BUFFER)) as i32
        };
        Some((bound(x), bound(y)))
    }

    /// Projects a point, or nothing when it falls outside the buffered tile.
    fn point(&self, value: &Value) -> Option<Point> {
        let (x, y) = self.projected(value)?;
        let range = -i64::from(BUFFER)..=i64::from(EXTENT) + i64::from(BUFFER);
        (range.contains(&x) && range.contains(&y)).then_some((x as i32, y as i32))
    }

    fn line(&self, value: &Value) -> Vec<Point> {
        let mut points: Vec<Point> = value
            .as_array()
            .map(|positions| positions.iter().filter_map(|p| self.position(p)).collect())
            .unwrap_or_default();
        points.dedup();
        points
    }

    fn ring(&self, value: &Value) -> Vec<Point> {
        let mut ring = self.line(value);
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        ring
    }

    /// Writes the exterior ring clockwise and holes counter-clockwise.
    /// Rings flattened by clamping are dropped, with the holes of a dropped
    /// exterior.
    fn polygon(&mut self, rings: &[Value]) {
        for (i, ring) in rings.iter().enumerate() {
            let mut ring = self.ring(ring);
            let area = signed_area(&ring);
            if area == 0 {
                if i == 0 {
                    return;
                }
                continue;
            }
            if (i == 0) != (area > 0) {
                ring.reverse();
            }
            self.path(&ring, true);
        }
    }

    fn delta(&mut self, point: Point) {
        self.commands.push(zigzag(point.0 - self.cursor.0));
        self.commands.push(zigzag(point.1 - self.cursor.1));
        self.cursor = point;
    }

    fn points(&mut self, points: &[Point]) {
        if points.is_empty() {
            return;
        }
        self.commands.push(command(MOVE_TO, points.len() as u32));
        for point in points {
            self.delta(*point);
        }
    }

    fn path(&mut self, points: &[Point], close: bool) {
        let minimum = if close { 3 } else { 2 };
        if points.len() < minimum {
            return;
        }
        self.commands.push(command(MOVE_TO, 1));
        self.delta(points[0]);
        self.commands.push(command(LINE_TO, (points.len() - 1) as u32));
        for point in &points[1..] {
            self.delta(*point);
        }
        if close {
            self.commands.push(command(CLOSE_PATH, 1));
        }
    }
}
