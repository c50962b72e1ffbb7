//! Query geometry parsing and the point-in-polygon predicate.
//!
//! Selections arrive as GeoJSON: a `Polygon`, a `MultiPolygon`, or a
//! `Feature` wrapping one. Positions are `[lon, lat]`. A missing `type` is
//! inferred from the nesting depth of `coordinates`.
//!
//! # Boundary policy
//!
//! A point exactly on a ring's edge or vertex belongs to that ring's closed
//! region. Points on the outer boundary therefore match, and points on a
//! hole's boundary do not. The on-edge test is an exact cross-product check,
//! evaluated before the ray crossing, so the outcome never depends on which
//! way the crossing arithmetic rounds.

use crate::error::{Result, SpatialError};
use geo::BoundingRect;
use geo_types::{Coord, LineString, MultiPolygon, Polygon, Rect};
use serde_json::Value;

/// Where a point lies relative to one closed ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingPosition {
    Inside,
    Boundary,
    Outside,
}

/// Even-odd ray casting with an exact boundary check.
pub fn ring_position(ring: &LineString<f64>, p: Coord<f64>) -> RingPosition {
    let mut inside = false;
    for line in ring.lines() {
        let (a, b) = (line.start, line.end);
        if on_segment(a, b, p) {
            return RingPosition::Boundary;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    if inside {
        RingPosition::Inside
    } else {
        RingPosition::Outside
    }
}

fn on_segment(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    cross == 0.0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Inside (or on) the exterior and strictly outside every hole.
pub fn polygon_contains(polygon: &Polygon<f64>, p: Coord<f64>) -> bool {
    if ring_position(polygon.exterior(), p) == RingPosition::Outside {
        return false;
    }
    polygon
        .interiors()
        .iter()
        .all(|hole| ring_position(hole, p) == RingPosition::Outside)
}

/// A validated selection polygon with its bounding box.
#[derive(Debug, Clone)]
pub struct SelectionShape {
    polygons: MultiPolygon<f64>,
    bounds: Option<Rect<f64>>,
}

impl SelectionShape {
    pub fn new(polygons: MultiPolygon<f64>) -> Self {
        let bounds = polygons.bounding_rect();
        Self { polygons, bounds }
    }

    /// Parse a GeoJSON selection. `Ok(None)` means "nothing selected".
    pub fn from_geojson(value: &Value) -> Result<Option<Self>> {
        Ok(parse_geojson(value)?.map(Self::new))
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// Cheap rejection test against the bounding box (inclusive).
    pub fn bbox_may_contain(&self, lon: f64, lat: f64) -> bool {
        self.bounds.is_some_and(|r| {
            lon >= r.min().x && lon <= r.max().x && lat >= r.min().y && lat <= r.max().y
        })
    }

    /// Whether `(lon, lat)` is selected by any part.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let p = Coord { x: lon, y: lat };
        self.polygons.0.iter().any(|poly| polygon_contains(poly, p))
    }
}

/// Parse a GeoJSON selection into polygons. `Ok(None)` for null or empty coordinates.
pub fn parse_geojson(value: &Value) -> Result<Option<MultiPolygon<f64>>> {
    let object = match value {
        Value::Null => return Ok(None),
        Value::Object(object) => object,
        other => {
            return Err(SpatialError::invalid(format!(
                "geometry must be an object, got {}",
                json_kind(other)
            )))
        }
    };

    let kind = match object.get("type") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            return Err(SpatialError::invalid(format!(
                "geometry type must be a string, got {}",
                json_kind(other)
            )))
        }
    };

    if kind == Some("Feature") {
        return parse_geojson(object.get("geometry").unwrap_or(&Value::Null));
    }

    let coordinates = match object.get("coordinates") {
        Some(Value::Array(items)) if items.is_empty() => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(SpatialError::invalid(format!(
                "coordinates must be an array, got {}",
                json_kind(other)
            )))
        }
        None => return Err(SpatialError::invalid("geometry has no coordinates")),
    };

    let kind = match kind {
        Some(kind) => kind,
        None if is_multipolygon_depth(coordinates) => "MultiPolygon",
        None => "Polygon",
    };

    match kind {
        "Polygon" => Ok(Some(MultiPolygon::new(vec![parse_polygon(coordinates)?]))),
        "MultiPolygon" => {
            let polygons = coordinates
                .iter()
                .enumerate()
                .map(|(i, part)| {
                    let rings = part.as_array().ok_or_else(|| {
                        SpatialError::invalid(format!("polygon {i} must be an array of rings"))
                    })?;
                    parse_polygon(rings)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(MultiPolygon::new(polygons)))
        }
        other => Err(SpatialError::invalid(format!(
            "unsupported geometry type {other:?}: expected Polygon or MultiPolygon"
        ))),
    }
}

/// `[[[[x, y], ...]]]` nests one level deeper than a polygon.
fn is_multipolygon_depth(coordinates: &[Value]) -> bool {
    coordinates
        .first()
        .and_then(Value::as_array)
        .and_then(|ring| ring.first())
        .and_then(Value::as_array)
        .and_then(|pos| pos.first())
        .is_some_and(Value::is_array)
}

fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>>>()?
        .into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| SpatialError::invalid("polygon has no rings"))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    let positions = value
        .as_array()
        .ok_or_else(|| SpatialError::invalid("ring must be an array of positions"))?;
    let coords = positions
        .iter()
        .map(parse_position)
        .collect::<Result<Vec<_>>>()?;

    let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in &coords {
        if !distinct.contains(c) {
            distinct.push(*c);
        }
    }
    if distinct.len() < 3 {
        return Err(SpatialError::invalid(format!(
            "ring needs at least 3 distinct vertices, got {}",
            distinct.len()
        )));
    }
    Ok(LineString::new(coords))
}

fn parse_position(value: &Value) -> Result<Coord<f64>> {
    let invalid = || SpatialError::invalid(format!("invalid position {value}"));
    let items = value.as_array().ok_or_else(invalid)?;
    if items.len() < 2 {
        return Err(invalid());
    }
    let x = items[0].as_f64().filter(|v| v.is_finite()).ok_or_else(invalid)?;
    let y = items[1].as_f64().filter(|v| v.is_finite()).ok_or_else(invalid)?;
    Ok(Coord { x, y })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
