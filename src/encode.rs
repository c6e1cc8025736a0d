//! Mapbox Vector Tile serialization.
//!
//! Geometries arrive already clipped and scaled into tile space, so this is
//! purely structural: layer framing, tag interning and command encoding.

use crate::error::Error;

use geo_types::{Coord, Geometry, LineString, Polygon};
use mvt::{Feature, GeomData, GeomEncoder, GeomType, Tile};
use pointy::Transform;
use serde_json::{Map, Value};

/// Layer holding the clipped geometries.
pub const FEATURES_LAYER: &str = "features";

/// Layer holding one label point per feature.
pub const LABELS_LAYER: &str = "labels";

/// One row destined for a tile layer.
#[derive(Clone, Debug, PartialEq)]
pub struct TileFeature {
    pub id: Option<u64>,
    /// Tile-local coordinates.
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

/// Encodes both layers into a single tile.
///
/// Layers without features are left out. When neither layer has any the
/// result is empty, which decodes as a tile without features.
pub fn encode_tile(
    features: &[TileFeature],
    labels: &[TileFeature],
    extent: u32,
) -> Result<Vec<u8>, Error> {
    let layers = [
        (FEATURES_LAYER, encode_rows(features)?),
        (LABELS_LAYER, encode_rows(labels)?),
    ];

    if layers.iter().all(|(_, rows)| rows.is_empty()) {
        return Ok(Vec::new());
    }

    let mut tile = Tile::new(extent);
    for (name, rows) in layers {
        if rows.is_empty() {
            continue;
        }

        let mut layer = tile.create_layer(name);
        for (geometry, row) in rows {
            let mut feature = layer.into_feature(geometry);
            if let Some(id) = row.id {
                feature.set_id(id);
            }
            for (key, value) in row.properties.iter() {
                add_tag(&mut feature, key, value);
            }
            layer = feature.into_layer();
        }

        tile.add_layer(layer)?;
    }

    Ok(tile.to_bytes()?)
}

// Rows whose geometry yields no drawing commands are dropped here.
fn encode_rows(rows: &[TileFeature]) -> Result<Vec<(GeomData, &TileFeature)>, Error> {
    let mut encoded = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(geometry) = encode_geometry(&row.geometry)? {
            encoded.push((geometry, row));
        }
    }

    Ok(encoded)
}

fn add_tag(feature: &mut Feature, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => feature.add_tag_bool(key, *b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                feature.add_tag_uint(key, u);
            } else if let Some(i) = n.as_i64() {
                feature.add_tag_sint(key, i);
            } else if let Some(f) = n.as_f64() {
                feature.add_tag_double(key, f);
            }
        }
        Value::String(s) => feature.add_tag_string(key, s),
        // Nested values are carried as their JSON text
        other => feature.add_tag_string(key, &other.to_string()),
    }
}

fn encode_geometry(geometry: &Geometry<f64>) -> Result<Option<GeomData>, Error> {
    match geometry {
        Geometry::Point(point) => encode_points(std::iter::once(point.0)),
        Geometry::MultiPoint(points) => encode_points(points.0.iter().map(|p| p.0)),
        Geometry::LineString(line) => encode_lines(std::iter::once(line)),
        Geometry::MultiLineString(lines) => encode_lines(lines.0.iter()),
        Geometry::Line(line) => {
            let line = LineString::from(vec![line.start, line.end]);
            encode_lines(std::iter::once(&line))
        }
        Geometry::Polygon(polygon) => encode_polygons(std::iter::once(polygon)),
        Geometry::MultiPolygon(polygons) => encode_polygons(polygons.0.iter()),
        Geometry::Rect(rect) => encode_polygons(std::iter::once(&rect.to_polygon())),
        Geometry::Triangle(triangle) => encode_polygons(std::iter::once(&triangle.to_polygon())),
        // ST_AsMVTGeom never hands back collections
        _ => Ok(None),
    }
}

fn encode_points<I>(coords: I) -> Result<Option<GeomData>, Error>
where
    I: Iterator<Item = Coord<f64>>,
{
    let mut encoder = GeomEncoder::new(GeomType::Point, Transform::default());
    let mut count = 0;
    for coord in coords {
        encoder = encoder.point(coord.x, coord.y)?;
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }

    Ok(Some(encoder.encode()?))
}

fn encode_lines<'a, I>(lines: I) -> Result<Option<GeomData>, Error>
where
    I: Iterator<Item = &'a LineString<f64>>,
{
    let mut encoder = GeomEncoder::new(GeomType::Linestring, Transform::default());
    let mut count = 0;
    for line in lines.filter(|line| line.0.len() >= 2) {
        for coord in line.0.iter() {
            encoder = encoder.point(coord.x, coord.y)?;
        }
        encoder = encoder.complete()?;
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }

    Ok(Some(encoder.encode()?))
}

fn encode_polygons<'a, I>(polygons: I) -> Result<Option<GeomData>, Error>
where
    I: Iterator<Item = &'a Polygon<f64>>,
{
    let mut encoder = GeomEncoder::new(GeomType::Polygon, Transform::default());
    let mut count = 0;
    for polygon in polygons {
        let exterior = open_ring(polygon.exterior());
        if exterior.len() < 3 {
            continue;
        }

        for ring in std::iter::once(exterior).chain(polygon.interiors().iter().map(open_ring)) {
            if ring.len() < 3 {
                continue;
            }
            for coord in ring {
                encoder = encoder.point(coord.x, coord.y)?;
            }
            encoder = encoder.complete()?;
        }
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }

    Ok(Some(encoder.encode()?))
}

// MVT closes rings with ClosePath, so the repeated first vertex is dropped.
fn open_ring(ring: &LineString<f64>) -> &[Coord<f64>] {
    let coords = ring.0.as_slice();
    match (coords.first(), coords.last()) {
        (Some(first), Some(last)) if coords.len() > 1 && first == last => {
            &coords[..coords.len() - 1]
        }
        _ => coords,
    }
}

#[cfg(test)]
mod tests {
    use geo_types::{line_string, point, polygon, GeometryCollection};
    use serde_json::json;

    use super::*;
    use crate::decode::{decode_tile, Layer, VectorTile};

    fn feature(id: Option<u64>, geometry: Geometry<f64>, properties: Value) -> TileFeature {
        TileFeature {
            id,
            geometry,
            properties: properties.as_object().cloned().unwrap_or_default(),
        }
    }

    fn decode(data: &[u8]) -> VectorTile {
        decode_tile(data).expect("tile should decode")
    }

    fn layer<'a>(tile: &'a VectorTile, name: &str) -> Option<&'a Layer> {
        tile.layer(name)
    }

    #[test]
    fn test_empty_tile() {
        let data = encode_tile(&[], &[], 4096).unwrap();
        assert_eq!(0, data.len());

        // Zero features in either layer, not a decode error
        let tile = decode(&data);
        assert_eq!(0, layer(&tile, FEATURES_LAYER).map_or(0, |l| l.features.len()));
        assert_eq!(0, layer(&tile, LABELS_LAYER).map_or(0, |l| l.features.len()));
    }

    #[test]
    fn test_point_layers() {
        let park = feature(
            Some(42),
            Geometry::Point(point!(x: 100.0, y: 200.0)),
            json!({"name": "Hyde Park"}),
        );

        let data = encode_tile(&[park.clone()], &[park], 4096).unwrap();
        let tile = decode(&data);
        assert_eq!(2, tile.layers.len());

        for name in [FEATURES_LAYER, LABELS_LAYER] {
            let layer = layer(&tile, name).expect("layer should exist");
            assert_eq!(1, layer.features.len());

            let feature = &layer.features[0];
            assert_eq!(Some(42), feature.id);
            assert_eq!(Some(1), feature.geom_type);
            // MoveTo(1), zigzag(100), zigzag(200)
            assert_eq!(vec![9, 200, 400], feature.geometry);

            assert_eq!(vec![String::from("name")], layer.keys);
            assert_eq!(Some(String::from("Hyde Park")), layer.values[0].string_value);
        }
    }

    #[test]
    fn test_polygon_commands() {
        let square = feature(
            None,
            Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ]),
            json!({}),
        );

        let tile = decode(&encode_tile(&[square], &[], 4096).unwrap());
        assert!(layer(&tile, LABELS_LAYER).is_none());

        let feature = &layer(&tile, FEATURES_LAYER).unwrap().features[0];
        assert_eq!(Some(3), feature.geom_type);
        // MoveTo(1) + x,y, LineTo(3) + 3 pairs, ClosePath(1)
        assert_eq!(11, feature.geometry.len());
        assert_eq!(9, feature.geometry[0]);
        assert_eq!((3 << 3) | 2, feature.geometry[3]);
        assert_eq!(15, feature.geometry[10]);
    }

    #[test]
    fn test_line_commands() {
        let road = feature(
            Some(3),
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 5.0), (x: 10.0, y: 0.0)]),
            json!({}),
        );

        let tile = decode(&encode_tile(&[road], &[], 4096).unwrap());
        let feature = &layer(&tile, FEATURES_LAYER).unwrap().features[0];
        assert_eq!(Some(2), feature.geom_type);
        assert_eq!(vec![9, 0, 0, (2 << 3) | 2, 10, 10, 10, 9], feature.geometry);
    }

    #[test]
    fn test_attribute_interning() {
        let rows = vec![
            feature(Some(1), Geometry::Point(point!(x: 1.0, y: 1.0)), json!({"kind": "park"})),
            feature(Some(2), Geometry::Point(point!(x: 2.0, y: 2.0)), json!({"kind": "park"})),
            feature(Some(3), Geometry::Point(point!(x: 3.0, y: 3.0)), json!({"kind": "school"})),
        ];

        let tile = decode(&encode_tile(&rows, &[], 4096).unwrap());
        let layer = layer(&tile, FEATURES_LAYER).unwrap();
        assert_eq!(3, layer.features.len());
        assert_eq!(1, layer.keys.len());
        assert_eq!(2, layer.values.len());
        assert_eq!(layer.features[0].tags, layer.features[1].tags);
        assert_ne!(layer.features[0].tags, layer.features[2].tags);
    }

    #[test]
    fn test_attribute_types() {
        let row = feature(
            None,
            Geometry::Point(point!(x: 1.0, y: 1.0)),
            json!({
                "area": 12.5,
                "count": 3,
                "delta": -4,
                "note": null,
                "public": true,
                "tags": ["a", "b"],
            }),
        );

        let tile = decode(&encode_tile(&[row], &[], 4096).unwrap());
        let layer = layer(&tile, FEATURES_LAYER).unwrap();

        // Nulls are dropped
        assert_eq!(5, layer.keys.len());
        assert!(!layer.keys.contains(&String::from("note")));

        let value_of = |key: &str| {
            let feature = &layer.features[0];
            let position = layer.keys.iter().position(|k| k == key).unwrap() as u32;
            let pair = feature.tags.chunks(2).find(|pair| pair[0] == position).unwrap();
            layer.values[pair[1] as usize].clone()
        };

        assert_eq!(Some(12.5), value_of("area").double_value);
        assert_eq!(Some(3), value_of("count").uint_value);
        assert_eq!(Some(-4), value_of("delta").sint_value);
        assert_eq!(Some(true), value_of("public").bool_value);
        assert_eq!(Some(String::from("[\"a\",\"b\"]")), value_of("tags").string_value);
    }

    #[test]
    fn test_skips_empty_geometry() {
        let nothing = feature(
            Some(1),
            Geometry::GeometryCollection(GeometryCollection(Vec::new())),
            json!({"name": "nothing"}),
        );
        let sliver = feature(
            Some(2),
            Geometry::LineString(line_string![(x: 1.0, y: 1.0)]),
            json!({}),
        );

        let data = encode_tile(&[nothing, sliver], &[], 4096).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_deterministic_output() {
        let rows = vec![
            feature(Some(1), Geometry::Point(point!(x: 10.0, y: 20.0)), json!({"b": 1, "a": "x"})),
            feature(Some(2), Geometry::Point(point!(x: 30.0, y: 40.0)), json!({"a": "y"})),
        ];

        let first = encode_tile(&rows, &rows, 4096).unwrap();
        let second = encode_tile(&rows, &rows, 4096).unwrap();
        assert_eq!(first, second);
    }
}
