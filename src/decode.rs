//! Reading encoded tiles back.
//!
//! Only the parts of the vector tile schema this crate writes are declared.
//! Geometry stays as raw command integers.

use crate::error::Error;

use prost::Message;
use serde_json::{Map, Number, Value};

#[derive(Clone, PartialEq, Message)]
pub struct VectorTile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

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
    pub values: Vec<TagValue>,
    #[prost(uint32, optional, tag = "5")]
    pub extent: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    /// Alternating key and value indices into the layer tables.
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub tags: Vec<u32>,
    /// 1 point, 2 linestring, 3 polygon.
    #[prost(int32, optional, tag = "3")]
    pub geom_type: Option<i32>,
    #[prost(uint32, repeated, packed = "true", tag = "4")]
    pub geometry: Vec<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TagValue {
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

/// Parses an encoded tile. Zero bytes parse as a tile without layers.
pub fn decode_tile(data: &[u8]) -> Result<VectorTile, Error> {
    Ok(VectorTile::decode(data)?)
}

impl VectorTile {
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }
}

impl Layer {
    /// The attributes of `feature` as a JSON object.
    ///
    /// Tags pointing outside the key or value tables are skipped.
    pub fn properties(&self, feature: &Feature) -> Map<String, Value> {
        feature
            .tags
            .chunks_exact(2)
            .filter_map(|pair| {
                let key = self.keys.get(pair[0] as usize)?;
                let value = self.values.get(pair[1] as usize)?;
                Some((key.clone(), value.to_json()))
            })
            .collect()
    }
}

impl TagValue {
    pub fn to_json(&self) -> Value {
        if let Some(s) = &self.string_value {
            Value::String(s.clone())
        } else if let Some(b) = self.bool_value {
            Value::Bool(b)
        } else if let Some(u) = self.uint_value {
            Value::from(u)
        } else if let Some(i) = self.sint_value.or(self.int_value) {
            Value::from(i)
        } else if let Some(d) = self.double_value {
            Number::from_f64(d).map_or(Value::Null, Value::Number)
        } else if let Some(f) = self.float_value {
            Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number)
        } else {
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_tile() {
        let tile = decode_tile(&[]).unwrap();
        assert_eq!(0, tile.layers.len());
        assert!(tile.layer("features").is_none());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_tile(&[0xff, 0xff, 0xff]), Err(Error::Decode(_))));
    }

    #[test]
    fn test_properties() {
        let layer = Layer {
            version: 2,
            name: String::from("features"),
            features: Vec::new(),
            keys: vec![String::from("name"), String::from("area")],
            values: vec![
                TagValue {
                    string_value: Some(String::from("Lambeth")),
                    ..TagValue::default()
                },
                TagValue {
                    double_value: Some(12.5),
                    ..TagValue::default()
                },
            ],
            extent: Some(4096),
        };
        let feature = Feature {
            id: Some(1),
            tags: vec![0, 0, 1, 1, 7, 0],
            geom_type: Some(1),
            geometry: vec![9, 2, 2],
        };

        let properties = layer.properties(&feature);
        assert_eq!(2, properties.len());
        assert_eq!(Some(&Value::from("Lambeth")), properties.get("name"));
        assert_eq!(Some(&Value::from(12.5)), properties.get("area"));
    }
}
