//! Array codec: walks a [`Value`] tree and converts embedded arrays to and
//! from their self-describing wire form.
//!
//! An array travels as a JSON object with exactly three keys:
//!
//! ```text
//! { "dtype": "float32", "shape": [512, 512], "data": "<base64 LE bytes>" }
//! ```
//!
//! On decode, `data` may also be a nested JSON list of numbers; it is
//! flattened in C order and converted to `dtype`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::{Map, Number};

use crate::array::{element_count, DType, NdArray};
use crate::error::{FrameError, Result};
use crate::value::Value;

const DTYPE_KEY: &str = "dtype";
const SHAPE_KEY: &str = "shape";
const DATA_KEY: &str = "data";

/// Encode a value tree into JSON, packing every embedded array.
///
/// Non-finite scalar floats have no JSON representation and are encoded as
/// `null`; inside arrays they are preserved bit-exactly.
pub fn pack(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Seq(items) => serde_json::Value::Array(items.iter().map(pack).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), pack(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(array) => pack_array(array),
    }
}

/// Decode JSON into a value tree, unpacking every embedded array.
pub fn unpack(json: serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Seq(items.into_iter().map(unpack).collect::<Result<_>>()?)
        }
        serde_json::Value::Object(map) => {
            if is_packed_array(&map) {
                Value::Array(unpack_array(map)?)
            } else {
                Value::Map(
                    map.into_iter()
                        .map(|(k, v)| Ok((k, unpack(v)?)))
                        .collect::<Result<BTreeMap<_, _>>>()?,
                )
            }
        }
    })
}

fn pack_array(array: &NdArray) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(
        DTYPE_KEY.to_string(),
        serde_json::Value::String(array.dtype().name().to_string()),
    );
    map.insert(
        SHAPE_KEY.to_string(),
        serde_json::Value::Array(
            array
                .shape()
                .iter()
                .map(|d| serde_json::Value::Number((*d as u64).into()))
                .collect(),
        ),
    );
    map.insert(
        DATA_KEY.to_string(),
        serde_json::Value::String(STANDARD.encode(array.data())),
    );
    serde_json::Value::Object(map)
}

fn is_packed_array(map: &Map<String, serde_json::Value>) -> bool {
    map.len() == 3
        && map.get(DTYPE_KEY).is_some_and(serde_json::Value::is_string)
        && map.get(SHAPE_KEY).is_some_and(serde_json::Value::is_array)
        && map.contains_key(DATA_KEY)
}

fn unpack_array(mut map: Map<String, serde_json::Value>) -> Result<NdArray> {
    let dtype_name = map
        .get(DTYPE_KEY)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let dtype = DType::from_name(dtype_name)
        .ok_or_else(|| FrameError::InvalidArray(format!("unknown dtype '{dtype_name}'")))?;

    let shape = map
        .get(SHAPE_KEY)
        .and_then(serde_json::Value::as_array)
        .map(|dims| {
            dims.iter()
                .map(|d| {
                    d.as_u64().map(|d| d as usize).ok_or_else(|| {
                        FrameError::InvalidArray(format!("invalid shape dimension {d}"))
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    match map.remove(DATA_KEY) {
        Some(serde_json::Value::String(encoded)) => {
            let raw = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|err| FrameError::InvalidArray(format!("bad base64 data: {err}")))?;
            NdArray::new(dtype, shape, Bytes::from(raw))
        }
        Some(nested @ serde_json::Value::Array(_)) => {
            let expected = element_count(&shape)?;
            let mut flat = Vec::new();
            flatten_numbers(&nested, &mut flat)?;
            if flat.len() != expected {
                return Err(FrameError::InvalidArray(format!(
                    "shape {shape:?} needs {expected} elements, got {}",
                    flat.len()
                )));
            }
            NdArray::from_numbers(dtype, shape, &flat)
        }
        _ => Err(FrameError::InvalidArray(
            "array data must be a base64 string or a nested list".to_string(),
        )),
    }
}

fn flatten_numbers(json: &serde_json::Value, out: &mut Vec<f64>) -> Result<()> {
    match json {
        serde_json::Value::Array(items) => items
            .iter()
            .try_for_each(|item| flatten_numbers(item, out)),
        serde_json::Value::Number(n) => {
            out.push(n.as_f64().unwrap_or(f64::NAN));
            Ok(())
        }
        serde_json::Value::Bool(b) => {
            out.push(if *b { 1.0 } else { 0.0 });
            Ok(())
        }
        serde_json::Value::Null => {
            out.push(f64::NAN);
            Ok(())
        }
        other => Err(FrameError::InvalidArray(format!(
            "non-numeric array element {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn arrays_nested_in_maps_and_sequences_are_packed() {
        let plane = NdArray::from_f32(vec![2, 2], &[1.0, 2.0, 3.0, f32::NAN]).unwrap();
        let value = Value::map([
            ("action", Value::from("plane")),
            ("layers", Value::Seq(vec![Value::Array(plane.clone())])),
        ]);

        let json = pack(&value);
        assert_eq!(json["layers"][0]["dtype"], "float32");
        assert_eq!(json["layers"][0]["shape"], json!([2, 2]));
        assert!(json["layers"][0]["data"].is_string());

        let decoded = unpack(json).unwrap();
        let decoded_plane = decoded.get("layers").and_then(Value::as_seq).unwrap()[0]
            .as_array()
            .unwrap()
            .clone();
        let values = decoded_plane.to_f32_vec().unwrap();
        assert_eq!(&values[..3], &[1.0, 2.0, 3.0]);
        assert!(values[3].is_nan());
        assert_eq!(decoded_plane.shape(), plane.shape());
    }

    #[test]
    fn nested_list_data_is_accepted() {
        let json = json!({
            "dtype": "uint8",
            "shape": [2, 3],
            "data": [[0, 1, 2], [3, 4, 255]]
        });
        let value = unpack(json).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.dtype(), DType::U8);
        assert_eq!(array.data().as_ref(), &[0, 1, 2, 3, 4, 255]);
    }

    #[test]
    fn nested_list_with_wrong_count_is_rejected() {
        let json = json!({ "dtype": "int32", "shape": [4], "data": [1, 2, 3] });
        assert!(matches!(unpack(json), Err(FrameError::InvalidArray(_))));
    }

    #[test]
    fn huge_nested_list_shape_is_rejected_without_allocating() {
        let json = json!({ "dtype": "uint8", "shape": [2305843009213693952u64], "data": [1] });
        assert!(matches!(unpack(json), Err(FrameError::InvalidArray(_))));
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let json = json!({
            "dtype": "uint8",
            "shape": [4294967296u64, 4294967296u64, 4294967296u64],
            "data": ""
        });
        assert!(matches!(unpack(json), Err(FrameError::InvalidArray(_))));
    }

    #[test]
    fn unknown_dtype_is_rejected() {
        let json = json!({ "dtype": "complex128", "shape": [1], "data": "" });
        assert!(matches!(unpack(json), Err(FrameError::InvalidArray(_))));
    }

    #[test]
    fn maps_with_extra_keys_stay_maps() {
        let json = json!({ "dtype": "float32", "shape": [1], "data": "AAAAAA==", "units": "Jy" });
        let value = unpack(json).unwrap();
        assert!(value.as_map().is_some());
        assert_eq!(value.get("units").and_then(Value::as_str), Some("Jy"));
    }

    #[test]
    fn non_finite_scalar_becomes_null() {
        assert_eq!(pack(&Value::Float(f64::INFINITY)), serde_json::Value::Null);
        assert_eq!(pack(&Value::Float(0.5)), json!(0.5));
    }
}
