//! JSON notation for values.
//!
//! Plain JSON maps onto the obvious variants: integers become `Int32` when
//! they fit and `Int64` otherwise, other numbers `Float64`, objects maps with
//! string keys. Everything else is written as a single-key object whose key
//! starts with `$`:
//!
//! | notation | value |
//! |---|---|
//! | `{"$i64": n}` | `Int64` regardless of magnitude |
//! | `{"$f64": x}` | `Float64`, also `"NaN"`, `"inf"`, `"-inf"` |
//! | `{"$bigint": "-1f"}` | `BigInt` |
//! | `{"$bytes": "00ff"}` | `Bytes`, hex |
//! | `{"$i32s": [..]}`, `{"$i64s": [..]}`, `{"$f64s": [..]}` | primitive arrays |
//! | `{"$objects": [..]}` | `ObjectArray` |
//! | `{"$map": [[k, v], ..]}` | `Map` with arbitrary keys |
//! | `{"$uri": "content://.."}` | `ResourceLocator` |
//! | `{"$bundle": {..}}` | `AttributeSet` |
//! | `{"$typed": {..}}` | `TypedMap` |
//!
//! Inside `$typed`, entries are `null`, strings, booleans, integers (`Int`),
//! other numbers (`Double`), `{"$byte": n}`, `{"$short": n}`,
//! `{"$long": n}`, `{"$float": x}`, `{"$double": x}` or `{"$bytes": hex}`.

use cpwire_codec::{AttributeSet, ResourceLocator, TypedAttributeMap, TypedValue, Value, ValueMap};
use serde_json::{json, Map, Number, Value as Json};

/// A JSON document that does not describe a value.
#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("unknown annotation {0}")]
    UnknownAnnotation(String),

    #[error("{tag}: expected {expected}, got {found}")]
    Expected {
        tag: String,
        expected: &'static str,
        found: String,
    },

    #[error("{tag}: {value} out of range")]
    OutOfRange { tag: String, value: String },

    #[error("{tag}: {reason}")]
    Malformed { tag: String, reason: &'static str },

    #[error("{tag}: invalid hex: {source}")]
    Hex {
        tag: String,
        #[source]
        source: hex::FromHexError,
    },

    /// Failure inside one entry of a typed map.
    #[error("{key}: {source}")]
    Entry {
        key: String,
        #[source]
        source: Box<JsonError>,
    },
}

impl JsonError {
    fn expected(tag: &str, expected: &'static str, found: impl ToString) -> Self {
        JsonError::Expected {
            tag: tag.to_string(),
            expected,
            found: found.to_string(),
        }
    }

    fn out_of_range(tag: &str, value: impl ToString) -> Self {
        JsonError::OutOfRange {
            tag: tag.to_string(),
            value: value.to_string(),
        }
    }

    fn malformed(tag: &str, reason: &'static str) -> Self {
        JsonError::Malformed {
            tag: tag.to_string(),
            reason,
        }
    }
}

pub type JsonResult<T> = Result<T, JsonError>;

pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int32(v) => json!(v),
        Value::Int64(v) => json!({ "$i64": v }),
        Value::BigInt(hex) => json!({ "$bigint": hex }),
        Value::Float64(v) => float_to_json(*v),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => json!({ "$bytes": hex::encode(bytes) }),
        Value::Int32Array(items) => json!({ "$i32s": items }),
        Value::Int64Array(items) => json!({ "$i64s": items }),
        Value::Float64Array(items) => json!({
            "$f64s": items.iter().map(|v| float_number(*v)).collect::<Vec<_>>()
        }),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::ObjectArray(items) => {
            json!({ "$objects": items.iter().map(to_json).collect::<Vec<_>>() })
        }
        Value::Map(map) => map_to_json(map),
        Value::ResourceLocator(locator) => json!({ "$uri": locator.as_str() }),
        Value::AttributeSet(set) => {
            let entries: Map<String, Json> =
                set.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
            json!({ "$bundle": entries })
        }
        Value::TypedMap(map) => {
            let entries: Map<String, Json> = map
                .iter()
                .map(|(k, v)| (k.clone(), typed_to_json(v)))
                .collect();
            json!({ "$typed": entries })
        }
    }
}

fn float_number(v: f64) -> Json {
    Number::from_f64(v).map_or_else(|| Json::String(non_finite_name(v).to_string()), Json::Number)
}

fn float_to_json(v: f64) -> Json {
    match Number::from_f64(v) {
        // Integral floats would read back as integers.
        Some(number) if v.fract() != 0.0 => Json::Number(number),
        _ => json!({ "$f64": float_number(v) }),
    }
}

fn non_finite_name(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v > 0.0 {
        "inf"
    } else {
        "-inf"
    }
}

fn map_to_json(map: &ValueMap) -> Json {
    let all_string_keys = map.iter().all(|(k, _)| matches!(k, Value::String(_)));
    if all_string_keys {
        let entries: Map<String, Json> = map
            .iter()
            .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), to_json(v))))
            .collect();
        if !entries.keys().any(|k| k.starts_with('$')) || entries.len() > 1 {
            return Json::Object(entries);
        }
    }
    let pairs: Vec<Json> = map
        .iter()
        .map(|(k, v)| Json::Array(vec![to_json(k), to_json(v)]))
        .collect();
    json!({ "$map": pairs })
}

pub fn typed_to_json(value: &TypedValue) -> Json {
    match value {
        TypedValue::Null => Json::Null,
        TypedValue::String(s) => Json::String(s.clone()),
        TypedValue::Byte(v) => json!({ "$byte": v }),
        TypedValue::Short(v) => json!({ "$short": v }),
        TypedValue::Int(v) => json!(v),
        TypedValue::Long(v) => json!({ "$long": v }),
        TypedValue::Float(v) => json!({ "$float": float_number(f64::from(*v)) }),
        TypedValue::Double(v) => match Number::from_f64(*v) {
            Some(number) if v.fract() != 0.0 => Json::Number(number),
            _ => json!({ "$double": float_number(*v) }),
        },
        TypedValue::Bool(b) => Json::Bool(*b),
        TypedValue::Bytes(bytes) => json!({ "$bytes": hex::encode(bytes) }),
    }
}

pub fn from_json(json: &Json) -> JsonResult<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => number_to_value(n)?,
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(list_from_json(items)?),
        Json::Object(object) => match annotation(object) {
            Some((tag, body)) => annotated_value(tag, body)?,
            None => {
                let mut map = ValueMap::with_capacity(object.len());
                for (key, value) in object {
                    map.insert(key.as_str(), from_json(value)?);
                }
                Value::Map(map)
            }
        },
    })
}

fn annotation(object: &Map<String, Json>) -> Option<(&str, &Json)> {
    if object.len() != 1 {
        return None;
    }
    object
        .iter()
        .next()
        .filter(|(key, _)| key.starts_with('$'))
        .map(|(key, body)| (key.as_str(), body))
}

fn number_to_value(n: &Number) -> JsonResult<Value> {
    if let Some(v) = n.as_i64() {
        return Ok(i32::try_from(v).map_or(Value::Int64(v), Value::Int32));
    }
    if n.is_u64() {
        return Err(JsonError::out_of_range("integer", n));
    }
    n.as_f64()
        .map(Value::Float64)
        .ok_or_else(|| JsonError::expected("number", "a finite number", n))
}

fn list_from_json(items: &[Json]) -> JsonResult<Vec<Value>> {
    items.iter().map(from_json).collect()
}

fn annotated_value(tag: &str, body: &Json) -> JsonResult<Value> {
    Ok(match tag {
        "$i64" => Value::Int64(json_i64(body, tag)?),
        "$f64" => Value::Float64(json_f64(body, tag)?),
        "$bigint" => Value::BigInt(json_str(body, tag)?.to_string()),
        "$bytes" => Value::Bytes(json_hex(body, tag)?),
        "$i32s" => Value::Int32Array(
            json_array(body, tag)?
                .iter()
                .map(|v| {
                    json_i64(v, tag).and_then(|v| narrow::<i32>(v, tag))
                })
                .collect::<JsonResult<_>>()?,
        ),
        "$i64s" => Value::Int64Array(
            json_array(body, tag)?
                .iter()
                .map(|v| json_i64(v, tag))
                .collect::<JsonResult<_>>()?,
        ),
        "$f64s" => Value::Float64Array(
            json_array(body, tag)?
                .iter()
                .map(|v| json_f64(v, tag))
                .collect::<JsonResult<_>>()?,
        ),
        "$objects" => Value::ObjectArray(list_from_json(json_array(body, tag)?)?),
        "$map" => {
            let mut map = ValueMap::new();
            for pair in json_array(body, tag)? {
                match pair.as_array().map(Vec::as_slice) {
                    Some([key, value]) => {
                        map.insert(from_json(key)?, from_json(value)?);
                    }
                    _ => return Err(JsonError::malformed(tag, "entries must be [key, value] pairs")),
                }
            }
            Value::Map(map)
        }
        "$uri" => Value::ResourceLocator(ResourceLocator::new(json_str(body, tag)?)),
        "$bundle" => {
            let mut set = AttributeSet::new();
            for (key, value) in json_object(body, tag)? {
                set.insert(key.as_str(), from_json(value)?);
            }
            Value::AttributeSet(set)
        }
        "$typed" => {
            let mut map = TypedAttributeMap::new();
            for (key, value) in json_object(body, tag)? {
                let entry = typed_from_json(value).map_err(|err| JsonError::Entry {
                    key: key.clone(),
                    source: Box::new(err),
                })?;
                map.insert(key.as_str(), entry);
            }
            Value::TypedMap(map)
        }
        other => return Err(JsonError::UnknownAnnotation(other.to_string())),
    })
}

fn typed_from_json(json: &Json) -> JsonResult<TypedValue> {
    Ok(match json {
        Json::Null => TypedValue::Null,
        Json::Bool(b) => TypedValue::Bool(*b),
        Json::String(s) => TypedValue::String(s.clone()),
        Json::Number(n) => match n.as_i64() {
            Some(v) => TypedValue::Int(narrow(v, "int")?),
            None => TypedValue::Double(json_f64(json, "double")?),
        },
        Json::Object(object) => {
            let (tag, body) = annotation(object).ok_or_else(|| {
                JsonError::malformed("$typed", "nested maps are not allowed in a typed map")
            })?;
            match tag {
                "$byte" => TypedValue::Byte(narrow(json_i64(body, tag)?, tag)?),
                "$short" => TypedValue::Short(narrow(json_i64(body, tag)?, tag)?),
                "$long" => TypedValue::Long(json_i64(body, tag)?),
                "$float" => TypedValue::Float(json_f64(body, tag)? as f32),
                "$double" => TypedValue::Double(json_f64(body, tag)?),
                "$bytes" => TypedValue::Bytes(json_hex(body, tag)?),
                other => return Err(JsonError::UnknownAnnotation(other.to_string())),
            }
        }
        Json::Array(_) => {
            return Err(JsonError::malformed(
                "$typed",
                "lists are not allowed in a typed map",
            ))
        }
    })
}

fn narrow<T: TryFrom<i64>>(v: i64, tag: &str) -> JsonResult<T> {
    T::try_from(v).map_err(|_| JsonError::out_of_range(tag, v))
}

fn json_i64(json: &Json, tag: &str) -> JsonResult<i64> {
    json.as_i64()
        .ok_or_else(|| JsonError::expected(tag, "an integer", json))
}

fn json_f64(json: &Json, tag: &str) -> JsonResult<f64> {
    match json {
        Json::Number(n) => n
            .as_f64()
            .ok_or_else(|| JsonError::expected(tag, "a finite number", n)),
        Json::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            _ => Err(JsonError::expected(tag, "a number", format!("{s:?}"))),
        },
        other => Err(JsonError::expected(tag, "a number", other)),
    }
}

fn json_str<'a>(json: &'a Json, tag: &str) -> JsonResult<&'a str> {
    json.as_str()
        .ok_or_else(|| JsonError::expected(tag, "a string", json))
}

fn json_hex(json: &Json, tag: &str) -> JsonResult<Vec<u8>> {
    hex::decode(json_str(json, tag)?).map_err(|source| JsonError::Hex {
        tag: tag.to_string(),
        source,
    })
}

fn json_array<'a>(json: &'a Json, tag: &str) -> JsonResult<&'a [Json]> {
    json.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| JsonError::expected(tag, "an array", json))
}

fn json_object<'a>(json: &'a Json, tag: &str) -> JsonResult<&'a Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| JsonError::expected(tag, "an object", json))
}
