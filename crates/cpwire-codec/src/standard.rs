//! The fixed base codec.
//!
//! Wire format, one tag byte per value, little-endian integers:
//!
//! ```text
//! 0  null            -
//! 1  true            -
//! 2  false           -
//! 3  int32           4 bytes
//! 4  int64           8 bytes
//! 5  big integer     size + ASCII hex
//! 6  float64         pad to 8, 8 bytes
//! 7  string          size + UTF-8
//! 8  bytes           size + bytes
//! 9  int32 array     size, pad to 4, elements
//! 10 int64 array     size, pad to 8, elements
//! 11 float64 array   size, pad to 8, elements
//! 12 list            size, values
//! 13 map             size, key/value pairs
//! ```
//!
//! Padding is counted from the start of the message.

use bytes::Bytes;

use crate::buffer::{MessageReader, MessageWriter};
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::message::{decode_message, encode_message, ValueCodec};
use crate::value::{Value, ValueMap};

pub const NULL: u8 = 0;
pub const TRUE: u8 = 1;
pub const FALSE: u8 = 2;
pub const INT32: u8 = 3;
pub const INT64: u8 = 4;
pub const BIGINT: u8 = 5;
pub const FLOAT64: u8 = 6;
pub const STRING: u8 = 7;
pub const BYTES: u8 = 8;
pub const INT32_ARRAY: u8 = 9;
pub const INT64_ARRAY: u8 = 10;
pub const FLOAT64_ARRAY: u8 = 11;
pub const LIST: u8 = 12;
pub const MAP: u8 = 13;

/// The base codec. Stateless.
///
/// Used on its own it implements [`ValueCodec`] directly. A wrapping codec
/// calls [`StandardCodec::write_standard`] and [`StandardCodec::read_standard`]
/// with itself as `outer`, so children of lists and maps go back through the
/// wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCodec {
    config: CodecConfig,
}

impl StandardCodec {
    pub const fn new() -> Self {
        Self {
            config: CodecConfig::new(),
        }
    }

    pub const fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Encode a value as a complete message.
    pub fn encode(&self, value: &Value) -> Result<Bytes> {
        encode_message(self, value)
    }

    /// Decode a complete message.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        decode_message(self, bytes, &self.config)
    }

    /// Write `value` using the base rules.
    ///
    /// Values without a base tag are rejected with [`CodecError::Unsupported`]
    /// before anything is written.
    pub fn write_standard(
        &self,
        outer: &dyn ValueCodec,
        out: &mut MessageWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Null => out.put_u8(NULL),
            Value::Bool(true) => out.put_u8(TRUE),
            Value::Bool(false) => out.put_u8(FALSE),
            Value::Int32(v) => {
                out.put_u8(INT32);
                out.put_i32(*v);
            }
            Value::Int64(v) => {
                out.put_u8(INT64);
                out.put_i64(*v);
            }
            Value::BigInt(hex) => {
                if !is_hex_integer(hex) {
                    return Err(CodecError::unsupported(format!(
                        "big integer is not signed hexadecimal: {hex:?}"
                    )));
                }
                out.put_u8(BIGINT);
                out.put_sized(hex.as_bytes())?;
            }
            Value::Float64(v) => {
                out.put_u8(FLOAT64);
                out.put_alignment(8);
                out.put_f64(*v);
            }
            Value::String(s) => write_string(out, s)?,
            Value::Bytes(b) => {
                out.put_u8(BYTES);
                out.put_sized(b)?;
            }
            Value::Int32Array(items) => {
                out.put_u8(INT32_ARRAY);
                out.put_size(items.len())?;
                out.put_alignment(4);
                items.iter().for_each(|v| out.put_i32(*v));
            }
            Value::Int64Array(items) => {
                out.put_u8(INT64_ARRAY);
                out.put_size(items.len())?;
                out.put_alignment(8);
                items.iter().for_each(|v| out.put_i64(*v));
            }
            Value::Float64Array(items) => {
                out.put_u8(FLOAT64_ARRAY);
                out.put_size(items.len())?;
                out.put_alignment(8);
                items.iter().for_each(|v| out.put_f64(*v));
            }
            Value::List(items) => self.write_list(outer, out, items)?,
            Value::Map(map) => {
                out.put_u8(MAP);
                out.put_size(map.len())?;
                for (k, v) in map.iter() {
                    outer.write_value(out, k)?;
                    outer.write_value(out, v)?;
                }
            }
            Value::ObjectArray(_)
            | Value::ResourceLocator(_)
            | Value::AttributeSet(_)
            | Value::TypedMap(_) => {
                return Err(CodecError::unsupported(value.kind()));
            }
        }
        Ok(())
    }

    /// Write a list of values, children through `outer`.
    pub fn write_list(
        &self,
        outer: &dyn ValueCodec,
        out: &mut MessageWriter,
        items: &[Value],
    ) -> Result<()> {
        out.put_u8(LIST);
        out.put_size(items.len())?;
        for item in items {
            outer.write_value(out, item)?;
        }
        Ok(())
    }

    /// Read the payload for a base `tag`.
    pub fn read_standard(
        &self,
        outer: &dyn ValueCodec,
        tag: u8,
        input: &mut MessageReader<'_>,
    ) -> Result<Value> {
        let value = match tag {
            NULL => Value::Null,
            TRUE => Value::Bool(true),
            FALSE => Value::Bool(false),
            INT32 => Value::Int32(input.get_i32()?),
            INT64 => Value::Int64(input.get_i64()?),
            BIGINT => {
                let hex = input.get_string()?;
                if !is_hex_integer(&hex) {
                    return Err(CodecError::corrupted(format!(
                        "big integer is not signed hexadecimal: {hex:?}"
                    )));
                }
                Value::BigInt(hex)
            }
            FLOAT64 => {
                input.align(8)?;
                Value::Float64(input.get_f64()?)
            }
            STRING => Value::String(input.get_string()?),
            BYTES => Value::Bytes(input.get_sized()?.to_vec()),
            INT32_ARRAY => {
                let n = input.get_size()?;
                input.align(4)?;
                input.require_elements(n, 4, "int32 array")?;
                Value::Int32Array((0..n).map(|_| input.get_i32()).collect::<Result<_>>()?)
            }
            INT64_ARRAY => {
                let n = input.get_size()?;
                input.align(8)?;
                input.require_elements(n, 8, "int64 array")?;
                Value::Int64Array((0..n).map(|_| input.get_i64()).collect::<Result<_>>()?)
            }
            FLOAT64_ARRAY => {
                let n = input.get_size()?;
                input.align(8)?;
                input.require_elements(n, 8, "float64 array")?;
                Value::Float64Array((0..n).map(|_| input.get_f64()).collect::<Result<_>>()?)
            }
            LIST => {
                let n = input.get_size()?;
                // Every element takes at least its tag byte.
                input.require_elements(n, 1, "list")?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(outer.read_value(input)?);
                }
                Value::List(items)
            }
            MAP => {
                let n = input.get_size()?;
                input.require_elements(n, 2, "map")?;
                let mut map = ValueMap::with_capacity(n);
                for _ in 0..n {
                    let key = outer.read_value(input)?;
                    let value = outer.read_value(input)?;
                    map.insert(key, value);
                }
                Value::Map(map)
            }
            other => {
                return Err(CodecError::corrupted(format!(
                    "unknown type tag {other} at offset {}",
                    input.position().saturating_sub(1)
                )));
            }
        };
        Ok(value)
    }
}

impl ValueCodec for StandardCodec {
    fn write_value(&self, out: &mut MessageWriter, value: &Value) -> Result<()> {
        self.write_standard(self, out, value)
    }

    fn read_value_of_type(&self, tag: u8, input: &mut MessageReader<'_>) -> Result<Value> {
        self.read_standard(self, tag, input)
    }
}

/// Write a string value: tag, size, UTF-8 bytes.
///
/// Byte-identical to writing `Value::String` through any codec layer.
pub fn write_string(out: &mut MessageWriter, s: &str) -> Result<()> {
    out.put_u8(STRING);
    out.put_sized(s.as_bytes())
}

fn is_hex_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        StandardCodec::new().encode(value).unwrap().to_vec()
    }

    #[test]
    fn scalar_layouts() {
        assert_eq!(encode(&Value::Null), [NULL]);
        assert_eq!(encode(&Value::Bool(true)), [TRUE]);
        assert_eq!(encode(&Value::Bool(false)), [FALSE]);
        assert_eq!(encode(&Value::Int32(-2)), [INT32, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            encode(&Value::Int64(1)),
            [INT64, 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(encode(&Value::from("hi")), [STRING, 2, b'h', b'i']);
        assert_eq!(encode(&Value::Bytes(vec![9, 8])), [BYTES, 2, 9, 8]);
        assert_eq!(
            encode(&Value::BigInt("-1f".into())),
            [BIGINT, 3, b'-', b'1', b'f']
        );
    }

    #[test]
    fn float64_is_padded_to_eight() {
        let bytes = encode(&Value::Float64(1.0));
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], FLOAT64);
        assert_eq!(&bytes[1..8], &[0; 7]);
        assert_eq!(&bytes[8..], &1.0f64.to_le_bytes());
    }

    #[test]
    fn primitive_arrays_are_aligned() {
        let bytes = encode(&Value::Int32Array(vec![1, 2]));
        // tag, size, 2 bytes padding, 2 x 4 bytes
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &[INT32_ARRAY, 2, 0, 0]);

        let bytes = encode(&Value::Int64Array(vec![7]));
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[8..], &7i64.to_le_bytes());
    }

    #[test]
    fn list_and_map_nest_values() {
        let mut map = ValueMap::new();
        map.insert("k", Value::List(vec![Value::Null, Value::Bool(true)]));
        let bytes = encode(&Value::Map(map.clone()));
        assert_eq!(
            bytes,
            [MAP, 1, STRING, 1, b'k', LIST, 2, NULL, TRUE]
        );
        assert_eq!(
            StandardCodec::new().decode(&bytes).unwrap(),
            Value::Map(map)
        );
    }

    #[test]
    fn rejects_extended_values_without_writing() {
        let codec = StandardCodec::new();
        let mut out = MessageWriter::new();
        let err = codec
            .write_value(&mut out, &Value::ObjectArray(vec![Value::Null]))
            .unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(_)));
        assert_eq!(out.position(), 0);
    }

    #[test]
    fn unsupported_element_inside_list_fails() {
        let value = Value::List(vec![
            Value::Int32(1),
            Value::ResourceLocator("content://a".into()),
        ]);
        let err = StandardCodec::new().encode(&value).unwrap_err();
        assert_eq!(err, CodecError::Unsupported("resource locator".into()));
    }

    #[test]
    fn decodes_mixed_message() {
        let value = Value::List(vec![
            Value::Int32(5),
            Value::Float64(-0.5),
            Value::Float64Array(vec![1.5, 2.5]),
            Value::from("done"),
        ]);
        let codec = StandardCodec::new();
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn unknown_tag_is_corrupted() {
        for tag in [14u8, 100, 127, 128, 129, 130, 131, 135, 255] {
            let err = StandardCodec::new().decode(&[tag]).unwrap_err();
            assert!(err.is_corrupted(), "tag {tag}");
        }
    }

    #[test]
    fn trailing_bytes_are_corrupted() {
        let err = StandardCodec::new().decode(&[NULL, NULL]).unwrap_err();
        assert!(matches!(err, CodecError::Corrupted(msg) if msg.contains("trailing")));
    }

    #[test]
    fn oversized_list_prefix_is_corrupted() {
        // claims 0xFFFF elements, carries none
        let err = StandardCodec::new()
            .decode(&[LIST, 254, 0xFF, 0xFF])
            .unwrap_err();
        assert!(err.is_corrupted());
    }

    #[test]
    fn depth_limit_applies_to_nested_lists() {
        let codec = StandardCodec::with_config(CodecConfig { max_depth: 3 });
        assert!(codec.decode(&[LIST, 1, LIST, 1, NULL]).is_ok());
        let err = codec.decode(&[LIST, 1, LIST, 1, LIST, 1, NULL]).unwrap_err();
        assert!(matches!(err, CodecError::Corrupted(msg) if msg.contains("nesting")));
    }

    #[test]
    fn invalid_big_integer_text() {
        assert!(StandardCodec::new()
            .encode(&Value::BigInt("0x10".into()))
            .is_err());
        let err = StandardCodec::new()
            .decode(&[BIGINT, 2, b'z', b'z'])
            .unwrap_err();
        assert!(err.is_corrupted());
    }
}
