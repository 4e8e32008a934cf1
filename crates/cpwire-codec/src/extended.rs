//! Platform composite extension of the standard codec.
//!
//! Adds three tags on top of the base table:
//!
//! ```text
//! 132 typed attribute map   size, then per entry: key string, inner tag, payload
//! 133 attribute set         size, then per entry: key string, value   (encode only)
//! 134 resource locator      size + UTF-8                              (encode only)
//! ```
//!
//! Inner tags of a typed attribute map reuse the base numbering where a base
//! tag exists and add 128 (byte), 129 (short) and 131 (float). Inner payloads
//! are flat: they are never written through the recursive value path.

use bytes::Bytes;

use crate::buffer::{MessageReader, MessageWriter};
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::message::{decode_message, encode_message, ValueCodec};
use crate::standard::{self, write_string, StandardCodec};
use crate::value::{TypedAttributeMap, TypedValue, Value};

pub const TYPED_MAP: u8 = 132;
pub const ATTRIBUTE_SET: u8 = 133;
pub const RESOURCE_LOCATOR: u8 = 134;

/// Inner tag: 8-bit integer, stored as a 4-byte int.
pub const BYTE: u8 = 128;
/// Inner tag: 16-bit integer, stored as a 4-byte int.
pub const SHORT: u8 = 129;
/// Inner tag: 32-bit float, stored as an aligned 8-byte double.
pub const FLOAT: u8 = 131;

/// The codec used on every channel.
///
/// Immutable; build one and share it by reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendedCodec {
    base: StandardCodec,
    config: CodecConfig,
}

impl ExtendedCodec {
    pub const fn new() -> Self {
        Self::with_config(CodecConfig::new())
    }

    pub const fn with_config(config: CodecConfig) -> Self {
        Self {
            base: StandardCodec::with_config(config),
            config,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a value as a complete message.
    pub fn encode(&self, value: &Value) -> Result<Bytes> {
        encode_message(self, value)
    }

    /// Decode a complete message.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        decode_message(self, bytes, &self.config)
    }

    fn write_typed_map(&self, out: &mut MessageWriter, map: &TypedAttributeMap) -> Result<()> {
        out.put_u8(TYPED_MAP);
        out.put_size(map.len())?;
        for (key, value) in map.iter() {
            write_string(out, key)?;
            write_typed_value(out, value)?;
        }
        Ok(())
    }

    fn read_typed_map(&self, input: &mut MessageReader<'_>) -> Result<TypedAttributeMap> {
        let size = input.get_size()?;
        // key tag + key size + inner tag
        input.require_elements(size, 3, "typed attribute map")?;
        let mut map = TypedAttributeMap::new();
        for _ in 0..size {
            let key = match self.read_value(input)? {
                Value::String(key) => key,
                other => {
                    return Err(CodecError::corrupted(format!(
                        "typed attribute map key must be a string, got {}",
                        other.kind()
                    )));
                }
            };
            let value = read_typed_value(input)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl ValueCodec for ExtendedCodec {
    fn write_value(&self, out: &mut MessageWriter, value: &Value) -> Result<()> {
        match value {
            Value::ResourceLocator(locator) => {
                out.put_u8(RESOURCE_LOCATOR);
                out.put_sized(locator.as_str().as_bytes())
            }
            Value::AttributeSet(set) => {
                out.put_u8(ATTRIBUTE_SET);
                out.put_size(set.len())?;
                for (key, value) in set.iter() {
                    write_string(out, key)?;
                    self.write_value(out, value)?;
                }
                Ok(())
            }
            Value::TypedMap(map) => self.write_typed_map(out, map),
            _ => {
                let mark = out.position();
                match self.base.write_standard(self, out, value) {
                    Err(CodecError::Unsupported(reason)) => match value {
                        Value::ObjectArray(items) => {
                            tracing::trace!(len = items.len(), "writing object array as list");
                            out.truncate(mark);
                            self.base.write_list(self, out, items)
                        }
                        _ => Err(CodecError::Unsupported(reason)),
                    },
                    other => other,
                }
            }
        }
    }

    fn read_value_of_type(&self, tag: u8, input: &mut MessageReader<'_>) -> Result<Value> {
        match tag {
            RESOURCE_LOCATOR => {
                tracing::debug!(offset = input.position(), "rejecting resource locator tag");
                Err(CodecError::corrupted(
                    "resource locator tag must not be sent to this side, send a plain string instead",
                ))
            }
            ATTRIBUTE_SET => {
                tracing::debug!(offset = input.position(), "rejecting attribute set tag");
                Err(CodecError::corrupted(
                    "attribute set tag must not be sent to this side, send a plain map instead",
                ))
            }
            TYPED_MAP => self.read_typed_map(input).map(Value::TypedMap),
            _ => self.base.read_standard(self, tag, input),
        }
    }
}

fn write_typed_value(out: &mut MessageWriter, value: &TypedValue) -> Result<()> {
    match value {
        TypedValue::Null => out.put_u8(standard::NULL),
        TypedValue::String(s) => {
            out.put_u8(standard::STRING);
            out.put_sized(s.as_bytes())?;
        }
        TypedValue::Byte(v) => {
            out.put_u8(BYTE);
            out.put_i32(i32::from(*v));
        }
        TypedValue::Short(v) => {
            out.put_u8(SHORT);
            out.put_i32(i32::from(*v));
        }
        TypedValue::Int(v) => {
            out.put_u8(standard::INT32);
            out.put_i32(*v);
        }
        TypedValue::Long(v) => {
            out.put_u8(standard::INT64);
            out.put_i64(*v);
        }
        TypedValue::Float(v) => {
            out.put_u8(FLOAT);
            out.put_alignment(8);
            out.put_f64(f64::from(*v));
        }
        TypedValue::Double(v) => {
            out.put_u8(standard::FLOAT64);
            out.put_alignment(8);
            out.put_f64(*v);
        }
        TypedValue::Bool(true) => out.put_u8(standard::TRUE),
        TypedValue::Bool(false) => out.put_u8(standard::FALSE),
        TypedValue::Bytes(b) => {
            out.put_u8(standard::BYTES);
            out.put_sized(b)?;
        }
    }
    Ok(())
}

fn read_typed_value(input: &mut MessageReader<'_>) -> Result<TypedValue> {
    let tag = input.get_u8()?;
    let value = match tag {
        standard::NULL => TypedValue::Null,
        standard::STRING => TypedValue::String(input.get_string()?),
        // Narrow widths are truncated, matching how they were widened.
        BYTE => TypedValue::Byte(input.get_i32()? as i8),
        SHORT => TypedValue::Short(input.get_i32()? as i16),
        standard::INT32 => TypedValue::Int(input.get_i32()?),
        standard::INT64 => TypedValue::Long(input.get_i64()?),
        FLOAT => {
            input.align(8)?;
            TypedValue::Float(input.get_f64()? as f32)
        }
        standard::FLOAT64 => {
            input.align(8)?;
            TypedValue::Double(input.get_f64()?)
        }
        standard::TRUE => TypedValue::Bool(true),
        standard::FALSE => TypedValue::Bool(false),
        standard::BYTES => TypedValue::Bytes(input.get_sized()?.to_vec()),
        other => {
            return Err(CodecError::corrupted(format!(
                "invalid value tag {other} in typed attribute map"
            )));
        }
    };
    Ok(value)
}
