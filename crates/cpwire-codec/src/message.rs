use bytes::Bytes;

use crate::buffer::{MessageReader, MessageWriter};
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::value::Value;

/// Per-value read/write hooks of a codec layer.
///
/// Composite values read or write their children through the outermost
/// codec, so a layer that wraps another receives nested values too.
pub trait ValueCodec: Send + Sync {
    /// Write the tag and payload of `value`.
    fn write_value(&self, out: &mut MessageWriter, value: &Value) -> Result<()>;

    /// Read the payload that follows an already consumed `tag`.
    fn read_value_of_type(&self, tag: u8, input: &mut MessageReader<'_>) -> Result<Value>;

    /// Read one tagged value.
    fn read_value(&self, input: &mut MessageReader<'_>) -> Result<Value> {
        if !input.has_remaining() {
            return Err(CodecError::corrupted(format!(
                "message ended before a type tag at offset {}",
                input.position()
            )));
        }
        let tag = input.get_u8()?;
        input.descend()?;
        let value = self.read_value_of_type(tag, input);
        input.ascend();
        value
    }
}

/// Encode a single value as a complete message.
pub fn encode_message(codec: &dyn ValueCodec, value: &Value) -> Result<Bytes> {
    let mut out = MessageWriter::new();
    codec.write_value(&mut out, value)?;
    Ok(out.finish())
}

/// Decode a complete message holding exactly one value.
pub fn decode_message(codec: &dyn ValueCodec, bytes: &[u8], config: &CodecConfig) -> Result<Value> {
    let mut input = MessageReader::new(bytes, config.max_depth);
    let value = codec.read_value(&mut input)?;
    if input.has_remaining() {
        return Err(CodecError::corrupted(format!(
            "{} trailing bytes after value",
            input.remaining()
        )));
    }
    Ok(value)
}
