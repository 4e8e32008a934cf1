//! Method calls and result envelopes for multi-method channels.
//!
//! A call is two values back to back: the method name and its arguments.
//! A result envelope starts with a status byte: `0` then the result value,
//! or `1` then error code, message and details.

use bytes::Bytes;
use cpwire_codec::{
    CodecError, ExtendedCodec, MessageReader, MessageWriter, Value, ValueCodec,
};

use crate::error::{Result, RpcError};

const SUCCESS: u8 = 0;
const ERROR: u8 = 1;

/// A decoded method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: impl Into<Value>) -> Self {
        Self {
            method: method.into(),
            arguments: arguments.into(),
        }
    }
}

/// Encodes method calls and result envelopes with the extended value codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodCodec {
    codec: ExtendedCodec,
}

impl MethodCodec {
    pub const fn new() -> Self {
        Self {
            codec: ExtendedCodec::new(),
        }
    }

    pub const fn with_codec(codec: ExtendedCodec) -> Self {
        Self { codec }
    }

    pub fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes> {
        let mut out = MessageWriter::new();
        self.codec
            .write_value(&mut out, &Value::String(call.method.clone()))?;
        self.codec.write_value(&mut out, &call.arguments)?;
        Ok(out.finish())
    }

    pub fn decode_method_call(&self, bytes: &[u8]) -> Result<MethodCall> {
        let mut input = self.reader(bytes);
        let method = match self.codec.read_value(&mut input)? {
            Value::String(method) => method,
            other => {
                return Err(corrupted(format!(
                    "method name must be a string, got {}",
                    other.kind()
                )))
            }
        };
        let arguments = self.codec.read_value(&mut input)?;
        ensure_consumed(&input, "method call")?;
        Ok(MethodCall { method, arguments })
    }

    pub fn encode_success_envelope(&self, result: &Value) -> Result<Bytes> {
        let mut out = MessageWriter::new();
        out.put_u8(SUCCESS);
        self.codec.write_value(&mut out, result)?;
        Ok(out.finish())
    }

    pub fn encode_error_envelope(
        &self,
        code: &str,
        message: Option<&str>,
        details: &Value,
    ) -> Result<Bytes> {
        let mut out = MessageWriter::new();
        out.put_u8(ERROR);
        self.codec.write_value(&mut out, &Value::from(code))?;
        self.codec.write_value(&mut out, &Value::from(message))?;
        self.codec.write_value(&mut out, details)?;
        Ok(out.finish())
    }

    /// Decode a result envelope. Error envelopes become [`RpcError::Remote`].
    pub fn decode_envelope(&self, bytes: &[u8]) -> Result<Value> {
        let mut input = self.reader(bytes);
        if !input.has_remaining() {
            return Err(corrupted("empty envelope"));
        }
        match input.get_u8()? {
            SUCCESS => {
                let value = self.codec.read_value(&mut input)?;
                ensure_consumed(&input, "success envelope")?;
                Ok(value)
            }
            ERROR => {
                let code = match self.codec.read_value(&mut input)? {
                    Value::String(code) => code,
                    other => {
                        return Err(corrupted(format!(
                            "error code must be a string, got {}",
                            other.kind()
                        )))
                    }
                };
                let message = match self.codec.read_value(&mut input)? {
                    Value::String(message) => message,
                    Value::Null => String::new(),
                    other => {
                        return Err(corrupted(format!(
                            "error message must be a string, got {}",
                            other.kind()
                        )))
                    }
                };
                let details = self.codec.read_value(&mut input)?;
                ensure_consumed(&input, "error envelope")?;
                Err(RpcError::Remote {
                    code,
                    message,
                    details,
                })
            }
            status => Err(corrupted(format!("invalid envelope status {status}"))),
        }
    }

    fn reader<'a>(&self, bytes: &'a [u8]) -> MessageReader<'a> {
        MessageReader::new(bytes, self.codec.config().max_depth)
    }
}

fn corrupted(reason: impl Into<String>) -> RpcError {
    RpcError::Codec(CodecError::Corrupted(reason.into()))
}

fn ensure_consumed(input: &MessageReader<'_>, what: &str) -> Result<()> {
    if input.has_remaining() {
        return Err(corrupted(format!(
            "{} trailing bytes after {what}",
            input.remaining()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cpwire_codec::TypedAttributeMap;

    use super::*;

    const CODEC: MethodCodec = MethodCodec::new();

    #[test]
    fn method_call_round_trip() {
        let mut values = TypedAttributeMap::new();
        values.insert("title", "song");
        let call = MethodCall::new("insert", vec![Value::from("content://media"), values.into()]);
        let bytes = CODEC.encode_method_call(&call).unwrap();
        assert_eq!(bytes[0], 7);
        assert_eq!(CODEC.decode_method_call(&bytes).unwrap(), call);
    }

    #[test]
    fn method_name_must_be_string() {
        let mut out = MessageWriter::new();
        ExtendedCodec::new().write_value(&mut out, &Value::from(3)).unwrap();
        ExtendedCodec::new().write_value(&mut out, &Value::Null).unwrap();
        let err = CODEC.decode_method_call(&out.finish()).unwrap_err();
        assert!(matches!(err, RpcError::Codec(CodecError::Corrupted(_))));
    }

    #[test]
    fn method_call_with_trailing_bytes_is_corrupted() {
        let mut bytes = CODEC
            .encode_method_call(&MethodCall::new("m", Value::Null))
            .unwrap()
            .to_vec();
        bytes.push(0);
        assert!(CODEC.decode_method_call(&bytes).is_err());
    }

    #[test]
    fn success_envelope() {
        let bytes = CODEC.encode_success_envelope(&Value::from(9)).unwrap();
        assert_eq!(bytes.as_ref(), &[0, 3, 9, 0, 0, 0]);
        assert_eq!(CODEC.decode_envelope(&bytes).unwrap(), Value::from(9));
    }

    #[test]
    fn error_envelope() {
        let bytes = CODEC
            .encode_error_envelope("denied", Some("no access"), &Value::from(1))
            .unwrap();
        assert_eq!(bytes[0], 1);
        match CODEC.decode_envelope(&bytes).unwrap_err() {
            RpcError::Remote {
                code,
                message,
                details,
            } => {
                assert_eq!(code, "denied");
                assert_eq!(message, "no access");
                assert_eq!(details, Value::from(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_envelope_without_message() {
        let bytes = CODEC
            .encode_error_envelope("x", None, &Value::Null)
            .unwrap();
        assert!(matches!(
            CODEC.decode_envelope(&bytes),
            Err(RpcError::Remote { ref message, .. }) if message.is_empty()
        ));
    }

    #[test]
    fn bad_envelopes_are_corrupted() {
        for bytes in [&[][..], &[2, 0][..], &[0][..], &[0, 0, 0][..], &[1, 3, 0, 0, 0, 0, 0, 0][..]] {
            assert!(
                matches!(
                    CODEC.decode_envelope(bytes),
                    Err(RpcError::Codec(CodecError::Corrupted(_)))
                ),
                "{bytes:?}"
            );
        }
    }
}
