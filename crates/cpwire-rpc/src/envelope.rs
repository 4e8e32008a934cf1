//! Reply records for channel-per-method APIs.
//!
//! A reply is a map holding either `result` or `error`. The error record
//! always carries `message`, `code` and `details`.

use cpwire_codec::{CodecError, Value, ValueMap};

use crate::error::RpcError;

const RESULT_KEY: &str = "result";
const ERROR_KEY: &str = "error";
const MESSAGE_KEY: &str = "message";
const CODE_KEY: &str = "code";
const DETAILS_KEY: &str = "details";

/// Failure categories used by the built-in error constructors.
pub mod codes {
    pub const ARGUMENT_ERROR: &str = "ArgumentError";
    pub const ILLEGAL_STATE: &str = "IllegalState";
    pub const NOT_IMPLEMENTED: &str = "NotImplemented";
    pub const PANIC: &str = "Panic";
    pub const CODEC_ERROR: &str = "CodecError";
}

/// An application-level failure reported back to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(codes::ARGUMENT_ERROR, message)
    }

    /// A required argument was null.
    pub fn null_argument(name: &str) -> Self {
        Self::argument(format!("{name} unexpectedly null"))
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(codes::ILLEGAL_STATE, message)
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        Self::new(codes::NOT_IMPLEMENTED, what)
    }

    pub(crate) fn panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Self::new(codes::PANIC, message)
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        let code = match err {
            CodecError::Corrupted(_) => codes::ARGUMENT_ERROR,
            CodecError::Unsupported(_) => codes::CODEC_ERROR,
        };
        Self::new(code, err.to_string())
    }
}

/// Outcome of one remote method invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Value),
    Failure(ApiError),
}

impl Reply {
    /// The reply record as sent on the wire.
    pub fn to_value(&self) -> Value {
        let mut record = ValueMap::with_capacity(1);
        match self {
            Reply::Success(value) => {
                record.insert(RESULT_KEY, value.clone());
            }
            Reply::Failure(err) => {
                let mut error = ValueMap::with_capacity(3);
                error.insert(MESSAGE_KEY, err.message.as_str());
                error.insert(CODE_KEY, err.code.as_str());
                error.insert(DETAILS_KEY, err.details.clone());
                record.insert(ERROR_KEY, error);
            }
        }
        Value::Map(record)
    }

    /// Interpret a decoded reply record.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let Value::Map(record) = value else {
            return Err(RpcError::MalformedReply(format!(
                "expected a map, got {}",
                value.kind()
            )));
        };
        if let Some(error) = record.get_str(ERROR_KEY) {
            let fields = error
                .as_map()
                .ok_or_else(|| RpcError::MalformedReply("error record is not a map".into()))?;
            let code = fields
                .get_str(CODE_KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| RpcError::MalformedReply("error record has no code".into()))?;
            let message = match fields.get_str(MESSAGE_KEY) {
                Some(Value::String(message)) => message.clone(),
                None | Some(Value::Null) => String::new(),
                Some(other) => {
                    return Err(RpcError::MalformedReply(format!(
                        "error message is a {}",
                        other.kind()
                    )))
                }
            };
            let details = fields.get_str(DETAILS_KEY).cloned().unwrap_or(Value::Null);
            return Ok(Reply::Failure(ApiError {
                code: code.to_string(),
                message,
                details,
            }));
        }
        match record.get_str(RESULT_KEY) {
            Some(result) => Ok(Reply::Success(result.clone())),
            None => Err(RpcError::MalformedReply(
                "reply has neither result nor error".into(),
            )),
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self {
            Reply::Success(value) => Ok(value),
            Reply::Failure(err) => Err(RpcError::Remote {
                code: err.code,
                message: err.message,
                details: err.details,
            }),
        }
    }
}

impl From<Result<Value, ApiError>> for Reply {
    fn from(result: Result<Value, ApiError>) -> Self {
        match result {
            Ok(value) => Reply::Success(value),
            Err(err) => Reply::Failure(err),
        }
    }
}

/// Split a positional argument list into exactly `N` values.
///
/// ```
/// use cpwire_codec::Value;
/// use cpwire_rpc::envelope::take_arguments;
///
/// let [a, b] = take_arguments::<2>(vec![Value::from(1), Value::Null]).unwrap();
/// assert_eq!(a, Value::Int32(1));
/// assert!(b.is_null());
/// assert!(take_arguments::<1>(Vec::new()).is_err());
/// ```
pub fn take_arguments<const N: usize>(args: Vec<Value>) -> Result<[Value; N], ApiError> {
    let got = args.len();
    <[Value; N]>::try_from(args)
        .map_err(|_| ApiError::argument(format!("expected {N} arguments, got {got}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_record_layout() {
        let value = Reply::Success(Value::from("ok")).to_value();
        let record = value.as_map().unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get_str("result"), Some(&Value::from("ok")));
    }

    #[test]
    fn null_result_is_still_success() {
        let value = Reply::Success(Value::Null).to_value();
        assert_eq!(Reply::from_value(value).unwrap(), Reply::Success(Value::Null));
    }

    #[test]
    fn failure_record_has_null_details() {
        let value = Reply::Failure(ApiError::illegal_state("closed")).to_value();
        let error = value.as_map().unwrap().get_str("error").unwrap().as_map().unwrap();
        assert_eq!(error.get_str("message"), Some(&Value::from("closed")));
        assert_eq!(error.get_str("code"), Some(&Value::from("IllegalState")));
        assert_eq!(error.get_str("details"), Some(&Value::Null));
    }

    #[test]
    fn failure_becomes_remote_error() {
        let reply = Reply::from_value(Reply::Failure(ApiError::argument("bad")).to_value()).unwrap();
        match reply.into_result() {
            Err(RpcError::Remote { code, message, details }) => {
                assert_eq!(code, "ArgumentError");
                assert_eq!(message, "bad");
                assert!(details.is_null());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_records_rejected() {
        assert!(matches!(
            Reply::from_value(Value::from(3)),
            Err(RpcError::MalformedReply(_))
        ));
        assert!(matches!(
            Reply::from_value(Value::Map(ValueMap::new())),
            Err(RpcError::MalformedReply(_))
        ));
        let bad_error: ValueMap = [("error", "text")].into_iter().collect();
        assert!(matches!(
            Reply::from_value(Value::Map(bad_error)),
            Err(RpcError::MalformedReply(_))
        ));
    }

    #[test]
    fn panic_payload_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(ApiError::panic(payload.as_ref()).message, "static str");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(ApiError::panic(payload.as_ref()).message, "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(5u8);
        assert_eq!(ApiError::panic(payload.as_ref()).code, "Panic");
    }
}
