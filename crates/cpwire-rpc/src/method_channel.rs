//! Multi-method channels.
//!
//! One [`MethodChannel`] carries many methods: each message is a
//! [`MethodCall`] and each reply a result envelope. A handler that does not
//! know a method answers [`MethodResult::NotImplemented`], which reaches the
//! caller as a missing reply.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use cpwire_codec::Value;

use crate::completion::call_blocking;
use crate::envelope::ApiError;
use crate::error::{Result, RpcError};
use crate::messenger::{BinaryMessenger, MessageHandler, ReplySender};
use crate::method::{MethodCall, MethodCodec};

/// Code of error envelopes produced for handler failures the handler did
/// not report itself.
pub const HANDLER_ERROR_CODE: &str = "error";

/// What a method handler answers.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Success(Value),
    Error {
        code: String,
        message: Option<String>,
        details: Value,
    },
    NotImplemented,
}

impl From<std::result::Result<Value, ApiError>> for MethodResult {
    fn from(result: std::result::Result<Value, ApiError>) -> Self {
        match result {
            Ok(value) => MethodResult::Success(value),
            Err(err) => MethodResult::Error {
                code: err.code,
                message: Some(err.message),
                details: err.details,
            },
        }
    }
}

pub trait MethodCallHandler: Send + Sync {
    fn on_method_call(&self, call: MethodCall) -> MethodResult;
}

impl<F> MethodCallHandler for F
where
    F: Fn(MethodCall) -> MethodResult + Send + Sync,
{
    fn on_method_call(&self, call: MethodCall) -> MethodResult {
        self(call)
    }
}

/// A named channel carrying method calls.
#[derive(Clone)]
pub struct MethodChannel {
    messenger: Arc<dyn BinaryMessenger>,
    name: String,
    codec: MethodCodec,
}

impl MethodChannel {
    pub fn new(messenger: Arc<dyn BinaryMessenger>, name: impl Into<String>) -> Self {
        Self::with_codec(messenger, name, MethodCodec::new())
    }

    pub fn with_codec(
        messenger: Arc<dyn BinaryMessenger>,
        name: impl Into<String>,
        codec: MethodCodec,
    ) -> Self {
        Self {
            messenger,
            name: name.into(),
            codec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke `method` and deliver the outcome to `callback`.
    ///
    /// A missing reply is reported as [`RpcError::NotImplemented`].
    pub fn invoke(
        &self,
        method: &str,
        arguments: impl Into<Value>,
        callback: impl FnOnce(Result<Value>) + Send + 'static,
    ) {
        let call = MethodCall::new(method, arguments);
        let message = match self.codec.encode_method_call(&call) {
            Ok(message) => message,
            Err(err) => return callback(Err(err)),
        };
        let codec = self.codec;
        let method = call.method;
        self.messenger.send(
            &self.name,
            message,
            ReplySender::with_outcome(move |outcome| {
                callback(match outcome {
                    Ok(Some(envelope)) => codec.decode_envelope(&envelope),
                    Ok(None) => Err(RpcError::NotImplemented(method)),
                    Err(err) => Err(err),
                })
            }),
        );
    }

    /// Install `handler`, or remove the current one with `None`.
    pub fn set_method_handler(&self, handler: Option<Arc<dyn MethodCallHandler>>) {
        let handler = handler.map(|handler| {
            Arc::new(IncomingCallHandler {
                channel: self.name.clone(),
                codec: self.codec,
                handler,
            }) as Arc<dyn MessageHandler>
        });
        self.messenger.set_handler(&self.name, handler);
    }
}

impl fmt::Debug for MethodChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodChannel")
            .field("name", &self.name)
            .finish()
    }
}

/// Blocking front end of a [`MethodChannel`].
#[derive(Clone, Debug)]
pub struct SyncChannel {
    channel: MethodChannel,
}

impl SyncChannel {
    pub fn new(messenger: Arc<dyn BinaryMessenger>, name: impl Into<String>) -> Self {
        Self {
            channel: MethodChannel::new(messenger, name),
        }
    }

    pub fn channel(&self) -> &MethodChannel {
        &self.channel
    }

    /// Invoke `method` and block the calling thread until the reply arrives.
    pub fn invoke(&self, method: &str, arguments: impl Into<Value>) -> Result<Value> {
        let arguments = arguments.into();
        call_blocking(self.channel.messenger.as_ref(), |done| {
            self.channel.invoke(method, arguments, done)
        })
    }
}

impl From<MethodChannel> for SyncChannel {
    fn from(channel: MethodChannel) -> Self {
        Self { channel }
    }
}

struct IncomingCallHandler {
    channel: String,
    codec: MethodCodec,
    handler: Arc<dyn MethodCallHandler>,
}

impl IncomingCallHandler {
    fn run(&self, message: &[u8]) -> MethodResult {
        let call = match self.codec.decode_method_call(message) {
            Ok(call) => call,
            Err(err) => {
                return MethodResult::Error {
                    code: HANDLER_ERROR_CODE.to_string(),
                    message: Some(err.to_string()),
                    details: Value::Null,
                }
            }
        };
        let method = call.method.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_method_call(call))) {
            Ok(result) => result,
            Err(payload) => {
                let err = ApiError::panic(payload.as_ref());
                tracing::error!(
                    channel = %self.channel,
                    method = %method,
                    error = %err.message,
                    "method handler panicked"
                );
                MethodResult::Error {
                    code: HANDLER_ERROR_CODE.to_string(),
                    message: Some(err.message),
                    details: Value::Null,
                }
            }
        }
    }
}

impl MessageHandler for IncomingCallHandler {
    fn handle(&self, message: Bytes, reply: ReplySender) {
        let encoded = match self.run(&message) {
            MethodResult::Success(value) => self.codec.encode_success_envelope(&value),
            MethodResult::Error {
                code,
                message,
                details,
            } => {
                tracing::warn!(channel = %self.channel, code = %code, "method call failed");
                self.codec
                    .encode_error_envelope(&code, message.as_deref(), &details)
            }
            MethodResult::NotImplemented => return reply.none(),
        };
        match encoded {
            Ok(bytes) => reply.send(bytes),
            Err(err) => {
                tracing::warn!(channel = %self.channel, error = %err, "result not encodable");
                match self.codec.encode_error_envelope(
                    HANDLER_ERROR_CODE,
                    Some(&err.to_string()),
                    &Value::Null,
                ) {
                    Ok(bytes) => reply.send(bytes),
                    Err(_) => reply.none(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::LocalMessenger;

    fn channel() -> SyncChannel {
        let messenger: Arc<dyn BinaryMessenger> = Arc::new(LocalMessenger::new().unwrap());
        let sync = SyncChannel::new(messenger, "cpwire/test");
        sync.channel()
            .set_method_handler(Some(Arc::new(|call: MethodCall| match call.method.as_str() {
                "echo" => MethodResult::Success(call.arguments),
                "deny" => Err(ApiError::new("denied", "not allowed")).into(),
                "boom" => panic!("exploded"),
                _ => MethodResult::NotImplemented,
            })));
        sync
    }

    #[test]
    fn sync_invoke_returns_result() {
        let sync = channel();
        assert_eq!(sync.invoke("echo", "hi").unwrap(), Value::from("hi"));
    }

    #[test]
    fn handler_error_maps_to_remote() {
        let sync = channel();
        match sync.invoke("deny", Value::Null).unwrap_err() {
            RpcError::Remote { code, message, .. } => {
                assert_eq!(code, "denied");
                assert_eq!(message, "not allowed");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let sync = channel();
        assert!(matches!(
            sync.invoke("what", Value::Null),
            Err(RpcError::NotImplemented(ref m)) if m == "what"
        ));
    }

    #[test]
    fn panic_becomes_error_envelope() {
        let sync = channel();
        assert!(matches!(
            sync.invoke("boom", Value::Null),
            Err(RpcError::Remote { ref code, .. }) if code == HANDLER_ERROR_CODE
        ));
        assert_eq!(sync.invoke("echo", 1).unwrap(), Value::from(1));
    }

    #[test]
    fn removed_handler_is_not_implemented() {
        let sync = channel();
        sync.channel().set_method_handler(None);
        assert!(matches!(
            sync.invoke("echo", 1),
            Err(RpcError::NotImplemented(_))
        ));
    }

    #[test]
    fn async_invoke_delivers_callback() {
        let sync = channel();
        let (tx, rx) = std::sync::mpsc::channel();
        sync.channel()
            .invoke("echo", vec![Value::from(1), Value::Null], move |r| {
                tx.send(r).unwrap()
            });
        assert_eq!(
            rx.recv().unwrap().unwrap(),
            Value::List(vec![Value::from(1), Value::Null])
        );
    }
}
