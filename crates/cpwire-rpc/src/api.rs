//! Channel-per-method APIs.
//!
//! Each method of an [`Api`] owns the channel `cpwire.<api>.<method>`. A call
//! sends its positional arguments as one list and receives one reply record
//! (see [`Reply`]).

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use cpwire_codec::{ExtendedCodec, Value};
use cpwire_frame::method_channel;

use crate::completion::call_blocking;
use crate::envelope::{ApiError, Reply};
use crate::error::{Result, RpcError};
use crate::messenger::{BinaryMessenger, MessageHandler, ReplySender};

/// Handler for one method: positional arguments in, result or failure out.
pub type MethodFn = dyn Fn(Vec<Value>) -> std::result::Result<Value, ApiError> + Send + Sync;

/// A named group of methods bound on one messenger.
#[derive(Clone)]
pub struct Api {
    messenger: Arc<dyn BinaryMessenger>,
    name: String,
    codec: ExtendedCodec,
}

impl Api {
    pub fn new(messenger: Arc<dyn BinaryMessenger>, name: impl Into<String>) -> Self {
        Self::with_codec(messenger, name, ExtendedCodec::new())
    }

    pub fn with_codec(
        messenger: Arc<dyn BinaryMessenger>,
        name: impl Into<String>,
        codec: ExtendedCodec,
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

    pub fn messenger(&self) -> &Arc<dyn BinaryMessenger> {
        &self.messenger
    }

    /// Channel carrying `method`.
    pub fn channel(&self, method: &str) -> String {
        method_channel(&self.name, method)
    }

    /// Bind `handler` to `method`. `None` unbinds it.
    pub fn bind(&self, method: &str, handler: Option<Arc<MethodFn>>) {
        let channel = self.channel(method);
        let handler = handler.map(|handler| {
            Arc::new(MethodHandler {
                channel: channel.clone(),
                codec: self.codec,
                handler,
            }) as Arc<dyn MessageHandler>
        });
        self.messenger.set_handler(&channel, handler);
    }

    /// Send a call and deliver its outcome to `callback`.
    pub fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
        callback: impl FnOnce(Result<Value>) + Send + 'static,
    ) {
        let channel = self.channel(method);
        let message = match self.codec.encode(&Value::List(args)) {
            Ok(message) => message,
            Err(err) => return callback(Err(err.into())),
        };
        let codec = self.codec;
        let reply_channel = channel.clone();
        self.messenger.send(
            &channel,
            message,
            ReplySender::with_outcome(move |outcome| {
                callback(outcome.and_then(|reply| read_reply(&codec, &reply_channel, reply)))
            }),
        );
    }

    /// Send a call and block until its reply arrives.
    ///
    /// Fails with [`RpcError::WouldDeadlock`] on the messenger's dispatch
    /// thread, since the reply could never be processed there.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        call_blocking(self.messenger.as_ref(), |done| self.invoke(method, args, done))
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api").field("name", &self.name).finish()
    }
}

fn read_reply(codec: &ExtendedCodec, channel: &str, reply: Option<Bytes>) -> Result<Value> {
    let bytes = reply.ok_or_else(|| RpcError::NoReply(channel.to_string()))?;
    let value = codec.decode(&bytes)?;
    Reply::from_value(value)?.into_result()
}

struct MethodHandler {
    channel: String,
    codec: ExtendedCodec,
    handler: Arc<MethodFn>,
}

impl MethodHandler {
    fn run(&self, message: &[u8]) -> Reply {
        let args = match self.codec.decode(message) {
            Ok(Value::List(args)) => args,
            Ok(Value::Null) => Vec::new(),
            Ok(other) => {
                return Reply::Failure(ApiError::argument(format!(
                    "arguments must be a list, got {}",
                    other.kind()
                )))
            }
            Err(err) => return Reply::Failure(err.into()),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(args))) {
            Ok(outcome) => outcome.into(),
            Err(payload) => Reply::Failure(ApiError::panic(payload.as_ref())),
        }
    }
}

impl MessageHandler for MethodHandler {
    fn handle(&self, message: Bytes, reply: ReplySender) {
        let outcome = self.run(&message);
        if let Reply::Failure(err) = &outcome {
            tracing::warn!(channel = %self.channel, code = %err.code, error = %err.message, "method failed");
        }
        let encoded = self.codec.encode(&outcome.to_value()).or_else(|err| {
            tracing::warn!(channel = %self.channel, error = %err, "result not encodable");
            self.codec.encode(&Reply::Failure(err.into()).to_value())
        });
        match encoded {
            Ok(bytes) => reply.send(bytes),
            Err(err) => {
                tracing::error!(channel = %self.channel, error = %err, "reply not encodable");
                reply.none();
            }
        }
    }
}
