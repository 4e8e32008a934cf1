use std::time::Duration;

use cpwire_codec::{CodecError, Value};

/// Errors that can occur while making or serving a call.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Encoding or decoding a message failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Frame-level error on a stream transport.
    #[error("frame error: {0}")]
    Frame(#[from] cpwire_frame::FrameError),

    /// The remote handler failed and replied with an error record.
    #[error("remote error {code}: {message}")]
    Remote {
        code: String,
        message: String,
        details: Value,
    },

    /// The remote side has no implementation for the method.
    #[error("method {0} not implemented")]
    NotImplemented(String),

    /// The channel produced no reply (nothing bound on the other side).
    #[error("no reply on channel {0}")]
    NoReply(String),

    /// The reply could not be interpreted.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// A blocking call was made from the thread that dispatches handlers.
    #[error("synchronous call from the dispatch thread would deadlock")]
    WouldDeadlock,

    /// The remote peer could not send its reply and said so.
    #[error("reply on channel {channel} could not be delivered: {reason}")]
    ReplyFailed { channel: String, reason: String },

    /// The stream peer is gone.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// No reply within the configured call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// Starting a thread or controlling a stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RpcError>;
