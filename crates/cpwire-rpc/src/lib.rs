//! Remote calls over named channels.
//!
//! Layers, bottom up:
//! - [`BinaryMessenger`]: moves encoded messages between channels, with one
//!   optional reply per message. [`LocalMessenger`] dispatches in-process,
//!   [`StreamPeer`] across a byte stream.
//! - [`Api`]: one channel per method, arguments as a list, replies as
//!   `result`/`error` records.
//! - [`MethodChannel`]: many methods on one channel using [`MethodCodec`]
//!   envelopes, with a blocking [`SyncChannel`] front end.

pub mod api;
mod completion;
pub mod envelope;
pub mod error;
pub mod messenger;
pub mod method;
pub mod method_channel;
pub mod peer;
pub mod resolver;
pub mod task_queue;

pub use api::{Api, MethodFn};
pub use envelope::{take_arguments, ApiError, Reply};
pub use error::{Result, RpcError};
pub use messenger::{BinaryMessenger, LocalMessenger, MessageHandler, ReplySender};
pub use method::{MethodCall, MethodCodec};
pub use method_channel::{MethodCallHandler, MethodChannel, MethodResult, SyncChannel};
pub use peer::{PeerConfig, StreamPeer};
pub use task_queue::TaskQueue;
