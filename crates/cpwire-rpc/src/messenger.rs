//! Named-channel message passing.
//!
//! A [`BinaryMessenger`] moves opaque encoded messages between a sender and
//! whatever handler is bound to the destination channel. Every message gets at
//! most one reply, delivered through a single-use [`ReplySender`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, RpcError};
use crate::task_queue::TaskQueue;

type ReplyCallback = Box<dyn FnOnce(Result<Option<Bytes>>) + Send + 'static>;

/// Single-use reply callback.
///
/// `None` means the message produced no reply. Dropping a sender without
/// calling [`send`](Self::send) delivers `None`. A transport that could not
/// carry the message or its reply reports that through [`fail`](Self::fail).
pub struct ReplySender {
    callback: Option<ReplyCallback>,
}

impl ReplySender {
    /// Callback for replies only. Delivery failures arrive as `None`.
    pub fn new(callback: impl FnOnce(Option<Bytes>) + Send + 'static) -> Self {
        Self::with_outcome(move |outcome| {
            callback(outcome.unwrap_or_else(|err| {
                tracing::debug!(error = %err, "delivery failed, reporting no reply");
                None
            }))
        })
    }

    /// Callback that also observes delivery failures.
    pub fn with_outcome(callback: impl FnOnce(Result<Option<Bytes>>) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// A sender that discards whatever it receives.
    pub fn ignore() -> Self {
        Self { callback: None }
    }

    pub fn send(mut self, reply: Bytes) {
        self.complete(Ok(Some(reply)));
    }

    /// Complete with no reply.
    pub fn none(mut self) {
        self.complete(Ok(None));
    }

    /// Complete with a delivery failure.
    pub fn fail(mut self, err: RpcError) {
        self.complete(Err(err));
    }

    fn complete(&mut self, outcome: Result<Option<Bytes>>) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

impl Drop for ReplySender {
    fn drop(&mut self) {
        self.complete(Ok(None));
    }
}

impl fmt::Debug for ReplySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySender")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// Receives messages sent to a bound channel.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: Bytes, reply: ReplySender);
}

impl<F> MessageHandler for F
where
    F: Fn(Bytes, ReplySender) + Send + Sync,
{
    fn handle(&self, message: Bytes, reply: ReplySender) {
        self(message, reply)
    }
}

/// Transport for encoded messages on named channels.
pub trait BinaryMessenger: Send + Sync {
    /// Send `message` to `channel`. `reply` fires exactly once.
    fn send(&self, channel: &str, message: Bytes, reply: ReplySender);

    /// Bind `handler` to `channel`, or unbind it with `None`.
    fn set_handler(&self, channel: &str, handler: Option<Arc<dyn MessageHandler>>);

    /// True when the current thread is the one handlers run on.
    fn is_dispatch_thread(&self) -> bool {
        false
    }

    /// Upper bound for blocking calls made through this messenger.
    fn call_timeout(&self) -> Option<Duration> {
        None
    }

    /// Release sends whose call timeout has passed. Their reply senders
    /// complete with [`RpcError::Timeout`].
    fn expire_overdue(&self) {}
}

/// In-process messenger.
///
/// Handlers run one at a time on a dedicated worker thread, in the order
/// their messages were sent. Sending to a channel with no handler completes
/// the reply with `None`.
pub struct LocalMessenger {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    queue: TaskQueue,
}

impl LocalMessenger {
    pub fn new() -> Result<Self> {
        Self::with_thread_name("cpwire-dispatch")
    }

    pub fn with_thread_name(name: &str) -> Result<Self> {
        Ok(Self {
            handlers: RwLock::new(HashMap::new()),
            queue: TaskQueue::spawn(name)?,
        })
    }

    /// Whether a handler is bound to `channel`.
    pub fn has_handler(&self, channel: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(channel)
    }

    /// Stop dispatching. Messages already queued still run.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}

impl BinaryMessenger for LocalMessenger {
    fn send(&self, channel: &str, message: Bytes, reply: ReplySender) {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned();
        let Some(handler) = handler else {
            tracing::debug!(channel, "no handler bound, dropping message");
            reply.none();
            return;
        };
        let queued = self
            .queue
            .execute(move || handler.handle(message, reply));
        if !queued {
            tracing::warn!(channel, "dispatch queue stopped, message dropped");
        }
    }

    fn set_handler(&self, channel: &str, handler: Option<Arc<dyn MessageHandler>>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handler {
            Some(handler) => {
                tracing::debug!(channel, "binding channel");
                handlers.insert(channel.to_string(), handler);
            }
            None => {
                tracing::debug!(channel, "unbinding channel");
                handlers.remove(channel);
            }
        }
    }

    fn is_dispatch_thread(&self) -> bool {
        self.queue.is_current()
    }
}

impl fmt::Debug for LocalMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self
            .handlers
            .read()
            .map(|h| h.len())
            .unwrap_or_default();
        f.debug_struct("LocalMessenger")
            .field("channels", &channels)
            .field("queue", &self.queue)
            .finish()
    }
}
