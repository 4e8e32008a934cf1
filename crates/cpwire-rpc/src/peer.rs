//! Messenger over a byte stream.
//!
//! A [`StreamPeer`] joins a local messenger to a remote one across any
//! `Read`/`Write` pair. Requests from the remote side are dispatched to the
//! local messenger and answered with a reply or no-reply frame carrying the
//! same id. Outgoing sends are matched to their reply by id.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use cpwire_frame::{Frame, FrameConfig, FrameError, FrameKind, FrameReader, FrameWriter};

use crate::error::{Result, RpcError};
use crate::messenger::{BinaryMessenger, MessageHandler, ReplySender};

/// Stream peer settings.
#[derive(Debug, Clone, Default)]
pub struct PeerConfig {
    pub frame: FrameConfig,
    /// Bound for every request sent through the peer. `None` waits forever.
    pub call_timeout: Option<Duration>,
}

type Closer = Box<dyn Fn() -> std::io::Result<()> + Send + Sync>;

struct Shared {
    writer: Mutex<FrameWriter<Box<dyn Write + Send>>>,
    pending: Mutex<Pending>,
    next_id: AtomicU32,
    closed: AtomicBool,
    local: Arc<dyn BinaryMessenger>,
    config: PeerConfig,
}

#[derive(Default)]
struct Pending {
    replies: HashMap<u32, Waiting>,
    closed: bool,
}

struct Waiting {
    reply: ReplySender,
    deadline: Option<Instant>,
}

/// A messenger whose remote end sits on the other side of a stream.
pub struct StreamPeer {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closer: Option<Closer>,
}

impl StreamPeer {
    /// Start serving `reader` and `writer`.
    ///
    /// Incoming requests go to `local`; its handlers answer them.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        local: Arc<dyn BinaryMessenger>,
        config: PeerConfig,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::spawn_inner(reader, Box::new(writer), local, config, None)
    }

    /// Serve a connected Unix stream. [`shutdown`](Self::shutdown) closes it.
    #[cfg(unix)]
    pub fn over_unix_stream(
        stream: std::os::unix::net::UnixStream,
        local: Arc<dyn BinaryMessenger>,
        config: PeerConfig,
    ) -> Result<Self> {
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        let closer: Closer = Box::new(move || control.shutdown(std::net::Shutdown::Both));
        Self::spawn_inner(reader, Box::new(stream), local, config, Some(closer))
    }

    fn spawn_inner<R>(
        reader: R,
        writer: Box<dyn Write + Send>,
        local: Arc<dyn BinaryMessenger>,
        config: PeerConfig,
        closer: Option<Closer>,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let shared = Arc::new(Shared {
            writer: Mutex::new(FrameWriter::with_config(writer, config.frame.clone())),
            pending: Mutex::new(Pending::default()),
            next_id: AtomicU32::new(1),
            closed: AtomicBool::new(false),
            local,
            config,
        });
        let frames = FrameReader::with_config(reader, shared.config.frame.clone());
        let weak = Arc::downgrade(&shared);
        let handle = thread::Builder::new()
            .name("cpwire-peer-reader".to_string())
            .spawn(move || read_loop(weak, frames))?;
        Ok(Self {
            shared,
            reader: Mutex::new(Some(handle)),
            closer,
        })
    }

    /// True once the stream has closed or failed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of sends still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.lock_pending().replies.len()
    }

    /// Block until the reader thread has stopped.
    pub fn wait_closed(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("peer reader thread panicked");
            }
        }
    }

    /// Close the underlying stream, if the peer owns a way to, and wait for
    /// the reader to stop. Pending sends complete with no reply.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(closer) = &self.closer {
            if let Err(err) = closer() {
                if err.kind() != std::io::ErrorKind::NotConnected {
                    return Err(err.into());
                }
            }
            self.wait_closed();
        }
        self.shared.close();
        Ok(())
    }
}

impl Drop for StreamPeer {
    fn drop(&mut self) {
        if self.closer.is_some() {
            let _ = self.shutdown();
        }
    }
}

impl fmt::Debug for StreamPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPeer")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

impl BinaryMessenger for StreamPeer {
    fn send(&self, channel: &str, message: Bytes, reply: ReplySender) {
        self.shared.send(channel, message, reply);
    }

    /// Handlers bound here answer requests arriving from the remote side.
    fn set_handler(&self, channel: &str, handler: Option<Arc<dyn MessageHandler>>) {
        self.shared.local.set_handler(channel, handler);
    }

    fn is_dispatch_thread(&self) -> bool {
        self.shared.local.is_dispatch_thread()
    }

    fn call_timeout(&self) -> Option<Duration> {
        self.shared.config.call_timeout
    }

    fn expire_overdue(&self) {
        self.shared.expire_overdue();
    }
}

impl Shared {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, channel: &str, message: Bytes, reply: ReplySender) {
        self.expire_overdue();
        let id = {
            let mut pending = self.lock_pending();
            if pending.closed {
                drop(pending);
                tracing::debug!(channel, "peer closed, send refused");
                return reply.fail(RpcError::Disconnected(format!(
                    "stream closed before sending on {channel}"
                )));
            }
            let mut id = self.next_id.fetch_add(1, Ordering::Relaxed);
            while id == 0 || pending.replies.contains_key(&id) {
                id = self.next_id.fetch_add(1, Ordering::Relaxed);
            }
            let deadline = self
                .config
                .call_timeout
                .and_then(|timeout| Instant::now().checked_add(timeout));
            pending.replies.insert(id, Waiting { reply, deadline });
            id
        };
        if let Err(err) = self.write(&Frame::request(id, channel, message)) {
            tracing::warn!(channel, id, error = %err, "failed to send request");
            let waiting = self.lock_pending().replies.remove(&id);
            if let Some(waiting) = waiting {
                waiting.reply.fail(err.into());
            }
        }
    }

    fn expire_overdue(&self) {
        let Some(timeout) = self.config.call_timeout else {
            return;
        };
        let now = Instant::now();
        let expired: Vec<(u32, Waiting)> = {
            let mut pending = self.lock_pending();
            let overdue: Vec<u32> = pending
                .replies
                .iter()
                .filter(|(_, waiting)| waiting.deadline.is_some_and(|deadline| deadline <= now))
                .map(|(id, _)| *id)
                .collect();
            overdue
                .into_iter()
                .filter_map(|id| pending.replies.remove(&id).map(|waiting| (id, waiting)))
                .collect()
        };
        for (id, waiting) in expired {
            tracing::debug!(id, "request expired without reply");
            waiting.reply.fail(RpcError::Timeout(timeout));
        }
    }

    fn write(&self, frame: &Frame) -> std::result::Result<(), FrameError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_frame(frame)
    }

    fn dispatch(self: &Arc<Self>, frame: Frame) {
        match frame.kind {
            FrameKind::Request => {
                let Frame {
                    id,
                    channel,
                    payload,
                    ..
                } = frame;
                let weak = Arc::downgrade(self);
                let reply_channel = channel.clone();
                self.local.send(
                    &channel,
                    payload,
                    ReplySender::new(move |reply| {
                        if let Some(shared) = weak.upgrade() {
                            shared.answer(id, reply_channel, reply);
                        }
                    }),
                );
            }
            FrameKind::Reply | FrameKind::NoReply | FrameKind::Failure => {
                let waiting = self.lock_pending().replies.remove(&frame.id);
                let Some(Waiting { reply, .. }) = waiting else {
                    tracing::debug!(
                        channel = %frame.channel,
                        id = frame.id,
                        "reply for unknown request"
                    );
                    return;
                };
                match frame.kind {
                    FrameKind::Reply => reply.send(frame.payload),
                    FrameKind::Failure => reply.fail(RpcError::ReplyFailed {
                        reason: String::from_utf8_lossy(&frame.payload).into_owned(),
                        channel: frame.channel,
                    }),
                    _ => reply.none(),
                }
            }
        }
    }

    fn answer(&self, id: u32, channel: String, reply: Option<Bytes>) {
        let frame = match reply {
            Some(payload) => Frame::reply(id, channel, payload),
            None => Frame::no_reply(id, channel),
        };
        let err = match self.write(&frame) {
            Ok(()) => return,
            Err(err) => err,
        };
        tracing::warn!(channel = %frame.channel, id, error = %err, "failed to send reply");
        if !err.is_rejection() {
            return;
        }
        // The stream is intact; the caller still gets exactly one answer.
        let fallbacks = [
            Frame::failure(id, frame.channel.as_str(), err.to_string()),
            Frame::no_reply(id, frame.channel.as_str()),
        ];
        for fallback in fallbacks {
            match self.write(&fallback) {
                Ok(()) => return,
                Err(err) if err.is_rejection() => continue,
                Err(err) => {
                    tracing::warn!(
                        channel = %frame.channel,
                        id,
                        error = %err,
                        "failed to report reply failure"
                    );
                    return;
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let orphaned = {
            let mut pending = self.lock_pending();
            pending.closed = true;
            std::mem::take(&mut pending.replies)
        };
        if !orphaned.is_empty() {
            tracing::debug!(count = orphaned.len(), "completing pending sends without reply");
        }
        drop(orphaned);
    }
}

fn read_loop<R: Read>(shared: Weak<Shared>, mut frames: FrameReader<R>) {
    loop {
        let result = frames.read_frame();
        let Some(peer) = shared.upgrade() else {
            return;
        };
        match result {
            Ok(frame) => peer.dispatch(frame),
            Err(FrameError::ConnectionClosed) => {
                tracing::debug!("peer stream closed");
                peer.close();
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "peer stream failed");
                peer.close();
                return;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;

    use super::*;
    use crate::messenger::LocalMessenger;

    fn pair() -> (StreamPeer, StreamPeer) {
        pair_with(PeerConfig::default(), PeerConfig::default())
    }

    fn pair_with(left: PeerConfig, right: PeerConfig) -> (StreamPeer, StreamPeer) {
        let (a, b) = UnixStream::pair().unwrap();
        let left =
            StreamPeer::over_unix_stream(a, Arc::new(LocalMessenger::new().unwrap()), left)
                .unwrap();
        let right =
            StreamPeer::over_unix_stream(b, Arc::new(LocalMessenger::new().unwrap()), right)
                .unwrap();
        (left, right)
    }

    fn small_frames(max_payload_size: usize) -> PeerConfig {
        PeerConfig {
            frame: FrameConfig { max_payload_size },
            ..PeerConfig::default()
        }
    }

    fn send_outcome(peer: &StreamPeer, channel: &str, message: Bytes) -> Result<Option<Bytes>> {
        let (tx, rx) = mpsc::channel();
        peer.send(
            channel,
            message,
            ReplySender::with_outcome(move |outcome| tx.send(outcome).unwrap()),
        );
        rx.recv().unwrap()
    }

    fn send(peer: &StreamPeer, channel: &str, message: &'static [u8]) -> Option<Bytes> {
        let (tx, rx) = mpsc::channel();
        peer.send(
            channel,
            Bytes::from_static(message),
            ReplySender::new(move |reply| tx.send(reply).unwrap()),
        );
        rx.recv().unwrap()
    }

    #[test]
    fn request_reaches_remote_handler() {
        let (left, right) = pair();
        right.set_handler(
            "upper",
            Some(Arc::new(|message: Bytes, reply: ReplySender| {
                reply.send(Bytes::from(message.to_ascii_uppercase()))
            })),
        );
        assert_eq!(send(&left, "upper", b"abc").as_deref(), Some(&b"ABC"[..]));
        assert_eq!(left.pending_calls(), 0);
    }

    #[test]
    fn unbound_remote_channel_is_no_reply() {
        let (left, _right) = pair();
        assert_eq!(send(&left, "nothing", b"x"), None);
    }

    #[test]
    fn both_directions_share_one_stream() {
        let (left, right) = pair();
        left.set_handler(
            "side",
            Some(Arc::new(|_: Bytes, reply: ReplySender| reply.send(Bytes::from_static(b"left")))),
        );
        right.set_handler(
            "side",
            Some(Arc::new(|_: Bytes, reply: ReplySender| reply.send(Bytes::from_static(b"right")))),
        );
        assert_eq!(send(&left, "side", b"").as_deref(), Some(&b"right"[..]));
        assert_eq!(send(&right, "side", b"").as_deref(), Some(&b"left"[..]));
    }

    #[test]
    fn close_completes_pending_sends() {
        let (left, right) = pair();
        // Never replies until the stream is gone.
        let (hold_tx, hold_rx) = mpsc::channel::<ReplySender>();
        let hold_tx = Mutex::new(hold_tx);
        right.set_handler(
            "hold",
            Some(Arc::new(move |_: Bytes, reply: ReplySender| {
                let _ = hold_tx.lock().unwrap().send(reply);
            })),
        );

        let (tx, rx) = mpsc::channel();
        left.send(
            "hold",
            Bytes::from_static(b"wait"),
            ReplySender::new(move |reply| tx.send(reply).unwrap()),
        );
        let held = hold_rx.recv().unwrap();
        assert_eq!(left.pending_calls(), 1);

        right.shutdown().unwrap();
        assert_eq!(rx.recv().unwrap(), None);
        left.wait_closed();
        assert!(left.is_closed());
        drop(held);

        assert!(matches!(
            send_outcome(&left, "hold", Bytes::from_static(b"late")),
            Err(RpcError::Disconnected(_))
        ));
        assert_eq!(left.pending_calls(), 0);
    }

    #[test]
    fn oversized_reply_is_reported_to_caller() {
        let (left, right) = pair_with(PeerConfig::default(), small_frames(64));
        right.set_handler(
            "big",
            Some(Arc::new(|_: Bytes, reply: ReplySender| {
                reply.send(Bytes::from(vec![0u8; 1024]))
            })),
        );

        match send_outcome(&left, "big", Bytes::new()) {
            Err(RpcError::ReplyFailed { channel, reason }) => {
                assert_eq!(channel, "big");
                assert!(reason.contains("payload too large"), "{reason}");
            }
            other => panic!("expected a failed reply, got {other:?}"),
        }
        assert_eq!(left.pending_calls(), 0);

        // The stream survives the rejected reply.
        right.set_handler(
            "small",
            Some(Arc::new(|_: Bytes, reply: ReplySender| reply.send(Bytes::from_static(b"ok")))),
        );
        assert_eq!(send(&left, "small", b"").as_deref(), Some(&b"ok"[..]));
    }

    #[test]
    fn rejected_failure_report_falls_back_to_no_reply() {
        // Too small even for the failure description.
        let (left, right) = pair_with(PeerConfig::default(), small_frames(4));
        right.set_handler(
            "big",
            Some(Arc::new(|_: Bytes, reply: ReplySender| {
                reply.send(Bytes::from(vec![0u8; 64]))
            })),
        );
        assert!(matches!(send_outcome(&left, "big", Bytes::new()), Ok(None)));
        assert_eq!(left.pending_calls(), 0);
    }

    #[test]
    fn oversized_request_fails_with_frame_error() {
        let (left, right) = pair_with(small_frames(8), PeerConfig::default());
        right.set_handler(
            "sink",
            Some(Arc::new(|message: Bytes, reply: ReplySender| reply.send(message))),
        );

        let outcome = send_outcome(&left, "sink", Bytes::from(vec![1u8; 32]));
        assert!(matches!(
            outcome,
            Err(RpcError::Frame(FrameError::PayloadTooLarge { size: 32, max: 8 }))
        ));
        assert_eq!(left.pending_calls(), 0);
        assert_eq!(send(&left, "sink", b"tiny").as_deref(), Some(&b"tiny"[..]));
    }

    #[test]
    fn overdue_sends_expire() {
        let config = PeerConfig {
            call_timeout: Some(Duration::from_millis(10)),
            ..PeerConfig::default()
        };
        let (left, right) = pair_with(config, PeerConfig::default());
        let (hold_tx, hold_rx) = mpsc::channel::<ReplySender>();
        let hold_tx = Mutex::new(hold_tx);
        right.set_handler(
            "hold",
            Some(Arc::new(move |_: Bytes, reply: ReplySender| {
                let _ = hold_tx.lock().unwrap().send(reply);
            })),
        );

        let (tx, rx) = mpsc::channel();
        left.send(
            "hold",
            Bytes::new(),
            ReplySender::with_outcome(move |outcome| tx.send(outcome).unwrap()),
        );
        let held = hold_rx.recv().unwrap();
        assert_eq!(left.pending_calls(), 1);

        std::thread::sleep(Duration::from_millis(30));
        left.expire_overdue();
        assert!(matches!(rx.recv().unwrap(), Err(RpcError::Timeout(_))));
        assert_eq!(left.pending_calls(), 0);

        // A reply arriving after expiry is ignored.
        held.send(Bytes::from_static(b"late"));
    }
}
