//! # Connection Context
//!
//! Per-connection state shared by the application, the I/O tasks and the
//! dispatch workers: the outbound FIFO, the pending-call table, the call id
//! counter and the close flag.
//!
//! A context exists before its transport does. Calls issued while connecting
//! are encoded immediately and wait in the outbound buffer; the writer task
//! flushes them in submission order once a stream is attached with
//! [`ConnectionContext::run`].
//!
//! ## I/O model
//! `run` splits the stream into a reader and a writer:
//! - the reader assembles frames, decodes messages inline and hands every
//!   message (responses included) to the queueing strategy;
//! - the writer drains the outbound buffer whenever it is notified.
//!
//! A framing or decoding failure closes the connection: the byte stream cannot
//! be realigned, so nothing after the fault is trusted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use once_cell::sync::OnceCell;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{OutboundConfig, OutboundPolicy};
use crate::core::codec::FrameCodec;
use crate::core::encoding::ValueCodec;
use crate::error::constants::ERR_NO_RUNTIME;
use crate::error::{BosonError, CallError, Result, TransportError};
use crate::protocol::message::{Message, MessageKind, Payload};
use crate::protocol::queue::{QueueEntry, QueueingStrategy};
use crate::service::pending::{PendingCall, PendingCalls};
use crate::utils::metrics::global_metrics;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub type ConnectionListener = Arc<dyn Fn(&ConnectionContext) + Send + Sync>;
pub type ErrorListener = Arc<dyn Fn(&ConnectionContext, &BosonError) + Send + Sync>;

/// Lifecycle callbacks. Each fires at most once per connection.
#[derive(Clone, Default)]
pub struct Listeners {
    pub on_connected: Option<ConnectionListener>,
    pub on_disconnected: Option<ConnectionListener>,
    pub on_error: Option<ErrorListener>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Overrides the configured call timeout. `None` inherits it.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[derive(Debug)]
struct OutboundFrame {
    call_id: Option<u64>,
    bytes: Bytes,
}

/// Encoded frames waiting for the writer.
#[derive(Debug)]
struct OutboundBuffer {
    frames: Mutex<VecDeque<OutboundFrame>>,
    ready: Notify,
    config: OutboundConfig,
}

impl OutboundBuffer {
    fn new(config: OutboundConfig) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            config,
        }
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<OutboundFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame, applying the overflow policy. Returns the evicted frame
    /// under `DropOldest`.
    fn push(&self, frame: OutboundFrame) -> Result<Option<OutboundFrame>> {
        let evicted = {
            let mut frames = self.frames();
            let full = frames.len() >= self.config.capacity;
            let evicted = match self.config.policy {
                OutboundPolicy::Unbounded => None,
                OutboundPolicy::RejectNew if full => {
                    return Err(TransportError::BufferFull(self.config.capacity).into());
                }
                OutboundPolicy::RejectNew => None,
                OutboundPolicy::DropOldest if full => frames.pop_front(),
                OutboundPolicy::DropOldest => None,
            };
            frames.push_back(frame);
            evicted
        };
        self.ready.notify_one();
        Ok(evicted)
    }

    fn pop(&self) -> Option<OutboundFrame> {
        self.frames().pop_front()
    }

    fn clear(&self) -> usize {
        let mut frames = self.frames();
        let dropped = frames.len();
        frames.clear();
        dropped
    }

    fn len(&self) -> usize {
        self.frames().len()
    }
}

struct ConnectionShared {
    id: u64,
    peer: OnceCell<String>,
    codec: Arc<ValueCodec>,
    outbound: OutboundBuffer,
    pending: Arc<PendingCalls>,
    next_call_id: AtomicU64,
    call_timeout: Option<Duration>,
    connected: AtomicBool,
    closed: AtomicBool,
    token: CancellationToken,
    listeners: Listeners,
    runtime: Handle,
}

/// Cheaply cloneable handle to one connection.
#[derive(Clone)]
pub struct ConnectionContext {
    shared: Arc<ConnectionShared>,
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.shared.id)
            .field("peer", &self.shared.peer.get())
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .field("pending", &self.shared.pending.len())
            .finish()
    }
}

impl ConnectionContext {
    pub(crate) fn new(
        codec: Arc<ValueCodec>,
        outbound: OutboundConfig,
        call_timeout: Option<Duration>,
        listeners: Listeners,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(ConnectionShared {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                peer: OnceCell::new(),
                codec,
                outbound: OutboundBuffer::new(outbound),
                pending: Arc::new(PendingCalls::new()),
                next_call_id: AtomicU64::new(1),
                call_timeout,
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                token: CancellationToken::new(),
                listeners,
                runtime,
            }),
        }
    }

    /// A context with default settings and no transport. Frames accumulate in
    /// the outbound buffer until the context is closed.
    pub fn detached(codec: Arc<ValueCodec>) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|_| BosonError::Custom(ERR_NO_RUNTIME.to_string()))?;
        Ok(Self::new(
            codec,
            OutboundConfig::default(),
            None,
            Listeners::default(),
            runtime,
        ))
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn peer(&self) -> Option<&str> {
        self.shared.peer.get().map(String::as_str)
    }

    pub(crate) fn set_peer(&self, peer: impl Into<String>) {
        let _ = self.shared.peer.set(peer.into());
    }

    pub fn codec(&self) -> &Arc<ValueCodec> {
        &self.shared.codec
    }

    pub fn pending(&self) -> &Arc<PendingCalls> {
        &self.shared.pending
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire) && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Frames encoded but not yet written.
    pub fn outbound_len(&self) -> usize {
        self.shared.outbound.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BosonError::closed());
        }
        Ok(())
    }

    fn next_call_id(&self) -> u64 {
        self.shared.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    fn push_frame(&self, call_id: Option<u64>, bytes: Bytes) -> Result<()> {
        let evicted = self.shared.outbound.push(OutboundFrame { call_id, bytes })?;
        if let Some(OutboundFrame {
            call_id: Some(evicted_id),
            ..
        }) = evicted
        {
            warn!(
                connection_id = self.id(),
                call_id = evicted_id,
                "Outbound buffer full, dropped oldest call"
            );
            self.shared
                .pending
                .resolve(evicted_id, Err(CallError::Cancelled.into()));
        } else if evicted.is_some() {
            warn!(connection_id = self.id(), "Outbound buffer full, dropped oldest frame");
        }
        Ok(())
    }

    /// Issue a request; `callback` receives the response, a remote error, a
    /// timeout or a connection failure, exactly once.
    ///
    /// Succeeds while the connection is still being established. Fails
    /// synchronously, without calling `callback`, if the context is closed,
    /// the message cannot be encoded, or a `RejectNew` buffer is full.
    pub fn invoke<F>(&self, method: impl Into<String>, payload: Payload, callback: F) -> Result<u64>
    where
        F: FnOnce(Result<Payload>) + Send + 'static,
    {
        self.invoke_with(method, payload, CallOptions::default(), callback)
    }

    pub fn invoke_with<F>(
        &self,
        method: impl Into<String>,
        payload: Payload,
        options: CallOptions,
        callback: F,
    ) -> Result<u64>
    where
        F: FnOnce(Result<Payload>) + Send + 'static,
    {
        self.ensure_open()?;
        let call_id = self.next_call_id();
        let message = Message::request(call_id, method, payload);
        let bytes = message.encode(&self.shared.codec)?;

        let timeout = options.timeout.or(self.shared.call_timeout);
        let pending = &self.shared.pending;
        pending.insert(PendingCall::new(call_id, timeout, Box::new(callback)));

        if let Err(e) = self.push_frame(Some(call_id), bytes) {
            pending.cancel(call_id);
            return Err(e);
        }

        // Raced with close(): either we take the call back, or close already failed it.
        if self.is_closed() && pending.cancel(call_id).is_some() {
            return Err(BosonError::closed());
        }

        if let Some(after) = timeout {
            pending.arm_timeout(call_id, after, &self.shared.runtime);
        }
        global_metrics().call_issued();
        debug!(connection_id = self.id(), call_id, method = %message.method, "Call issued");
        Ok(call_id)
    }

    /// Send a one-way message. No response is expected and nothing is tracked.
    pub fn notify(&self, method: impl Into<String>, payload: Payload) -> Result<u64> {
        self.ensure_open()?;
        let call_id = self.next_call_id();
        let bytes = Message::one_way(call_id, method, payload).encode(&self.shared.codec)?;
        self.push_frame(None, bytes)?;
        global_metrics().one_way_issued();
        trace!(connection_id = self.id(), call_id, "One-way message queued");
        Ok(call_id)
    }

    /// Issue a request and wait for its outcome.
    pub async fn call(&self, method: impl Into<String>, payload: Payload) -> Result<Payload> {
        self.call_with(method, payload, CallOptions::default()).await
    }

    pub async fn call_with(
        &self,
        method: impl Into<String>,
        payload: Payload,
        options: CallOptions,
    ) -> Result<Payload> {
        let (tx, rx) = oneshot::channel();
        self.invoke_with(method, payload, options, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        rx.await
            .map_err(|_| BosonError::from(CallError::Cancelled))?
    }

    /// Answer `request`. A reply that cannot be encoded becomes an error reply.
    pub fn respond(&self, request: &Message, payload: Payload) -> Result<()> {
        self.ensure_open()?;
        match Message::response_to(request, payload).encode(&self.shared.codec) {
            Ok(bytes) => self.push_frame(None, bytes),
            Err(e) => {
                warn!(connection_id = self.id(), call_id = request.call_id, error = %e, "Reply not encodable");
                self.respond_error(request, e.to_string())
            }
        }
    }

    pub fn respond_error(&self, request: &Message, reason: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let bytes = Message::error_to(request, reason).encode(&self.shared.codec)?;
        self.push_frame(None, bytes)
    }

    /// Deliver a `Response` or `Error` to its pending call.
    pub(crate) fn complete_call(&self, message: Message) {
        let call_id = message.call_id;
        let outcome = match message.kind {
            MessageKind::Error => Err(CallError::Remote(message.error_reason()).into()),
            _ => Ok(message.payload),
        };
        if !self.shared.pending.resolve(call_id, outcome) {
            debug!(connection_id = self.id(), call_id, "Discarding late or unknown response");
        }
    }

    /// Close the connection and fail every outstanding call with `ConnectionClosed`.
    ///
    /// Safe to call from any thread, any number of times.
    pub fn close(&self) {
        self.close_with(BosonError::closed);
    }

    fn close_with<F>(&self, make_error: F)
    where
        F: Fn() -> BosonError,
    {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.token.cancel();
        let dropped = self.shared.outbound.clear();
        let failed = self.shared.pending.fail_all(make_error);
        info!(
            connection_id = self.id(),
            failed_calls = failed,
            dropped_frames = dropped,
            "Connection closed"
        );
    }

    /// Report `err` to the error listener and close.
    pub(crate) fn fail(&self, err: BosonError) {
        if self.is_closed() {
            return;
        }
        if err.is_connection_fatal() {
            error!(connection_id = self.id(), error = %err, "Peer sent malformed data");
        } else {
            warn!(connection_id = self.id(), error = %err, "Connection failed");
        }
        if let Some(listener) = &self.shared.listeners.on_error {
            listener(self, &err);
        }
        self.close();
    }

    /// The transport could not be established.
    pub(crate) fn fail_connect(&self, reason: String) {
        let err = BosonError::from(TransportError::ConnectError(reason.clone()));
        error!(connection_id = self.id(), error = %err, "Connect failed");
        if let Some(listener) = &self.shared.listeners.on_error {
            listener(self, &err);
        }
        self.close_with(|| TransportError::ConnectError(reason.clone()).into());
    }

    /// Drive `stream` until either side closes or the context is closed.
    #[instrument(skip_all, fields(connection_id = self.id()))]
    pub(crate) async fn run<S>(&self, stream: S, strategy: Arc<dyn QueueingStrategy>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.is_closed() {
            debug!("Closed before the transport was ready");
            return;
        }

        let metrics = global_metrics();
        metrics.connection_established();
        self.shared.connected.store(true, Ordering::Release);
        info!(peer = ?self.peer(), queued = self.outbound_len(), "Connection established");
        if let Some(listener) = &self.shared.listeners.on_connected {
            listener(self);
        }

        let codec = FrameCodec::new(self.shared.codec.limits().max_frame_size);
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, codec);
        let mut writer = FramedWrite::new(write_half, codec);

        tokio::join!(
            self.read_loop(&mut reader, strategy),
            self.write_loop(&mut writer)
        );

        self.shared.connected.store(false, Ordering::Release);
        metrics.connection_closed();
        if let Some(listener) = &self.shared.listeners.on_disconnected {
            listener(self);
        }
    }

    async fn read_loop<R>(
        &self,
        reader: &mut FramedRead<R, FrameCodec>,
        strategy: Arc<dyn QueueingStrategy>,
    ) where
        R: AsyncRead + Unpin,
    {
        let metrics = global_metrics();
        loop {
            let next = tokio::select! {
                _ = self.shared.token.cancelled() => break,
                next = reader.next() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    metrics.decode_error();
                    self.fail(e);
                    break;
                }
                None => {
                    debug!("Peer closed the stream");
                    break;
                }
            };
            metrics.frame_received(frame.len() as u64);

            match Message::decode(&frame.payload, &self.shared.codec) {
                Ok(message) => {
                    trace!(call_id = message.call_id, kind = ?message.kind, "Message received");
                    strategy.enqueue(QueueEntry {
                        connection: self.clone(),
                        message,
                    });
                }
                Err(e) => {
                    metrics.decode_error();
                    self.fail(e);
                    break;
                }
            }
        }
        self.close();
    }

    async fn write_loop<W>(&self, writer: &mut FramedWrite<W, FrameCodec>)
    where
        W: AsyncWrite + Unpin,
    {
        let metrics = global_metrics();
        loop {
            let mut wrote = false;
            while let Some(frame) = self.shared.outbound.pop() {
                let len = frame.bytes.len() as u64;
                if let Err(e) = writer.feed(frame.bytes).await {
                    self.fail(e);
                    return;
                }
                metrics.frame_sent(len);
                wrote = true;
            }
            if wrote {
                if let Err(e) = SinkExt::<Bytes>::flush(&mut *writer).await {
                    self.fail(e);
                    return;
                }
            }

            tokio::select! {
                _ = self.shared.token.cancelled() => break,
                _ = self.shared.outbound.ready.notified() => {}
            }
        }
        if let Err(e) = SinkExt::<Bytes>::close(&mut *writer).await {
            trace!(error = %e, "Shutdown of write half failed");
        }
    }
}
