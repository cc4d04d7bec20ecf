//! Per-connection event router.
//!
//! An [`EventRouter`] owns one connection's read and write halves:
//!
//! - Inbound frames are decoded into [`InboundEvent`]s and dispatched to the
//!   handler registered for their [`EventKind`]. Handler failures, unknown
//!   kinds, and undecodable frames are answered with an error frame and the
//!   loop keeps reading.
//! - Outbound messages go through an [`Outbox`], a cloneable handle onto a
//!   bounded channel drained by a single writer task. Any number of tasks
//!   may hold an outbox; the writer task serializes their frames onto the
//!   transport.
//!
//! The router is transport-agnostic. It reads any `Stream` of [`Frame`]s and
//! writes any `Sink` of them.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use palaver_core::{ChatError, EventKind, InboundEvent, OutboundMessage};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::WS_OUTBOX_DROPS_TOTAL;

/// How long a single write may block before the transport is treated as
/// dead. Also bounds how long [`EventRouter::close`] waits for the flush.
pub const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A transport frame, independent of the WebSocket library in use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload. Decoded the same way as text.
    Binary(Vec<u8>),
    /// Liveness check.
    Ping(Vec<u8>),
    /// Liveness reply.
    Pong(Vec<u8>),
    /// Peer or server is closing the connection.
    Close,
}

/// Boxed future returned by event handlers.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ChatError>> + Send + 'a>>;

/// An event handler operating on per-connection state `S`.
pub type Handler<S> = for<'a> fn(&'a mut S, InboundEvent) -> HandlerFuture<'a>;

/// Router tuning.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Outbound frames buffered before new ones are dropped.
    pub outbound_buffer: usize,
    /// Ping interval. `None` disables the heartbeat.
    pub heartbeat: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            heartbeat: Some(Duration::from_secs(30)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbox
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable write handle for one connection.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Frame>,
    closed: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl Outbox {
    /// Create an outbox and the receiving end its frames arrive on.
    ///
    /// Cancelling `closed` makes further sends fail.
    pub fn channel(buffer: usize, closed: CancellationToken) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let outbox = Self {
            tx,
            closed,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (outbox, rx)
    }

    /// Serialize `message` and queue it as a text frame.
    ///
    /// Returns `false` if the connection is closing or its buffer is full.
    /// Failures are logged, never raised.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        if self.closed.is_cancelled() {
            debug!("outbox closed, dropping frame");
            return false;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "failed to serialize outbound message");
                return false;
            }
        };
        match self.tx.try_send(Frame::Text(text)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(WS_OUTBOX_DROPS_TOTAL).increment(1);
                warn!(dropped, "outbound buffer full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("writer gone, dropping frame");
                false
            }
        }
    }

    /// Ask the connection to shut down. Queued frames are still flushed.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Frames dropped because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Frame decoding and handler dispatch for one connection.
pub struct EventRouter<S> {
    handlers: HashMap<EventKind, Handler<S>>,
    outbox: Outbox,
    shutdown: CancellationToken,
    last_seen: Arc<Mutex<Instant>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Send> EventRouter<S> {
    /// Create a router writing to `sink` and spawn its writer task.
    ///
    /// Cancelling `shutdown` (or calling [`close`](Self::close)) stops both
    /// the read loop and the writer.
    pub fn new<W>(sink: W, config: &RouterConfig, shutdown: CancellationToken) -> Self
    where
        W: Sink<Frame> + Send + Unpin + 'static,
        W::Error: Display,
    {
        let (outbox, rx) = Outbox::channel(config.outbound_buffer, shutdown.clone());
        let last_seen = Arc::new(Mutex::new(Instant::now()));
        let writer = tokio::spawn(write_loop(
            sink,
            rx,
            shutdown.clone(),
            config.heartbeat,
            Arc::clone(&last_seen),
        ));
        Self {
            handlers: HashMap::new(),
            outbox,
            shutdown,
            last_seen,
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Bind `handler` to `kind`, replacing any previous binding.
    pub fn register_handler(&mut self, kind: EventKind, handler: Handler<S>) {
        if self.handlers.insert(kind, handler).is_some() {
            debug!(%kind, "handler replaced");
        }
    }

    /// Queue an outbound message on this connection.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        self.outbox.send(message)
    }

    /// A write handle that outlives borrows of the router.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Read and dispatch frames until the transport ends or the router closes.
    pub async fn run<R, E>(&self, state: &mut S, mut frames: R)
    where
        R: Stream<Item = Result<Frame, E>> + Unpin,
        E: Display,
    {
        loop {
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!("router closed, leaving read loop");
                    break;
                }
                next = frames.next() => next,
            };

            *self.last_seen.lock() = Instant::now();
            match next {
                None => {
                    debug!("transport ended");
                    break;
                }
                Some(Err(error)) => {
                    info!(%error, "transport error");
                    break;
                }
                Some(Ok(Frame::Close)) => {
                    debug!("client sent close frame");
                    break;
                }
                Some(Ok(Frame::Text(text))) => self.dispatch(state, text.as_bytes()).await,
                Some(Ok(Frame::Binary(data))) => self.dispatch(state, &data).await,
                Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => {}
            }
        }
    }

    async fn dispatch(&self, state: &mut S, raw: &[u8]) {
        let event = match InboundEvent::decode(raw) {
            Ok(event) => event,
            Err(error) => {
                debug!(%error, len = raw.len(), "rejecting inbound frame");
                let _ = self.send(&error.to_outbound());
                return;
            }
        };

        let kind = event.kind;
        let Some(handler) = self.handlers.get(&kind).copied() else {
            let _ = self.send(&ChatError::UnknownEvent(kind.to_string()).to_outbound());
            return;
        };

        if let Err(error) = handler(state, event).await {
            debug!(%kind, %error, "handler failed");
            let _ = self.send(&error.to_outbound());
        }
    }

    /// Stop reading, flush queued frames, and release the transport.
    ///
    /// A transport that accepts nothing for [`WRITER_DRAIN_TIMEOUT`] has its
    /// writer aborted and unsent frames discarded. Idempotent. Later calls
    /// return immediately.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let writer = self.writer.lock().take();
        let Some(mut writer) = writer else {
            return;
        };
        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(%error, "writer task failed"),
            Err(_) => {
                warn!(timeout = ?WRITER_DRAIN_TIMEOUT, "transport stalled, aborting writer");
                writer.abort();
            }
        }
    }

    /// Whether the router has been asked to close.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Writer task
// ─────────────────────────────────────────────────────────────────────────────

async fn write_loop<W>(
    mut sink: W,
    mut rx: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
    heartbeat: Option<Duration>,
    last_seen: Arc<Mutex<Instant>>,
) where
    W: Sink<Frame> + Send + Unpin + 'static,
    W::Error: Display,
{
    let mut ping = heartbeat.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if !send_frame(&mut sink, frame).await {
                    shutdown.cancel();
                    return;
                }
            }
            () = tick(ping.as_mut()) => {
                // Two silent intervals means the peer stopped answering pings.
                if let Some(period) = heartbeat {
                    if last_seen.lock().elapsed() > period * 2 {
                        warn!(?period, "client unresponsive, disconnecting");
                        shutdown.cancel();
                        break;
                    }
                }
                if !send_frame(&mut sink, Frame::Ping(Vec::new())).await {
                    shutdown.cancel();
                    return;
                }
            }
        }
    }

    while let Ok(frame) = rx.try_recv() {
        if sink.send(frame).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Frame::Close).await;
    let _ = sink.close().await;
}

/// Write one frame. A transport still blocked after [`WRITER_DRAIN_TIMEOUT`]
/// counts as failed.
async fn send_frame<W>(sink: &mut W, frame: Frame) -> bool
where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sink.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            debug!(%error, "transport write failed");
            false
        }
        Err(_) => {
            warn!(timeout = ?WRITER_DRAIN_TIMEOUT, "transport write stalled");
            false
        }
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
