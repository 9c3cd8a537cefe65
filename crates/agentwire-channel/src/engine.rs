//! The per-connection protocol engine.
//!
//! A [`Channel`] runs three tokio tasks once started:
//! - the reader, sole owner of the stream's read half and the inbound arena
//! - the writer, sole owner of the write half and the outbound arena,
//!   draining a FIFO queue of pending writes
//! - the event dispatcher, which hands every listener invocation to the
//!   blocking pool so application callbacks never stall frame I/O
//!
//! Replies are correlated purely by frame id. Broadcast frames (frame id
//! [`BROADCAST_FRAME_ID`]) never touch the response-listener table.

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use agentwire_frame::{
    AnyMessage, CodecRegistry, FrameError, FrameReader, FrameWriter, Message, MessageKind,
    Request, BROADCAST_FRAME_ID,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::result::{ReplyResult, WriteResult};

/// One-shot callback for the reply on a specific frame id.
pub type ResponseListener = Box<dyn FnOnce(Arc<dyn AnyMessage>) + Send + Sync>;

/// Receives every decoded broadcast.
pub type BroadcastListener = Arc<dyn Fn(Arc<dyn AnyMessage>) + Send + Sync>;

/// Receives every decoded non-broadcast frame with its frame id.
pub type TrafficListener = Arc<dyn Fn(&Channel, i32, Arc<dyn AnyMessage>) + Send + Sync>;

/// Observes every message after it has been written.
pub type WriteListener = Arc<dyn Fn(i32, Arc<dyn AnyMessage>) + Send + Sync>;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;
type Job = Box<dyn FnOnce() + Send>;

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`Channel`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Running,
    Closed,
}

struct PendingWrite {
    frame_id: i32,
    message: Arc<dyn AnyMessage>,
    done: oneshot::Sender<Result<usize>>,
}

/// Stream halves and queue receivers, held until `start()` moves them into
/// the worker tasks.
struct Workers {
    reader: FrameReader<BoxedRead>,
    writer: FrameWriter<BoxedWrite>,
    writes: mpsc::UnboundedReceiver<PendingWrite>,
    events: mpsc::UnboundedReceiver<Job>,
}

#[derive(Default)]
struct Callbacks {
    broadcast: RwLock<Option<BroadcastListener>>,
    traffic: RwLock<Option<TrafficListener>>,
    written: RwLock<Option<WriteListener>>,
}

fn load<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn store<T>(slot: &RwLock<Option<T>>, value: T) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
}

struct Inner {
    id: u64,
    registry: Arc<CodecRegistry>,
    config: ChannelConfig,
    state: AtomicU8,
    next_frame_id: AtomicI32,
    listeners: DashMap<i32, ResponseListener>,
    callbacks: Callbacks,
    writes: mpsc::UnboundedSender<PendingWrite>,
    events: mpsc::UnboundedSender<Job>,
    cancel: CancellationToken,
    workers: Mutex<Option<Workers>>,
}

/// A cheaply cloneable handle to one connection's protocol engine.
///
/// Dropping handles does not close the connection; call
/// [`shutdown`](Self::shutdown) or let the peer disconnect.
///
/// The write and event queues are unbounded: a producer faster than the
/// socket, or a listener slower than the reader, grows memory without limit.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Wrap a connected stream with default configuration.
    pub fn new<S>(stream: S, registry: Arc<CodecRegistry>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_config(stream, registry, ChannelConfig::default())
    }

    /// Wrap a connected stream. The channel starts in
    /// [`ChannelState::Created`]; no I/O happens until [`start`](Self::start).
    pub fn with_config<S>(stream: S, registry: Arc<CodecRegistry>, config: ChannelConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let workers = Workers {
            reader: FrameReader::with_config(Box::new(read_half) as BoxedRead, config.frame.clone()),
            writer: FrameWriter::with_config(
                Box::new(write_half) as BoxedWrite,
                config.frame.clone(),
            ),
            writes: write_rx,
            events: event_rx,
        };

        Self {
            inner: Arc::new(Inner {
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
                registry,
                config,
                state: AtomicU8::new(CREATED),
                next_frame_id: AtomicI32::new(0),
                listeners: DashMap::new(),
                callbacks: Callbacks::default(),
                writes: write_tx,
                events: event_tx,
                cancel: CancellationToken::new(),
                workers: Mutex::new(Some(workers)),
            }),
        }
    }

    /// Process-unique id, used in logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ChannelState {
        match self.inner.state.load(Ordering::SeqCst) {
            CREATED => ChannelState::Created,
            RUNNING => ChannelState::Running,
            _ => ChannelState::Closed,
        }
    }

    /// True until the channel is closed. A created channel counts as open.
    pub fn is_open(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst) != CLOSED
    }

    /// Resolves once the channel is closed, for whatever reason.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Spawn the reader, writer and event tasks on the current runtime.
    ///
    /// No-op when already running. Fails with [`ChannelError::Closed`] once
    /// the channel has been shut down.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;

        match self.inner.state.compare_exchange(
            CREATED,
            RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(RUNNING) => return Ok(()),
            Err(_) => return Err(ChannelError::Closed),
        }

        let workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(workers) = workers else {
            return Ok(());
        };

        let span = info_span!("channel", id = self.inner.id);
        handle.spawn(read_loop(self.clone(), workers.reader).instrument(span.clone()));
        handle.spawn(
            write_loop(self.clone(), workers.writer, workers.writes).instrument(span.clone()),
        );
        handle.spawn(event_loop(self.inner.cancel.clone(), workers.events).instrument(span));

        info!(channel = self.inner.id, "channel started");
        Ok(())
    }

    /// Close the channel. Returns `true` for the call that performed the
    /// transition, `false` if it was already closed.
    ///
    /// Cancels all three workers and drops both queues and every response
    /// listener, so outstanding [`WriteResult`]s and [`ReplyResult`]s
    /// resolve to [`ChannelError::Closed`].
    pub fn shutdown(&self) -> bool {
        let previous = self
            .inner
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                (state != CLOSED).then_some(CLOSED)
            });
        if previous.is_err() {
            return false;
        }

        self.inner.cancel.cancel();
        self.inner.listeners.clear();
        // Never started: nothing else owns the stream or the queue receivers.
        drop(
            self.inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        info!(channel = self.inner.id, "channel closed");
        true
    }

    /// Allocate the next non-broadcast frame id.
    ///
    /// Ids start at 0 and strictly increase. Fails once `i32::MAX` is reached.
    pub fn next_frame_id(&self) -> Result<i32> {
        self.inner
            .next_frame_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| ChannelError::FrameIdsExhausted)
    }

    /// Queue `message` for writing and return immediately.
    ///
    /// Broadcasts go out on [`BROADCAST_FRAME_ID`]; everything else gets the
    /// next frame id.
    pub fn write<M: Message>(&self, message: M) -> Result<WriteResult> {
        self.write_arc(Arc::new(message))
    }

    /// [`write`](Self::write) for an already shared message.
    pub fn write_arc(&self, message: Arc<dyn AnyMessage>) -> Result<WriteResult> {
        self.inner.registry.lookup_for(&*message)?;
        self.ensure_open()?;
        let frame_id = match message.kind() {
            MessageKind::Broadcast => BROADCAST_FRAME_ID,
            _ => self.next_frame_id()?,
        };
        self.enqueue_write(frame_id, message)
    }

    /// Write a reply on the frame id of the request it answers.
    pub fn reply<M: Message>(&self, frame_id: i32, message: M) -> Result<WriteResult> {
        self.reply_arc(frame_id, Arc::new(message))
    }

    pub fn reply_arc(&self, frame_id: i32, message: Arc<dyn AnyMessage>) -> Result<WriteResult> {
        if frame_id == BROADCAST_FRAME_ID || message.kind() != MessageKind::Reply {
            return Err(ChannelError::InvalidReply {
                frame_id,
                message_type: message.type_name(),
            });
        }
        self.inner.registry.lookup_for(&*message)?;
        self.ensure_open()?;
        self.enqueue_write(frame_id, message)
    }

    /// Write `request` and correlate the reply on its frame id.
    ///
    /// The response listener is registered before the write is queued, so a
    /// fast reply cannot be missed.
    pub fn request<R: Request>(&self, request: R) -> Result<ReplyResult<R::Reply>> {
        let message: Arc<dyn AnyMessage> = Arc::new(request);
        self.inner.registry.lookup_for(&*message)?;
        self.ensure_open()?;

        let frame_id = self.next_frame_id()?;
        let (tx, rx) = oneshot::channel();
        self.add_response_listener(frame_id, move |reply| {
            let _ = tx.send(reply);
        })?;

        match self.enqueue_write(frame_id, message) {
            Ok(write) => Ok(ReplyResult::new(self.clone(), write, rx)),
            Err(err) => {
                self.remove_response_listener(frame_id);
                Err(err)
            }
        }
    }

    /// Send `request` and wait up to the configured reply timeout.
    pub async fn call<R: Request>(&self, request: R) -> Result<Arc<R::Reply>> {
        self.call_with_timeout(request, self.inner.config.reply_timeout)
            .await
    }

    /// Send `request` and wait up to `timeout` for its reply.
    ///
    /// A timeout closes the channel, as does any failure other than a
    /// [`ChannelError::Remote`] reply. Nothing is retried.
    pub async fn call_with_timeout<R: Request>(
        &self,
        request: R,
        timeout: Duration,
    ) -> Result<Arc<R::Reply>> {
        let pending = self.request(request)?;
        let frame_id = pending.frame_id();

        match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err @ ChannelError::Remote { .. })) => Err(err),
            Ok(Err(err)) => {
                warn!(channel = self.inner.id, frame_id, error = %err, "call failed, closing channel");
                self.shutdown();
                Err(err)
            }
            Err(_) => {
                warn!(channel = self.inner.id, frame_id, ?timeout, "reply timed out, closing channel");
                self.shutdown();
                Err(ChannelError::Timeout(timeout))
            }
        }
    }

    /// Register a one-shot listener for the frame arriving on `frame_id`.
    ///
    /// The reader removes it when that frame is delivered, so it fires at
    /// most once. Fails with [`ChannelError::ListenerExists`] while another
    /// listener still waits on the same id; that listener is left in place.
    pub fn add_response_listener<F>(&self, frame_id: i32, listener: F) -> Result<()>
    where
        F: FnOnce(Arc<dyn AnyMessage>) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        match self.inner.listeners.entry(frame_id) {
            Entry::Occupied(_) => return Err(ChannelError::ListenerExists(frame_id)),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(listener));
            }
        }
        // shutdown() flips the state before clearing the table.
        if !self.is_open() {
            self.inner.listeners.remove(&frame_id);
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    pub(crate) fn remove_response_listener(&self, frame_id: i32) -> bool {
        self.inner.listeners.remove(&frame_id).is_some()
    }

    pub fn has_response_listener(&self, frame_id: i32) -> bool {
        self.inner.listeners.contains_key(&frame_id)
    }

    /// Number of frame ids still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn set_broadcast_listener<F>(&self, listener: F)
    where
        F: Fn(Arc<dyn AnyMessage>) + Send + Sync + 'static,
    {
        store(&self.inner.callbacks.broadcast, Arc::new(listener) as BroadcastListener);
    }

    /// Observe every non-broadcast frame, in addition to any one-shot
    /// listener registered for its frame id.
    pub fn set_all_traffic_listener<F>(&self, listener: F)
    where
        F: Fn(&Channel, i32, Arc<dyn AnyMessage>) + Send + Sync + 'static,
    {
        store(&self.inner.callbacks.traffic, Arc::new(listener) as TrafficListener);
    }

    pub fn set_write_listener<F>(&self, listener: F)
    where
        F: Fn(i32, Arc<dyn AnyMessage>) + Send + Sync + 'static,
    {
        store(&self.inner.callbacks.written, Arc::new(listener) as WriteListener);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }

    fn enqueue_write(&self, frame_id: i32, message: Arc<dyn AnyMessage>) -> Result<WriteResult> {
        let (done, rx) = oneshot::channel();
        self.inner
            .writes
            .send(PendingWrite {
                frame_id,
                message,
                done,
            })
            .map_err(|_| ChannelError::Closed)?;
        Ok(WriteResult::new(frame_id, rx))
    }

    fn enqueue_event(&self, job: impl FnOnce() + Send + 'static) {
        if self.inner.events.send(Box::new(job)).is_err() {
            debug!(channel = self.inner.id, "event queue closed, callback dropped");
        }
    }

    /// Route one decoded inbound frame to its listeners.
    fn deliver(&self, frame_id: i32, message: Arc<dyn AnyMessage>) {
        if frame_id == BROADCAST_FRAME_ID {
            match load(&self.inner.callbacks.broadcast) {
                Some(listener) => self.enqueue_event(move || listener(message)),
                None => debug!(
                    channel = self.inner.id,
                    message_type = message.type_name(),
                    "broadcast without listener"
                ),
            }
            return;
        }

        let response = self.inner.listeners.remove(&frame_id).map(|(_, listener)| listener);
        let traffic = load(&self.inner.callbacks.traffic);

        if response.is_none() && message.kind() == MessageKind::Reply {
            warn!(
                channel = self.inner.id,
                frame_id,
                message_type = message.type_name(),
                "reply without waiting requester"
            );
        }

        if let Some(listener) = response {
            let message = message.clone();
            self.enqueue_event(move || listener(message));
        }
        if let Some(listener) = traffic {
            let channel = self.clone();
            self.enqueue_event(move || listener(&channel, frame_id, message));
        } else if message.kind() == MessageKind::Request {
            debug!(
                channel = self.inner.id,
                frame_id,
                message_type = message.type_name(),
                "request without traffic listener"
            );
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("pending_replies", &self.inner.listeners.len())
            .finish()
    }
}

/// Broadcasts travel on [`BROADCAST_FRAME_ID`] and nothing else does.
fn kind_matches_frame(frame_id: i32, kind: MessageKind) -> bool {
    (frame_id == BROADCAST_FRAME_ID) == (kind == MessageKind::Broadcast)
}

/// Errors that leave the stream unusable. Anything else failed while
/// encoding into the arena, before a byte reached the transport.
fn is_transport_failure(err: &FrameError) -> bool {
    matches!(err, FrameError::Io(_) | FrameError::ConnectionClosed)
}

async fn read_loop(channel: Channel, mut reader: FrameReader<BoxedRead>) {
    let cancel = channel.inner.cancel.clone();
    let registry = channel.inner.registry.clone();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = reader.read_message(&registry) => next,
        };

        match next {
            Ok((frame_id, message)) if kind_matches_frame(frame_id, message.kind()) => {
                trace!(frame_id, message_type = message.type_name(), "received");
                channel.deliver(frame_id, message);
            }
            Ok((frame_id, message)) => {
                error!(
                    channel = channel.inner.id,
                    frame_id,
                    message_type = message.type_name(),
                    "message kind does not match its frame id"
                );
                break;
            }
            Err(FrameError::ConnectionClosed) => {
                info!(channel = channel.inner.id, "peer closed the connection");
                break;
            }
            Err(err) => {
                error!(channel = channel.inner.id, error = %err, "read failed");
                break;
            }
        }
    }

    channel.shutdown();
}

async fn write_loop(
    channel: Channel,
    mut writer: FrameWriter<BoxedWrite>,
    mut queue: mpsc::UnboundedReceiver<PendingWrite>,
) {
    let cancel = channel.inner.cancel.clone();
    let registry = channel.inner.registry.clone();

    loop {
        let pending = tokio::select! {
            _ = cancel.cancelled() => return,
            pending = queue.recv() => match pending {
                Some(pending) => pending,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => return,
            written = writer.write_message(&registry, pending.frame_id, &*pending.message) => written,
        };

        match written {
            Ok(len) => {
                debug!(frame_id = pending.frame_id, len, "wrote");
                let _ = pending.done.send(Ok(len));
                if let Some(listener) = load(&channel.inner.callbacks.written) {
                    let (frame_id, message) = (pending.frame_id, pending.message);
                    channel.enqueue_event(move || listener(frame_id, message));
                }
            }
            Err(err) if !is_transport_failure(&err) => {
                warn!(frame_id = pending.frame_id, error = %err, "write rejected");
                let _ = pending.done.send(Err(err.into()));
            }
            Err(err) => {
                error!(channel = channel.inner.id, error = %err, "write failed");
                break;
            }
        }
    }

    channel.shutdown();
}

async fn event_loop(cancel: CancellationToken, mut queue: mpsc::UnboundedReceiver<Job>) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => return,
            job = queue.recv() => match job {
                Some(job) => job,
                None => return,
            },
        };
        // A panicking callback only fails its own blocking task.
        drop(tokio::task::spawn_blocking(job));
    }
}
