//! Frame transport: owns one WebSocket and moves whole SHIP frames across it.
//!
//! Two background tasks serve each transport:
//! - the read worker enforces the read deadline and hands binary messages to
//!   a single-slot inbound queue
//! - the write worker serialises outbound frames and sends a keep-alive ping
//!   after `ping_period` of write idleness
//!
//! Teardown is idempotent. Whichever path gets there first (explicit close,
//! read failure, write failure, drop) stops both workers and fires the close
//! handler exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ship_frame::{
    decode_frame, encode_frame, ConnectionClose, ConnectionClosePhase, FrameError, MessageType,
    ShipMessage,
};
use ship_transport::{Message, WebSocketStream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument};

use crate::error::{PeerError, Result};

/// Maximum silence from the peer before the transport is torn down.
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(60);
/// Write idleness after which a keep-alive ping is sent.
pub const DEFAULT_PING_PERIOD: Duration = Duration::from_secs(54);
/// Upper bound for a single socket write.
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// How long `close` waits for the peer's close confirmation.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Timing configuration for a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Reset on every inbound message (including pings and pongs).
    pub read_deadline: Duration,
    /// Should stay below `read_deadline` so an idle peer sees traffic in time.
    pub ping_period: Duration,
    pub write_deadline: Duration,
    pub close_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_deadline: DEFAULT_READ_DEADLINE,
            ping_period: DEFAULT_PING_PERIOD,
            write_deadline: DEFAULT_WRITE_DEADLINE,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Callback invoked once when the transport closes, for whatever reason.
pub type CloseHandler = Box<dyn FnOnce() + Send + 'static>;

struct Outbound {
    frame: Bytes,
    result: oneshot::Sender<Result<()>>,
}

struct Shared {
    id: u64,
    closed: AtomicBool,
    shutdown: CancellationToken,
    close_handler: StdMutex<Option<CloseHandler>>,
    /// Read failure that did not fit in the inbound queue.
    failure: StdMutex<Option<PeerError>>,
}

impl Shared {
    fn store_failure(&self, err: PeerError) {
        *self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err);
    }

    /// The stored read failure, once; `Closed` afterwards.
    fn take_failure(&self) -> PeerError {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .unwrap_or(PeerError::Closed)
    }

    fn teardown(&self, reason: &str) {
        self.shutdown.cancel();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(transport = self.id, reason, "transport closed");

        let handler = self
            .close_handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handler) = handler {
            handler();
        }
    }
}

/// A running frame transport over one WebSocket.
pub struct Transport {
    shared: Arc<Shared>,
    inbound: Mutex<mpsc::Receiver<Result<Bytes>>>,
    outbound: mpsc::Sender<Outbound>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closing: AtomicBool,
    config: TransportConfig,
}

impl Transport {
    /// Start the read and write workers on `socket`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(socket: WebSocketStream<S>, config: TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::start(socket, config, None)
    }

    /// Like [`Transport::spawn`], with a handler fired once on close.
    pub fn spawn_with_close_handler<S, F>(
        socket: WebSocketStream<S>,
        config: TransportConfig,
        on_close: F,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        Self::start(socket, config, Some(Box::new(on_close)))
    }

    fn start<S>(
        socket: WebSocketStream<S>,
        config: TransportConfig,
        on_close: Option<CloseHandler>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            close_handler: StdMutex::new(on_close),
            failure: StdMutex::new(None),
        });
        let (sink, stream) = socket.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(1);

        let span = tracing::debug_span!("ship_transport", id = shared.id);
        let reader = tokio::spawn(
            read_worker(stream, inbound_tx, Arc::clone(&shared), config.read_deadline)
                .instrument(span.clone()),
        );
        let writer = tokio::spawn(
            write_worker(sink, outbound_rx, Arc::clone(&shared), config.clone()).instrument(span),
        );
        debug!(transport = shared.id, "transport started");

        Self {
            shared,
            inbound: Mutex::new(inbound_rx),
            outbound: outbound_tx,
            workers: Mutex::new(vec![reader, writer]),
            closing: AtomicBool::new(false),
            config,
        }
    }

    /// Process-unique identifier, used in logs.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Whether teardown has happened.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether a local close or a close confirmation has started.
    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Next binary frame, or an error if `timeout` expires or the transport
    /// has failed or closed. At most one read is in flight at a time.
    pub async fn read_binary(&self, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        let Ok(mut inbound) = tokio::time::timeout_at(deadline, self.inbound.lock()).await else {
            return Err(PeerError::Timeout(timeout));
        };

        tokio::select! {
            biased;
            item = inbound.recv() => item.unwrap_or_else(|| Err(self.shared.take_failure())),
            _ = self.shared.shutdown.cancelled() => Err(self.shared.take_failure()),
            _ = tokio::time::sleep_until(deadline) => Err(PeerError::Timeout(timeout)),
        }
    }

    /// Next JSON message. Init frames are not valid here.
    pub async fn read_message(&self, timeout: Duration) -> Result<ShipMessage> {
        let frame = decode_frame(self.read_binary(timeout).await?).map_err(|err| match err {
            FrameError::EmptyFrame | FrameError::UnknownMessageType(_) => {
                PeerError::ProtocolViolation(err.to_string())
            }
            other => PeerError::Frame(other),
        })?;
        if frame.msg_type == MessageType::Init {
            return Err(PeerError::ProtocolViolation(
                "init frame after connection mode initialisation".to_string(),
            ));
        }

        let message = ShipMessage::decode(&frame.payload)?;
        trace!(
            transport = self.id(),
            kind = message.kind(),
            msg_type = %frame.msg_type,
            "message received"
        );
        Ok(message)
    }

    /// Queue one binary frame and wait for the socket write to finish.
    pub async fn write_binary(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(PeerError::Closed);
        }

        let bound = self.config.write_deadline * 2;
        let deadline = Instant::now() + bound;
        let (result, outcome) = oneshot::channel();
        match tokio::time::timeout_at(deadline, self.outbound.send(Outbound { frame, result }))
            .await
        {
            Err(_) => return Err(PeerError::Timeout(bound)),
            Ok(Err(_)) => return Err(PeerError::Closed),
            Ok(Ok(())) => {}
        }

        match tokio::time::timeout_at(deadline, outcome).await {
            Err(_) => Err(PeerError::Timeout(bound)),
            Ok(Err(_)) => Err(PeerError::Closed),
            Ok(Ok(result)) => result,
        }
    }

    /// Encode `message` under `msg_type` and write it.
    pub async fn write_message(&self, msg_type: MessageType, message: &ShipMessage) -> Result<()> {
        let body = message.to_json()?;
        let mut frame = BytesMut::new();
        encode_frame(msg_type, &body, &mut frame);
        trace!(
            transport = self.id(),
            kind = message.kind(),
            msg_type = %msg_type,
            "message sent"
        );
        self.write_binary(frame.freeze()).await
    }

    /// Write `message` under the frame type its kind travels with.
    pub async fn send(&self, message: &ShipMessage) -> Result<()> {
        self.write_message(message.message_type(), message).await
    }

    /// Orderly two-phase close: announce, wait up to `close_timeout` for the
    /// confirmation, then tear down. Safe to call repeatedly or concurrently.
    pub async fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            // Another close is running the exchange; wait for its teardown.
            let bound = self.config.close_timeout + self.config.write_deadline * 2;
            let _ = tokio::time::timeout(bound, self.shared.shutdown.cancelled()).await;
        } else if !self.is_closed() {
            let timeout = self.config.close_timeout;
            match self.send(&ConnectionClose::announce(timeout).into()).await {
                Ok(()) => self.await_close_confirm(timeout).await,
                Err(err) => debug!(transport = self.id(), error = %err, "close announce not sent"),
            }
        }
        self.shutdown().await;
        Ok(())
    }

    async fn await_close_confirm(&self, timeout: Duration) {
        match self.read_message(timeout).await {
            Ok(ShipMessage::ConnectionClose(close))
                if close.phase == ConnectionClosePhase::Confirm =>
            {
                debug!(transport = self.id(), "close confirmed by peer");
            }
            Ok(ShipMessage::ConnectionClose(_)) => {
                // Both sides announced at once.
                debug!(transport = self.id(), "simultaneous close");
                if let Err(err) = self.send(&ConnectionClose::confirm().into()).await {
                    debug!(transport = self.id(), error = %err, "close confirm not sent");
                }
            }
            Ok(other) => warn!(
                transport = self.id(),
                kind = other.kind(),
                "protocol violation: expected close confirmation"
            ),
            // A concurrent read took the confirmation and tore down.
            Err(PeerError::Closed) if self.is_closed() => {
                debug!(transport = self.id(), "transport closed while awaiting confirmation");
            }
            Err(err) => warn!(
                transport = self.id(),
                error = %err,
                "no close confirmation received"
            ),
        }
    }

    /// Answer a peer's close announcement with a confirmation and tear down.
    pub async fn accept_close(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        let result = self.send(&ConnectionClose::confirm().into()).await;
        self.shutdown().await;
        result
    }

    /// Tear down without the close exchange and wait for both workers.
    pub(crate) async fn shutdown(&self) {
        self.shared.teardown("local close");
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            if let Err(err) = worker.await {
                warn!(transport = self.id(), error = %err, "transport worker panicked");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.teardown("dropped");
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .field("config", &self.config)
            .finish()
    }
}

async fn read_worker<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    inbound: mpsc::Sender<Result<Bytes>>,
    shared: Arc<Shared>,
    read_deadline: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        let next = tokio::select! {
            _ = shared.shutdown.cancelled() => break "shutdown",
            next = tokio::time::timeout(read_deadline, stream.next()) => next,
        };

        let item = match next {
            Err(_) => Err(PeerError::Timeout(read_deadline)),
            Ok(None) => Err(PeerError::Closed),
            Ok(Some(Err(err))) => Err(PeerError::from(err)),
            Ok(Some(Ok(Message::Binary(payload)))) => Ok(Bytes::from(payload)),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)))) => continue,
            Ok(Some(Ok(Message::Close(frame)))) => {
                debug!(?frame, "peer closed websocket");
                Err(PeerError::Closed)
            }
            Ok(Some(Ok(Message::Text(_)))) => Err(PeerError::ProtocolViolation(
                "text message on ship socket".to_string(),
            )),
        };

        match item {
            Ok(payload) => {
                trace!(size = payload.len(), "frame received");
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break "shutdown",
                    sent = inbound.send(Ok(payload)) => {
                        if sent.is_err() {
                            break "receiver dropped";
                        }
                    }
                }
            }
            Err(err) => {
                debug!(error = %err, "read worker stopping");
                // A full slot means an unread frame is pending; the error is
                // kept for the read after it.
                if let Err(mpsc::error::TrySendError::Full(Err(err))) = inbound.try_send(Err(err)) {
                    shared.store_failure(err);
                }
                break "read failure";
            }
        }
    };
    shared.teardown(reason);
}

async fn write_worker<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    shared: Arc<Shared>,
    config: TransportConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        let idle = tokio::time::sleep(config.ping_period);
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break "shutdown",
            request = outbound.recv() => {
                let Some(Outbound { frame, result }) = request else {
                    break "queue closed";
                };
                let outcome =
                    send_within(&mut sink, Message::Binary(frame.to_vec()), config.write_deadline)
                        .await;
                let failed = outcome.is_err();
                let _ = result.send(outcome);
                if failed {
                    break "write failure";
                }
            }
            _ = idle => {
                if let Err(err) =
                    send_within(&mut sink, Message::Ping(Vec::new()), config.write_deadline).await
                {
                    warn!(error = %err, "keep-alive ping failed");
                    break "ping failure";
                }
                trace!("keep-alive ping sent");
            }
        }
    };

    if let Ok(Err(err)) = tokio::time::timeout(config.write_deadline, sink.close()).await {
        trace!(error = %err, "websocket close");
    }
    shared.teardown(reason);
}

async fn send_within<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    message: Message,
    deadline: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(deadline, sink.send(message)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(PeerError::Timeout(deadline)),
    }
}
