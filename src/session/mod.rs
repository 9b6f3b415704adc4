//! Camera session: one TCP connection to one camera endpoint
//!
//! A session owns its connection state, a latest-frame cache and an event
//! stream. Each established connection is split into read and write halves
//! and served by two tasks:
//! - receive: reads messages, decodes DATA payloads, publishes frames
//! - heartbeat: writes liveness probes and runs the frame-timeout watchdog
//!
//! Any failure moves the session to `Failed` and ends both tasks. Restoring
//! the connection is the job of [`crate::supervisor`].

mod state;
mod stats;

pub use state::{ConnectionState, FailureKind, SessionEvent};
pub use stats::SessionStats;

use crate::codec::{CodecError, FrameDecoder};
use crate::frame::Frame;
use crate::transport::{Message, TransportError, WireFormat, DEFAULT_MAX_FRAME_BYTES};
use bytes::Bytes;
use parking_lot::Mutex;
use stats::SessionCounters;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const EVENT_CAPACITY: usize = 64;
const MIN_WATCHDOG_PERIOD: Duration = Duration::from_millis(10);
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decode failed: {0}")]
    Decode(#[from] CodecError),

    #[error("decoder task failed: {0}")]
    DecoderTask(#[from] tokio::task::JoinError),

    #[error("heartbeat failed: {0}")]
    Heartbeat(#[source] TransportError),

    #[error("heartbeat write timed out after {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("no frame received for {elapsed:?} (timeout {timeout:?})")]
    FrameTimeout { elapsed: Duration, timeout: Duration },

    #[error("session stopped")]
    Stopped,
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::ConnectFailed { .. }
            | SessionError::ConnectTimeout { .. }
            | SessionError::Stopped => FailureKind::ConnectFailed,
            SessionError::Transport(e) => FailureKind::from(e),
            SessionError::Decode(_) | SessionError::DecoderTask(_) => FailureKind::DecodeFailed,
            SessionError::Heartbeat(_) | SessionError::HeartbeatTimeout(_) => {
                FailureKind::HeartbeatFailed
            }
            SessionError::FrameTimeout { .. } => FailureKind::FrameTimeout,
        }
    }
}

/// Immutable description of one camera endpoint
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    /// Human-readable camera name used in logs and events
    pub label: String,
    pub host: String,
    pub port: u16,
    pub heartbeat_interval: Duration,
    /// Maximum silence before a connected session is considered stale
    pub frame_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_frame_bytes: usize,
    pub wire_format: WireFormat,
}

impl SessionDescriptor {
    pub fn new(label: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            label: label.into(),
            host: host.into(),
            port,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            wire_format: WireFormat::default(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Handle to one camera session; clones share the same session
#[derive(Clone)]
pub struct CameraSession {
    inner: Arc<Inner>,
}

struct Inner {
    descriptor: SessionDescriptor,
    label: Arc<str>,
    decoder: Arc<dyn FrameDecoder>,

    state: watch::Sender<ConnectionState>,
    latest: watch::Sender<Option<Arc<Frame>>>,
    events: broadcast::Sender<SessionEvent>,

    last_frame_at: Mutex<Instant>,
    link: Mutex<Link>,
    connect_lock: tokio::sync::Mutex<()>,

    shutdown: CancellationToken,
    stopped: AtomicBool,
    sequence: AtomicU64,
    counters: SessionCounters,
}

/// Bookkeeping for the current connection
#[derive(Default)]
struct Link {
    epoch: u64,
    token: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

impl CameraSession {
    pub fn new(descriptor: SessionDescriptor, decoder: Arc<dyn FrameDecoder>) -> Self {
        let label: Arc<str> = Arc::from(descriptor.label.as_str());
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (latest, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                descriptor,
                label,
                decoder,
                state,
                latest,
                events,
                last_frame_at: Mutex::new(Instant::now()),
                link: Mutex::new(Link::default()),
                connect_lock: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
                stopped: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                counters: SessionCounters::default(),
            }),
        }
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.inner.descriptor
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Most recently decoded frame, if any
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.inner.latest.borrow().clone()
    }

    pub fn watch_frames(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.inner.latest.subscribe()
    }

    /// Subscribes to frame and error events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.counters.snapshot()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Token cancelled by `stop()`
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Opens the TCP connection and starts the receive and heartbeat tasks
    ///
    /// Does nothing if the session is already `Connecting` or `Connected`.
    /// On failure the session moves to `Failed` and an error event is emitted.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        let _serial = inner.connect_lock.lock().await;

        if inner.stopped.load(Ordering::SeqCst) {
            return Err(SessionError::Stopped);
        }

        let started = inner.state.send_if_modified(|state| {
            if state.can_connect() {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(camera = %inner.label, state = %self.state(), "Connect skipped");
            return Ok(());
        }

        SessionCounters::incr(&inner.counters.connect_attempts);

        let addr = inner.descriptor.address();
        let connect_timeout = inner.descriptor.connect_timeout;
        info!(camera = %inner.label, addr = %addr, "Connecting to camera");

        let attempt = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => return Err(SessionError::Stopped),
            attempt = timeout(connect_timeout, TcpStream::connect(addr.as_str())) => attempt,
        };

        let stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                let err = SessionError::ConnectFailed { addr, source };
                self.fail_connecting(&err);
                return Err(err);
            }
            Err(_) => {
                let err = SessionError::ConnectTimeout {
                    addr,
                    timeout: connect_timeout,
                };
                self.fail_connecting(&err);
                return Err(err);
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(camera = %inner.label, error = %e, "Failed to set TCP_NODELAY");
        }

        self.install(stream);
        Ok(())
    }

    /// Fails the current connection if no frame arrived within the timeout
    ///
    /// Returns `true` if this call moved the session to `Failed`.
    pub fn check_timeout(&self) -> bool {
        let epoch = self.inner.link.lock().epoch;
        self.check_timeout_for(epoch)
    }

    /// Stops the session: cancels its tasks, closes the connection and waits
    /// for everything it owns to finish
    ///
    /// Safe to call more than once; later calls return immediately. No event
    /// is emitted once this returns.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            debug!(camera = %inner.label, "Session already stopped");
            return;
        }

        info!(camera = %inner.label, "Stopping camera session");
        inner.shutdown.cancel();

        // Wait out an in-flight connect() so it cannot install a new link
        let _serial = inner.connect_lock.lock().await;

        let tasks = {
            let mut link = inner.link.lock();
            link.token = None;
            std::mem::take(&mut link.tasks)
        };

        for task in tasks {
            if let Err(e) = task.await {
                warn!(camera = %inner.label, error = %e, "Session task ended abnormally");
            }
        }

        inner.state.send_replace(ConnectionState::Disconnected);
        info!(camera = %inner.label, "Camera session stopped");
    }

    fn install(&self, stream: TcpStream) {
        let inner = &self.inner;
        let mut link = inner.link.lock();

        if inner.stopped.load(Ordering::SeqCst) {
            debug!(camera = %inner.label, "Session stopped while connecting, dropping connection");
            return;
        }

        link.tasks.retain(|task| !task.is_finished());
        if let Some(previous) = link.token.take() {
            previous.cancel();
        }

        link.epoch += 1;
        let epoch = link.epoch;
        let token = inner.shutdown.child_token();
        link.token = Some(token.clone());

        let connected = inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        });
        if !connected {
            token.cancel();
            return;
        }

        *inner.last_frame_at.lock() = Instant::now();
        SessionCounters::incr(&inner.counters.connects);

        let (reader, writer) = stream.into_split();
        let receive = tokio::spawn(self.clone().receive_loop(epoch, token.clone(), reader));
        let heartbeat = tokio::spawn(self.clone().heartbeat_loop(epoch, token, writer));
        link.tasks.push(receive);
        link.tasks.push(heartbeat);

        info!(
            camera = %inner.label,
            addr = %inner.descriptor.address(),
            epoch,
            wire_format = %inner.descriptor.wire_format,
            "Camera connected"
        );
    }

    async fn receive_loop(self, epoch: u64, token: CancellationToken, mut reader: OwnedReadHalf) {
        let inner = &self.inner;
        let format = inner.descriptor.wire_format;
        let max_frame_bytes = inner.descriptor.max_frame_bytes;

        debug!(camera = %inner.label, epoch, "Receive task started");

        loop {
            let message = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                message = format.read(&mut reader, max_frame_bytes) => message,
            };

            let payload = match message {
                Ok(Message::Data(payload)) => payload,
                Ok(Message::Heartbeat) => {
                    trace!(camera = %inner.label, "Heartbeat received");
                    continue;
                }
                Err(e) => {
                    self.fail(epoch, &SessionError::from(e));
                    break;
                }
            };

            match self.decode(payload).await {
                Ok(frame) => {
                    if token.is_cancelled() {
                        break;
                    }
                    self.publish(frame);
                }
                Err(e) => {
                    SessionCounters::incr(&inner.counters.decode_failures);
                    self.fail(epoch, &e);
                    break;
                }
            }
        }

        debug!(camera = %inner.label, epoch, "Receive task stopped");
    }

    async fn heartbeat_loop<W>(self, epoch: u64, token: CancellationToken, mut writer: W)
    where
        W: AsyncWrite + Unpin,
    {
        let inner = &self.inner;
        let descriptor = &inner.descriptor;
        let start = Instant::now();

        let heartbeat_period = descriptor.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let mut heartbeat = interval_at(start + heartbeat_period, heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let watchdog_period = (descriptor.frame_timeout / 4).max(MIN_WATCHDOG_PERIOD);
        let mut watchdog = interval_at(start + watchdog_period, watchdog_period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(camera = %inner.label, epoch, "Heartbeat task started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = watchdog.tick() => {
                    if self.check_timeout_for(epoch) {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if !self.state().is_connected() {
                        continue;
                    }

                    let format = descriptor.wire_format;
                    let sent = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        sent = send_heartbeat(&mut writer, format, heartbeat_period) => sent,
                    };

                    match sent {
                        Ok(()) => {
                            SessionCounters::incr(&inner.counters.heartbeats_sent);
                            trace!(camera = %inner.label, "Heartbeat sent");
                        }
                        Err(e) => {
                            self.fail(epoch, &e);
                            break;
                        }
                    }
                }
            }
        }

        debug!(camera = %inner.label, epoch, "Heartbeat task stopped");
    }

    async fn decode(&self, payload: Bytes) -> Result<Frame, SessionError> {
        let decoder = Arc::clone(&self.inner.decoder);
        let payload_len = payload.len();

        let image = tokio::task::spawn_blocking(move || decoder.decode(&payload)).await??;

        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Frame::new(sequence, Instant::now(), payload_len, image))
    }

    fn publish(&self, frame: Frame) {
        let inner = &self.inner;
        let sequence = frame.sequence();
        let at = frame.received_at();

        *inner.last_frame_at.lock() = at;
        inner.counters.record_frame(frame.payload_len());
        inner.latest.send_replace(Some(Arc::new(frame)));

        trace!(camera = %inner.label, sequence, "Frame published");
        self.emit(SessionEvent::FrameReceived {
            label: Arc::clone(&inner.label),
            sequence,
            at,
        });
    }

    fn check_timeout_for(&self, epoch: u64) -> bool {
        let inner = &self.inner;
        if !self.state().is_connected() {
            return false;
        }

        let elapsed = inner.last_frame_at.lock().elapsed();
        let frame_timeout = inner.descriptor.frame_timeout;
        if elapsed <= frame_timeout {
            return false;
        }

        self.fail(
            epoch,
            &SessionError::FrameTimeout {
                elapsed,
                timeout: frame_timeout,
            },
        )
    }

    /// Moves a connected session to `Failed`, at most once per connection
    fn fail(&self, epoch: u64, error: &SessionError) -> bool {
        let inner = &self.inner;
        {
            let link = inner.link.lock();
            if link.epoch != epoch {
                return false;
            }

            let failed = inner.state.send_if_modified(|state| {
                if *state == ConnectionState::Connected {
                    *state = ConnectionState::Failed;
                    true
                } else {
                    false
                }
            });
            if !failed {
                return false;
            }

            if let Some(token) = &link.token {
                token.cancel();
            }
        }

        SessionCounters::incr(&inner.counters.failures);
        warn!(
            camera = %inner.label,
            epoch,
            kind = ?error.kind(),
            error = %error,
            "Camera connection failed"
        );
        self.emit_error(error);
        true
    }

    fn fail_connecting(&self, error: &SessionError) {
        let inner = &self.inner;
        let failed = inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Failed;
                true
            } else {
                false
            }
        });
        if !failed {
            return;
        }

        SessionCounters::incr(&inner.counters.failures);
        warn!(camera = %inner.label, error = %error, "Camera connect failed");
        self.emit_error(error);
    }

    fn emit_error(&self, error: &SessionError) {
        self.emit(SessionEvent::Error {
            label: Arc::clone(&self.inner.label),
            kind: error.kind(),
            detail: error.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        // Sending fails only when nobody subscribed
        let _ = self.inner.events.send(event);
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("label", &self.inner.label)
            .field("addr", &self.inner.descriptor.address())
            .field("state", &self.state())
            .finish()
    }
}

/// Writes one liveness probe, giving up after `limit`
async fn send_heartbeat<W>(
    writer: &mut W,
    format: WireFormat,
    limit: Duration,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    match timeout(limit, format.write(writer, &Message::Heartbeat)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Heartbeat(e)),
        Err(_) => Err(SessionError::HeartbeatTimeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JpegCodec;

    fn session_for(port: u16) -> CameraSession {
        let mut descriptor = SessionDescriptor::new("cam-test", "127.0.0.1", port);
        descriptor.connect_timeout = Duration::from_millis(500);
        CameraSession::new(descriptor, Arc::new(JpegCodec::default()))
    }

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = SessionDescriptor::new("camera1", "192.168.0.10", 8000);
        assert_eq!(descriptor.address(), "192.168.0.10:8000");
        assert_eq!(descriptor.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(descriptor.frame_timeout, DEFAULT_FRAME_TIMEOUT);
        assert_eq!(descriptor.wire_format, WireFormat::Envelope);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SessionError::HeartbeatTimeout(Duration::from_secs(1)).kind(),
            FailureKind::HeartbeatFailed
        );
        assert_eq!(
            SessionError::Decode(CodecError::Empty).kind(),
            FailureKind::DecodeFailed
        );
        assert_eq!(
            SessionError::Transport(TransportError::ConnectionClosed).kind(),
            FailureKind::ConnectionClosed
        );
    }

    #[tokio::test]
    async fn test_new_session_is_disconnected() {
        let session = session_for(9);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.latest_frame().is_none());
        assert!(!session.check_timeout());
    }

    #[tokio::test]
    async fn test_connect_refused_moves_to_failed() {
        let session = session_for(closed_port().await);
        let mut events = session.subscribe();

        let err = session.connect().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ConnectFailed);
        assert_eq!(session.state(), ConnectionState::Failed);

        match events.recv().await.unwrap() {
            SessionEvent::Error { kind, .. } => assert_eq!(kind, FailureKind::ConnectFailed),
            other => panic!("unexpected event: {:?}", other),
        }

        let stats = session.stats();
        assert_eq!(stats.connect_attempts, 1);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn test_connect_after_stop_is_rejected() {
        let session = session_for(closed_port().await);
        session.stop().await;

        assert!(matches!(
            session.connect().await,
            Err(SessionError::Stopped)
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    async fn silent_peer() -> (tokio::net::TcpListener, u16) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_zero_heartbeat_interval_keeps_watchdog_alive() {
        let (listener, port) = silent_peer().await;
        let mut descriptor = SessionDescriptor::new("cam-zero", "127.0.0.1", port);
        descriptor.heartbeat_interval = Duration::ZERO;
        descriptor.frame_timeout = Duration::from_millis(200);
        let session = CameraSession::new(descriptor, Arc::new(JpegCodec::default()));
        let mut events = session.subscribe();

        let (connected, accepted) = tokio::join!(session.connect(), listener.accept());
        connected.unwrap();
        let (_peer, _) = accepted.unwrap();

        let mut state = session.watch_state();
        tokio::time::timeout(
            Duration::from_secs(3),
            state.wait_for(|s| *s == ConnectionState::Failed),
        )
        .await
        .unwrap()
        .unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::Error { kind, .. } => assert_eq!(kind, FailureKind::FrameTimeout),
            other => panic!("unexpected event: {:?}", other),
        }

        session.stop().await;
    }

    #[tokio::test]
    async fn test_heartbeat_write_error_fails_connection() {
        let (listener, port) = silent_peer().await;
        let mut descriptor = SessionDescriptor::new("cam-hb", "127.0.0.1", port);
        descriptor.heartbeat_interval = Duration::from_millis(50);
        descriptor.frame_timeout = Duration::from_secs(60);
        let session = CameraSession::new(descriptor, Arc::new(JpegCodec::default()));
        let mut events = session.subscribe();

        let (connected, accepted) = tokio::join!(session.connect(), listener.accept());
        connected.unwrap();
        let (_peer, _) = accepted.unwrap();

        let epoch = session.inner.link.lock().epoch;
        let token = session.shutdown_token().child_token();
        let broken = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            ))
            .build();

        // Stands in for the write half of the current connection
        session.clone().heartbeat_loop(epoch, token, broken).await;

        assert_eq!(session.state(), ConnectionState::Failed);
        match events.recv().await.unwrap() {
            SessionEvent::Error { kind, .. } => assert_eq!(kind, FailureKind::HeartbeatFailed),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(session.stats().failures, 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_send_heartbeat_reports_write_error() {
        let mut broken = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let err = send_heartbeat(&mut broken, WireFormat::Envelope, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Heartbeat(_)));
        assert_eq!(err.kind(), FailureKind::HeartbeatFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_heartbeat_times_out_on_stalled_peer() {
        // One byte of buffer and nobody reading the other end
        let (mut writer, _peer) = tokio::io::duplex(1);
        let limit = Duration::from_millis(250);

        let err = send_heartbeat(&mut writer, WireFormat::Envelope, limit)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::HeartbeatTimeout(d) if d == limit));
        assert_eq!(err.kind(), FailureKind::HeartbeatFailed);
    }
}
