//! Edge sender: serves encoded frames to one viewer at a time

mod source;

pub use source::{block_texture, DirectorySource, FrameSource, PatternSource};

use crate::codec::CodecError;
use crate::transport::{Message, TransportError, WireFormat};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Inbound traffic is only heartbeats; anything larger is a broken peer
const MAX_INBOUND_FRAME: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("encode error: {0}")]
    Codec(#[from] CodecError),

    #[error("no JPEG files in {0}")]
    EmptyDirectory(PathBuf),

    #[error("frame source task failed: {0}")]
    SourceTask(#[from] tokio::task::JoinError),

    #[error("invalid frame rate: {0}")]
    InvalidFps(u32),
}

type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

/// TCP listener that streams frames from a [`FrameSource`]
pub struct EdgeServer {
    listener: TcpListener,
    wire_format: WireFormat,
    frame_period: Duration,
}

impl EdgeServer {
    pub async fn bind(addr: &str, wire_format: WireFormat, fps: u32) -> Result<Self, EdgeError> {
        if fps == 0 {
            return Err(EdgeError::InvalidFps(fps));
        }

        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %listener.local_addr()?,
            wire_format = %wire_format,
            fps,
            "Edge server listening"
        );

        Ok(Self {
            listener,
            wire_format,
            frame_period: Duration::from_secs_f64(1.0 / fps as f64),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, EdgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts viewers one after another until `token` is cancelled
    ///
    /// A viewer disconnecting only ends its own connection; a failing frame
    /// source ends the server.
    pub async fn run(
        self,
        source: Box<dyn FrameSource>,
        token: CancellationToken,
    ) -> Result<(), EdgeError> {
        let source: SharedSource = Arc::new(Mutex::new(source));

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                },
            };

            info!(peer = %peer, "Viewer connected");

            match self.serve(stream, &source, &token).await {
                Ok(sent) => info!(peer = %peer, frames = sent, "Viewer disconnected"),
                Err(EdgeError::Transport(e)) => {
                    info!(peer = %peer, error = %e, "Viewer connection lost")
                }
                Err(e) => return Err(e),
            }
        }

        info!("Edge server stopped");
        Ok(())
    }

    async fn serve(
        &self,
        stream: TcpStream,
        source: &SharedSource,
        token: &CancellationToken,
    ) -> Result<u64, EdgeError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, mut writer) = stream.into_split();
        let connection = token.child_token();
        let drain = tokio::spawn(drain_inbound(reader, self.wire_format, connection.clone()));

        let mut ticker = interval(self.frame_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut sent = 0u64;
        let result = loop {
            tokio::select! {
                biased;
                _ = connection.cancelled() => break Ok(sent),
                _ = ticker.tick() => {}
            }

            let source = Arc::clone(source);
            let pull = move || source.lock().next_frame();
            let payload = match tokio::task::spawn_blocking(pull).await {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => break Err(e),
                Err(e) => break Err(e.into()),
            };

            let message = Message::Data(payload);
            let written = tokio::select! {
                biased;
                _ = connection.cancelled() => break Ok(sent),
                written = self.wire_format.write(&mut writer, &message) => written,
            };
            if let Err(e) = written {
                break Err(e.into());
            }

            sent += 1;
            trace!(sequence = sent, "Frame sent");
        };

        connection.cancel();
        if let Err(e) = drain.await {
            warn!(error = %e, "Inbound drain task ended abnormally");
        }

        result
    }
}

/// Consumes heartbeats from the viewer; ends the connection on EOF or error
async fn drain_inbound(
    mut reader: OwnedReadHalf,
    wire_format: WireFormat,
    connection: CancellationToken,
) {
    let mut heartbeats = 0u64;

    loop {
        let message = tokio::select! {
            biased;
            _ = connection.cancelled() => break,
            message = wire_format.read(&mut reader, MAX_INBOUND_FRAME) => message,
        };

        match message {
            Ok(Message::Heartbeat) => {
                heartbeats += 1;
                trace!(heartbeats, "Heartbeat received");
            }
            Ok(Message::Data(payload)) => {
                debug!(bytes = payload.len(), "Ignoring data from viewer");
            }
            Err(TransportError::ConnectionClosed) => {
                debug!(heartbeats, "Viewer closed its side");
                break;
            }
            Err(e) => {
                debug!(error = %e, "Inbound stream failed");
                break;
            }
        }
    }

    connection.cancel();
}
