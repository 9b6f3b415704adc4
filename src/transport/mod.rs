//! Length-prefixed framing over async byte streams
//!
//! Every frame on the wire is a 4-byte big-endian length followed by exactly
//! that many payload bytes:
//!
//! ```text
//! +--------+--------+--------+--------+------------------------+
//! |        frame length (u32, BE)     |  payload (length bytes) |
//! +--------+--------+--------+--------+------------------------+
//! ```
//!
//! The typed envelope in [`Message`] is layered on top of the same framing,
//! so the length prefix always equals the number of bytes that follow.

mod envelope;

pub use envelope::{read_message, write_message, Message, MessageType};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound for a single frame (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Builds the wire representation of one frame
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, TransportError> {
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Writes one frame as a single logical write
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, accumulating across partial reads
///
/// # Errors
/// * `ConnectionClosed` - the stream ended before any length byte arrived
/// * `ShortRead` - the stream ended inside the length prefix or the payload
/// * `FrameTooLarge` - the declared length exceeds `max_len`
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Bytes, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let received = read_full(reader, &mut prefix).await?;
    if received == 0 {
        return Err(TransportError::ConnectionClosed);
    }
    if received < LENGTH_PREFIX_SIZE {
        return Err(TransportError::ShortRead {
            expected: LENGTH_PREFIX_SIZE,
            received,
        });
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    let received = read_full(reader, &mut payload).await?;
    if received < len {
        return Err(TransportError::ShortRead {
            expected: len,
            received,
        });
    }

    Ok(Bytes::from(payload))
}

/// Fills `buf` until it is full or the stream hits EOF, returning the count
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Selects how messages are laid out inside frames
///
/// - `Envelope`: every frame starts with a [`MessageType`] tag
/// - `Raw`: legacy `[length][jpeg]` stream; a zero-length frame is the
///   liveness probe, so heartbeats never break the framing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Envelope,
    Raw,
}

impl WireFormat {
    /// Reads the next message from the stream
    pub async fn read<R>(&self, reader: &mut R, max_len: usize) -> Result<Message, TransportError>
    where
        R: AsyncRead + Unpin,
    {
        match self {
            WireFormat::Envelope => read_message(reader, max_len).await,
            WireFormat::Raw => {
                let payload = read_frame(reader, max_len).await?;
                if payload.is_empty() {
                    Ok(Message::Heartbeat)
                } else {
                    Ok(Message::Data(payload))
                }
            }
        }
    }

    /// Encodes a message for this wire format
    pub fn encode(&self, message: &Message) -> Result<Bytes, TransportError> {
        match self {
            WireFormat::Envelope => message.encode(),
            WireFormat::Raw => match message {
                Message::Data(payload) => encode_frame(payload),
                Message::Heartbeat => encode_frame(&[]),
            },
        }
    }

    /// Writes a message as a single logical write
    pub async fn write<W>(&self, writer: &mut W, message: &Message) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.encode(message)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Envelope => write!(f, "envelope"),
            WireFormat::Raw => write!(f, "raw"),
        }
    }
}
