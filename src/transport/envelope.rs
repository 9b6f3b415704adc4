//! Typed message envelope
//!
//! An envelope is an ordinary frame whose first payload byte is a type tag:
//!
//! ```text
//! +----------------+------+-------------------+
//! | length (u32 BE)| type | body (length - 1) |
//! +----------------+------+-------------------+
//! ```

use super::{read_frame, TransportError, LENGTH_PREFIX_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Envelope type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Data = 0x00,
    Heartbeat = 0x01,
}

impl TryFrom<u8> for MessageType {
    type Error = TransportError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x00 => Ok(MessageType::Data),
            0x01 => Ok(MessageType::Heartbeat),
            other => Err(TransportError::MalformedEnvelope(format!(
                "unknown message type 0x{:02x}",
                other
            ))),
        }
    }
}

/// One message on a camera connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Encoded image payload
    Data(Bytes),

    /// Liveness probe, carries no body
    Heartbeat,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Data(_) => MessageType::Data,
            Message::Heartbeat => MessageType::Heartbeat,
        }
    }

    /// Serializes the message including its length prefix
    pub fn encode(&self) -> Result<Bytes, TransportError> {
        let body: &[u8] = match self {
            Message::Data(payload) => payload,
            Message::Heartbeat => &[],
        };

        let frame_len = body.len() + 1;
        let len = u32::try_from(frame_len).map_err(|_| TransportError::FrameTooLarge {
            len: frame_len,
            max: u32::MAX as usize,
        })?;

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + frame_len);
        buf.put_u32(len);
        buf.put_u8(self.message_type() as u8);
        buf.put_slice(body);
        Ok(buf.freeze())
    }

    /// Parses a frame payload (without the length prefix)
    pub fn decode(frame: Bytes) -> Result<Self, TransportError> {
        let Some(&tag) = frame.first() else {
            return Err(TransportError::MalformedEnvelope(
                "empty frame has no type tag".to_string(),
            ));
        };

        match MessageType::try_from(tag)? {
            MessageType::Data => Ok(Message::Data(frame.slice(1..))),
            MessageType::Heartbeat => Ok(Message::Heartbeat),
        }
    }
}

/// Writes one enveloped message
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = message.encode()?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one enveloped message whose body is at most `max_body` bytes
pub async fn read_message<R>(reader: &mut R, max_body: usize) -> Result<Message, TransportError>
where
    R: AsyncRead + Unpin,
{
    let frame = read_frame(reader, max_body.saturating_add(1)).await?;
    Message::decode(frame)
}
