//! Connection state and session events

use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Lifecycle state of one camera connection
///
/// ```text
/// Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
///       ▲                       │                  │
///       │ stop()                │ error            │ read/decode/heartbeat/timeout
///       │                       ▼                  ▼
///       └────────────────────  Failed ◀────────────┘
///                                 │
///                                 └──connect()──▶ Connecting
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// States from which `connect()` may start a new attempt
    pub fn can_connect(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a connection moved to `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    ConnectFailed,
    ShortRead,
    ConnectionClosed,
    FrameTooLarge,
    MalformedEnvelope,
    DecodeFailed,
    HeartbeatFailed,
    FrameTimeout,
}

impl From<&TransportError> for FailureKind {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Io(_) | TransportError::ConnectionClosed => {
                FailureKind::ConnectionClosed
            }
            TransportError::ShortRead { .. } => FailureKind::ShortRead,
            TransportError::FrameTooLarge { .. } => FailureKind::FrameTooLarge,
            TransportError::MalformedEnvelope(_) => FailureKind::MalformedEnvelope,
        }
    }
}

/// Notifications published by a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A frame was decoded and is now the latest cached frame
    FrameReceived {
        label: Arc<str>,
        sequence: u64,
        at: Instant,
    },

    /// The connection failed; the session is now `Failed`
    Error {
        label: Arc<str>,
        kind: FailureKind,
        detail: String,
    },
}

impl SessionEvent {
    pub fn label(&self) -> &str {
        match self {
            SessionEvent::FrameReceived { label, .. } | SessionEvent::Error { label, .. } => label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_states_can_connect() {
        assert!(ConnectionState::Disconnected.can_connect());
        assert!(ConnectionState::Failed.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Connected.can_connect());
    }

    #[test]
    fn test_transport_errors_map_to_failure_kinds() {
        let short = TransportError::ShortRead {
            expected: 10,
            received: 3,
        };
        assert_eq!(FailureKind::from(&short), FailureKind::ShortRead);
        assert_eq!(
            FailureKind::from(&TransportError::ConnectionClosed),
            FailureKind::ConnectionClosed
        );
        let reset = TransportError::Io(std::io::ErrorKind::ConnectionReset.into());
        assert_eq!(FailureKind::from(&reset), FailureKind::ConnectionClosed);
    }
}
