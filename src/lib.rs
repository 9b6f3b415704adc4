//! Resilient camera streaming and inter-camera displacement estimation
//!
//! Edge processes stream JPEG frames over TCP as `[u32 length][payload]`
//! frames. The viewer side keeps one [`CameraSession`] per camera:
//! - heartbeats and a frame-arrival watchdog detect dead links
//! - a [`ReconnectSupervisor`] restores dropped sessions
//! - the latest decoded frame is cached behind an `Arc` pointer swap
//!
//! A [`DisplacementEstimator`] compares the latest frames of two sessions
//! with ORB-style features and reports the offset in physical units.
//!
//! # Example
//!
//! ```no_run
//! use camlink::{CameraSession, DisplacementEstimator, JpegCodec, SessionDescriptor};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), camlink::SessionError> {
//! let codec = Arc::new(JpegCodec::default());
//! let left = SessionDescriptor::new("camera1", "192.168.0.10", 8000);
//! let right = SessionDescriptor::new("camera2", "192.168.0.13", 8000);
//! let left = CameraSession::new(left, codec.clone());
//! let right = CameraSession::new(right, codec);
//! left.connect().await?;
//! right.connect().await?;
//!
//! let mut estimator = DisplacementEstimator::default();
//! if let Some(d) = estimator.compute(&left, &right) {
//!     println!("dx={:.2} dy={:.2}", d.dx, d.dy);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod displacement;
pub mod edge;
pub mod frame;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use codec::{CodecError, FrameDecoder, FrameEncoder, JpegCodec};
pub use displacement::{Displacement, DisplacementEstimator, EstimatorConfig};
pub use edge::{EdgeError, EdgeServer, FrameSource};
pub use frame::Frame;
pub use registry::SessionRegistry;
pub use session::{
    CameraSession, ConnectionState, FailureKind, SessionDescriptor, SessionError, SessionEvent,
    SessionStats,
};
pub use supervisor::{ReconnectSupervisor, RetryPolicy, SupervisorHandle, SupervisorOutcome};
pub use transport::{Message, TransportError, WireFormat};
