//! Decoded frames

use image::{DynamicImage, GrayImage};
use tokio::time::Instant;

/// One decoded image and its arrival metadata
///
/// Frames are immutable once published and shared as `Arc<Frame>`.
#[derive(Debug, Clone)]
pub struct Frame {
    sequence: u64,
    received_at: Instant,
    payload_len: usize,
    image: DynamicImage,
}

impl Frame {
    pub fn new(
        sequence: u64,
        received_at: Instant,
        payload_len: usize,
        image: DynamicImage,
    ) -> Self {
        Self {
            sequence,
            received_at,
            payload_len,
            image,
        }
    }

    /// Per-session sequence number, starting at 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Size of the encoded wire payload
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Single-channel intensity copy
    pub fn luma(&self) -> GrayImage {
        self.image.to_luma8()
    }
}
