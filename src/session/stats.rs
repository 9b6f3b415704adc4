//! Session statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of one camera session's counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Frames decoded and published
    pub frames_received: u64,

    /// Encoded payload bytes of published frames
    pub bytes_received: u64,

    /// Payloads the decoder rejected
    pub decode_failures: u64,

    /// Liveness probes written
    pub heartbeats_sent: u64,

    /// Calls to `connect()` that started an attempt
    pub connect_attempts: u64,

    /// Attempts that reached `Connected`
    pub connects: u64,

    /// Transitions into `Failed`
    pub failures: u64,
}

impl SessionStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_received.saturating_sub(previous.frames_received);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_received.saturating_sub(previous.bytes_received);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }

    /// Successful connects after the first one
    pub fn reconnects(&self) -> u64 {
        self.connects.saturating_sub(1)
    }
}

/// Lock-free counters behind [`SessionStats`]
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub frames_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub decode_failures: AtomicU64,
    pub heartbeats_sent: AtomicU64,
    pub connect_attempts: AtomicU64,
    pub connects: AtomicU64,
    pub failures: AtomicU64,
}

impl SessionCounters {
    pub fn record_frame(&self, payload_len: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_fps() {
        let prev = SessionStats {
            frames_received: 100,
            ..Default::default()
        };

        let current = SessionStats {
            frames_received: 130,
            ..Default::default()
        };

        let fps = current.calculate_fps(&prev, 1.0);
        assert_eq!(fps, 30.0);
        assert_eq!(current.calculate_fps(&prev, 0.0), 0.0);
    }

    #[test]
    fn test_calculate_bitrate() {
        let prev = SessionStats::default();

        let current = SessionStats {
            bytes_received: 125_000, // 125KB in 1 second = 1000 kbps
            ..Default::default()
        };

        let bitrate = current.calculate_bitrate_kbps(&prev, 1.0);
        assert_eq!(bitrate, 1000.0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = SessionCounters::default();
        counters.record_frame(500);
        counters.record_frame(300);
        SessionCounters::incr(&counters.connects);
        SessionCounters::incr(&counters.connects);

        let stats = counters.snapshot();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.bytes_received, 800);
        assert_eq!(stats.reconnects(), 1);
    }
}
