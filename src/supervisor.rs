//! Reconnection supervisor
//!
//! Restores a dropped session on a fixed interval. The supervisor only ever
//! calls the session's public `connect()`; it never touches sockets.

use crate::session::{CameraSession, ConnectionState, SessionError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

const MIN_RECONNECT_INTERVAL: Duration = Duration::from_millis(10);

/// How often and how many times to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Why a supervisor task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Stopped through its handle or because the session stopped
    Cancelled,
    /// Hit `max_attempts` consecutive failures; the session stays `Failed`
    GaveUp { attempts: u32 },
}

pub struct ReconnectSupervisor;

impl ReconnectSupervisor {
    /// Spawns the retry loop for one session
    ///
    /// The loop ends when the handle is stopped, when the session is
    /// stopped, or when the retry policy gives up.
    pub fn spawn(session: CameraSession, policy: RetryPolicy) -> SupervisorHandle {
        let token = session.shutdown_token().child_token();
        let label = session.label().to_string();
        let task = tokio::spawn(run(session, policy, token.clone()));

        SupervisorHandle { label, token, task }
    }
}

pub struct SupervisorHandle {
    label: String,
    token: CancellationToken,
    task: JoinHandle<SupervisorOutcome>,
}

impl SupervisorHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the loop at its next timer boundary and waits for it,
    /// including any `connect()` already in flight
    pub async fn stop(self) -> SupervisorOutcome {
        self.token.cancel();
        self.join().await
    }

    /// Waits for the loop to end on its own
    pub async fn join(self) -> SupervisorOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(camera = %self.label, error = %e, "Supervisor task ended abnormally");
                SupervisorOutcome::Cancelled
            }
        }
    }
}

async fn run(
    session: CameraSession,
    policy: RetryPolicy,
    token: CancellationToken,
) -> SupervisorOutcome {
    let label = session.label().to_string();
    let period = policy.interval.max(MIN_RECONNECT_INTERVAL);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut failed_attempts: u32 = 0;

    info!(
        camera = %label,
        interval_ms = period.as_millis() as u64,
        max_attempts = ?policy.max_attempts,
        "Reconnect supervisor started"
    );

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(camera = %label, "Reconnect supervisor cancelled");
                return SupervisorOutcome::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        match session.state() {
            ConnectionState::Connected => {
                failed_attempts = 0;
                continue;
            }
            ConnectionState::Connecting => continue,
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }

        if let Some(max) = policy.max_attempts {
            if failed_attempts >= max {
                return give_up(&label, failed_attempts);
            }
        }

        info!(camera = %label, attempt = failed_attempts + 1, "Attempting reconnect");

        match session.connect().await {
            Ok(()) => {
                if session.state().is_connected() {
                    failed_attempts = 0;
                    info!(camera = %label, "Camera reconnected");
                }
            }
            Err(SessionError::Stopped) => return SupervisorOutcome::Cancelled,
            Err(e) => {
                failed_attempts += 1;
                debug!(
                    camera = %label,
                    attempt = failed_attempts,
                    error = %e,
                    "Reconnect attempt failed"
                );

                if let Some(max) = policy.max_attempts {
                    if failed_attempts >= max {
                        return give_up(&label, failed_attempts);
                    }
                }
            }
        }
    }
}

fn give_up(label: &str, attempts: u32) -> SupervisorOutcome {
    warn!(camera = %label, attempts, "Giving up on camera, leaving it failed");
    SupervisorOutcome::GaveUp { attempts }
}
