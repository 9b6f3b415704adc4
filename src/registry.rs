//! Headless orchestrator for a set of camera sessions
//!
//! Owns every session, its supervisor, the displacement monitor and the
//! statistics logger, and tears them down in that reverse order.

use crate::codec::{FrameDecoder, JpegCodec};
use crate::config::{Config, DisplacementConfig};
use crate::displacement::{Displacement, DisplacementEstimator};
use crate::session::{CameraSession, SessionStats};
use crate::supervisor::{ReconnectSupervisor, SupervisorHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SessionRegistry {
    sessions: Vec<CameraSession>,
    supervisors: Vec<SupervisorHandle>,
    displacement: watch::Receiver<Option<Displacement>>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionRegistry {
    /// Builds one session per configured camera, connects each once and
    /// puts it under supervision
    pub async fn start(config: &Config) -> Self {
        let decoder: Arc<dyn FrameDecoder> = Arc::new(JpegCodec::default());
        let sessions: Vec<CameraSession> = config
            .viewer
            .cameras
            .iter()
            .map(|camera| {
                CameraSession::new(config.viewer.descriptor(camera), Arc::clone(&decoder))
            })
            .collect();

        // Initial connects run concurrently so one dead camera does not
        // delay the others
        let mut connects = JoinSet::new();
        for session in &sessions {
            let session = session.clone();
            connects.spawn(async move {
                let result = session.connect().await;
                (session, result)
            });
        }
        while let Some(joined) = connects.join_next().await {
            match joined {
                Ok((session, Ok(()))) => {
                    debug!(
                        camera = %session.label(),
                        state = %session.state(),
                        "Initial connect done"
                    )
                }
                Ok((session, Err(e))) => {
                    warn!(
                        camera = %session.label(),
                        error = %e,
                        "Initial connect failed, supervisor will retry"
                    )
                }
                Err(e) => warn!(error = %e, "Initial connect task failed"),
            }
        }

        let policy = config.viewer.retry_policy();
        let supervisors = sessions
            .iter()
            .map(|session| ReconnectSupervisor::spawn(session.clone(), policy))
            .collect();

        let token = CancellationToken::new();
        let (displacement_tx, displacement) = watch::channel(None);
        let mut tasks = Vec::new();

        if config.displacement.enabled {
            let reference = sessions
                .iter()
                .find(|s| s.label() == config.displacement.reference)
                .cloned();
            let target = sessions
                .iter()
                .find(|s| s.label() == config.displacement.target)
                .cloned();

            match (reference, target) {
                (Some(reference), Some(target)) => {
                    tasks.push(tokio::spawn(run_displacement_monitor(
                        reference,
                        target,
                        config.displacement.clone(),
                        displacement_tx,
                        token.clone(),
                    )));
                }
                _ => warn!(
                    reference = %config.displacement.reference,
                    target = %config.displacement.target,
                    "Displacement cameras not configured, monitor disabled"
                ),
            }
        }

        tasks.push(tokio::spawn(run_stats_logger(
            sessions.clone(),
            Duration::from_secs(config.viewer.stats_interval_seconds),
            token.clone(),
        )));

        info!(cameras = sessions.len(), "Session registry started");

        Self {
            sessions,
            supervisors,
            displacement,
            token,
            tasks,
        }
    }

    pub fn sessions(&self) -> &[CameraSession] {
        &self.sessions
    }

    pub fn session(&self, label: &str) -> Option<&CameraSession> {
        self.sessions.iter().find(|s| s.label() == label)
    }

    /// Latest published displacement
    pub fn displacement(&self) -> Option<Displacement> {
        *self.displacement.borrow()
    }

    pub fn watch_displacement(&self) -> watch::Receiver<Option<Displacement>> {
        self.displacement.clone()
    }

    /// Stops the monitor tasks, then the supervisors, then the sessions
    pub async fn shutdown(self) {
        info!("Shutting down session registry");

        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Registry task ended abnormally");
            }
        }

        for supervisor in self.supervisors {
            let label = supervisor.label().to_string();
            let outcome = supervisor.stop().await;
            debug!(camera = %label, outcome = ?outcome, "Supervisor stopped");
        }

        for session in &self.sessions {
            session.stop().await;
        }

        info!("Session registry stopped");
    }
}

async fn run_displacement_monitor(
    reference: CameraSession,
    target: CameraSession,
    config: DisplacementConfig,
    output: watch::Sender<Option<Displacement>>,
    token: CancellationToken,
) {
    let mut estimator = Some(DisplacementEstimator::new(config.estimator_config()));
    let mut ticker = interval(Duration::from_millis(config.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_pair: Option<(u64, u64)> = None;

    info!(
        reference = %reference.label(),
        target = %target.label(),
        interval_ms = config.interval_ms,
        "Displacement monitor started"
    );

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let (Some(a), Some(b)) = (reference.latest_frame(), target.latest_frame()) else {
            continue;
        };

        let pair = (a.sequence(), b.sequence());
        if last_pair == Some(pair) {
            continue;
        }
        last_pair = Some(pair);

        let skew = if a.received_at() > b.received_at() {
            a.received_at() - b.received_at()
        } else {
            b.received_at() - a.received_at()
        };
        debug!(
            reference_seq = pair.0,
            target_seq = pair.1,
            skew_ms = skew.as_millis() as u64,
            "Estimating displacement"
        );

        let mut current = estimator
            .take()
            .unwrap_or_else(|| DisplacementEstimator::new(config.estimator_config()));

        let joined = tokio::task::spawn_blocking(move || {
            let result = current.estimate_frames(&a, &b);
            (current, result)
        })
        .await;

        let result = match joined {
            Ok((restored, result)) => {
                estimator = Some(restored);
                result
            }
            Err(e) => {
                warn!(error = %e, "Displacement task failed, resetting estimator");
                continue;
            }
        };

        let changed = output.send_if_modified(|published| {
            if *published != result {
                *published = result;
                true
            } else {
                false
            }
        });

        if changed {
            match result {
                Some(d) => info!(dx = d.dx, dy = d.dy, "Displacement updated"),
                None => debug!("Displacement unavailable"),
            }
        }
    }

    debug!("Displacement monitor stopped");
}

async fn run_stats_logger(
    sessions: Vec<CameraSession>,
    period: Duration,
    token: CancellationToken,
) {
    let mut previous: Vec<SessionStats> = sessions.iter().map(|s| s.stats()).collect();
    let mut last = Instant::now();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let elapsed = last.elapsed().as_secs_f64();
        last = Instant::now();

        for (session, prev) in sessions.iter().zip(previous.iter_mut()) {
            let current = session.stats();
            info!(
                camera = %session.label(),
                state = %session.state(),
                fps = %format!("{:.1}", current.calculate_fps(prev, elapsed)),
                kbps = %format!("{:.0}", current.calculate_bitrate_kbps(prev, elapsed)),
                frames = %current.frames_received,
                reconnects = %current.reconnects(),
                failures = %current.failures,
                "Stats"
            );
            *prev = current;
        }
    }
}
