//! Async driver for the detection loop.
//!
//! One task owns the camera, the `DetectionLoop` and the `AlertManager`. The detector
//! call runs on the blocking pool; a shutdown signal races it and wins, leaving the
//! orphaned call to finish on its own with its result dropped. Session transitions are
//! followed as they happen, so starting or stopping does not wait for the next tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::alert::AlertManager;
use crate::detect::{Detection, SharedBackend};
use crate::frame::{Frame, FrameSource};
use crate::geometry::DisplayScale;
use crate::polling::{
    ClassifiedDetection, DetectionLoop, LoopStatus, TickOutcome, DEFAULT_POLL_INTERVAL,
};
use crate::state::{lock, SessionHandle};

/// Latest loop state, for overlays and status lines.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopReport {
    pub status: LoopStatus,
    pub breached: bool,
    pub detections: Vec<ClassifiedDetection>,
    pub ticks: u64,
    pub breach_episodes: u64,
    /// Detector results dropped because the session ended while they were in flight.
    pub stale_results: u64,
}

impl Default for LoopReport {
    fn default() -> Self {
        Self {
            status: LoopStatus::Loading,
            breached: false,
            detections: Vec::new(),
            ticks: 0,
            breach_episodes: 0,
            stale_results: 0,
        }
    }
}

/// Totals for a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub status: LoopStatus,
    pub ticks: u64,
    pub breach_episodes: u64,
    pub alerts_dispatched: u64,
    pub alerts_suppressed: u64,
    pub stale_results: u64,
    pub detect_failures: u64,
}

/// Epoch milliseconds that follow the tokio clock, so paused-time tests see time pass.
struct Clock {
    base_ms: u64,
    start: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            base_ms: crate::now_ms(),
            start: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.base_ms + self.start.elapsed().as_millis() as u64
    }
}

pub struct MonitorRunner {
    session: SessionHandle,
    camera: Box<dyn FrameSource>,
    backend: SharedBackend,
    alerts: AlertManager,
    interval: Duration,
    detection: DetectionLoop,
    report: watch::Sender<LoopReport>,
}

impl MonitorRunner {
    pub fn new(
        session: SessionHandle,
        camera: Box<dyn FrameSource>,
        backend: SharedBackend,
        alerts: AlertManager,
    ) -> Self {
        let (report, _) = watch::channel(LoopReport::default());
        Self {
            session,
            camera,
            backend,
            alerts,
            interval: DEFAULT_POLL_INTERVAL,
            detection: DetectionLoop::new(),
            report,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<LoopReport> {
        self.report.subscribe()
    }

    fn publish(&self) {
        self.report.send_replace(LoopReport {
            status: self.detection.status().clone(),
            breached: self.detection.is_breached(),
            detections: self.detection.detections().to_vec(),
            ticks: self.detection.ticks(),
            breach_episodes: self.detection.breach_episodes(),
            stale_results: self.detection.stale_results(),
        });
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            status: self.detection.status().clone(),
            ticks: self.detection.ticks(),
            breach_episodes: self.detection.breach_episodes(),
            alerts_dispatched: self.alerts.dispatched(),
            alerts_suppressed: self.alerts.suppressed(),
            stale_results: self.detection.stale_results(),
            detect_failures: self.detection.detect_failures(),
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped), or until a
    /// collaborator becomes unavailable.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let backend = Arc::clone(&self.backend);
        let load = tokio::task::spawn_blocking(move || {
            let mut backend = backend
                .lock()
                .map_err(|_| anyhow!("detector lock poisoned"))?;
            log::info!("loading detector backend '{}'", backend.name());
            backend.load()
        });

        let loaded = tokio::select! {
            r = load => r.map_err(|e| anyhow!("detector load task failed: {}", e)).and_then(|r| r),
            _ = shutdown.changed() => {
                log::info!("shutdown requested while the model was loading");
                return Ok(self.summary());
            }
        };
        if let Err(e) = loaded {
            log::error!("failed to load detection model: {:#}", e);
            self.detection.fail(format!("{:#}", e));
            self.publish();
            return Ok(self.summary());
        }
        self.detection.model_ready();
        self.publish();
        log::info!("detector ready; polling every {:?}", self.interval);

        let clock = Clock::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut changes = lock(&self.session)?.subscribe();

        'poll: loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
                _ = changes.changed() => {
                    self.follow_session(&mut ticker)?;
                    continue;
                }
            }
            if shutdown_requested(&shutdown) {
                break;
            }

            let snapshot = lock(&self.session)?.snapshot();
            let Some(ticket) = self.detection.begin_tick(&snapshot) else {
                // Dormant; sync may just have torn a session down.
                self.publish();
                continue;
            };

            let scale = self.camera.display_scale();
            let result = match (self.camera.capture(), &scale) {
                (Ok(frame), Ok(_)) => {
                    let backend = Arc::clone(&self.backend);
                    let mut job =
                        tokio::task::spawn_blocking(move || detect_on(&backend, &frame));
                    loop {
                        tokio::select! {
                            r = &mut job => {
                                break r
                                    .map_err(|e| anyhow!("detector task failed: {}", e))
                                    .and_then(|r| r);
                            }
                            _ = shutdown.changed() => {
                                self.detection.stop();
                                break 'poll;
                            }
                            // A stop while the detector runs clears breach state now;
                            // the late result is dropped as stale.
                            _ = changes.changed() => self.follow_session(&mut ticker)?,
                        }
                    }
                }
                (Err(e), _) => Err(e),
                (Ok(_), Err(e)) => Err(anyhow!("cannot map detections to the display: {}", e)),
            };

            // The session may have changed while the detector was running.
            let snapshot = lock(&self.session)?.snapshot();
            let scale = scale.unwrap_or(DisplayScale::IDENTITY);
            let outcome = self.detection.complete_tick(ticket, result, &snapshot, scale);
            match outcome {
                TickOutcome::BreachStarted => {
                    log::warn!("restricted zone breached");
                    self.alerts.on_breach(&self.session, clock.now_ms())?;
                }
                TickOutcome::BreachEnded => log::info!("restricted zone clear"),
                _ => {}
            }
            self.publish();
            if outcome == TickOutcome::Unavailable {
                break;
            }
        }

        self.detection.stop();
        self.publish();
        Ok(self.summary())
    }

    /// Apply a session transition at once: a stop clears breach state, a start polls
    /// without waiting for the next interval.
    fn follow_session(&mut self, ticker: &mut Interval) -> Result<()> {
        let snapshot = lock(&self.session)?.snapshot();
        let was_running = *self.detection.status() == LoopStatus::Running;
        let running = self.detection.sync(&snapshot);
        if running && !was_running {
            log::debug!("monitoring started; polling now");
            ticker.reset_immediately();
        } else if was_running && !running {
            log::debug!("monitoring stopped; breach state cleared");
        }
        self.publish();
        Ok(())
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

fn detect_on(backend: &SharedBackend, frame: &Frame) -> Result<Vec<Detection>> {
    let mut backend = backend
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    backend.detect(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ScriptedBackend, StubBackend};
    use crate::frame::{FrameSize, SyntheticCamera};
    use crate::geometry::{BBox, Zone};
    use crate::state::{MonitoringAction, Session};
    use std::sync::Mutex;

    fn camera() -> Box<dyn FrameSource> {
        Box::new(SyntheticCamera::new(FrameSize::new(64, 48), FrameSize::new(64, 48)))
    }

    fn monitoring_session() -> SessionHandle {
        let mut s = Session::new();
        s.dispatch(MonitoringAction::SetZone(Some(Zone::new(10.0, 10.0, 20.0, 20.0))))
            .unwrap();
        s.dispatch(MonitoringAction::ToggleAnimal("dog".into())).unwrap();
        s.dispatch(MonitoringAction::SetMonitoring(true)).unwrap();
        s.into_handle()
    }

    #[tokio::test(start_paused = true)]
    async fn model_load_failure_is_terminal() {
        let backend: SharedBackend = Arc::new(Mutex::new(StubBackend::failing_load("no weights")));
        let runner = MonitorRunner::new(monitoring_session(), camera(), backend, AlertManager::new());
        let (_tx, rx) = watch::channel(false);
        let summary = runner.run(rx).await.unwrap();
        assert!(matches!(summary.status, LoopStatus::Failed(ref r) if r.contains("no weights")));
        assert_eq!(summary.ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_detect_error_stops_the_loop() {
        let script = r#"
[{"bbox":[12,12,5,5],"class":"dog","score":0.8}]
{"error":"camera unplugged","fatal":true}
"#;
        let backend: SharedBackend = Arc::new(Mutex::new(ScriptedBackend::parse(script).unwrap()));
        let runner = MonitorRunner::new(monitoring_session(), camera(), backend, AlertManager::new());
        let (_tx, rx) = watch::channel(false);
        let summary = runner.run(rx).await.unwrap();
        assert!(matches!(summary.status, LoopStatus::Failed(_)));
        assert_eq!(summary.breach_episodes, 1);
        assert_eq!(summary.alerts_dispatched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_run() {
        let backend: SharedBackend = Arc::new(Mutex::new(StubBackend::new(vec![Detection::new(
            "dog",
            BBox::new(0.0, 0.0, 64.0, 48.0),
            0.9,
        )])));
        let runner = MonitorRunner::new(monitoring_session(), camera(), backend, AlertManager::new());
        let mut reports = runner.subscribe();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.run(rx));

        reports.wait_for(|r| r.ticks >= 3).await.unwrap();
        tx.send(true).unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.breach_episodes, 1);
        assert_eq!(summary.alerts_dispatched, 1);
        assert_eq!(summary.status, LoopStatus::Dormant);
    }
}
