//! Detection polling loop (runtime-independent core).
//!
//! The driver (see `runner`) calls `begin_tick` on every interval, performs the detector
//! call, then hands the result back to `complete_tick`. The core enforces:
//!
//! - at most one detector call in flight per loop
//! - results from a torn-down generation are discarded, never applied
//! - breach is edge-triggered: `BreachStarted` once per episode
//!
//! The loop is active only while monitoring, with a zone and a non-empty selection.
//! Otherwise it is dormant and holds no detections.

use std::time::Duration;

use anyhow::Result;

use crate::detect::{is_unavailable, Detection};
use crate::geometry::{intersects, scale_bbox, DisplayScale, Zone};
use crate::state::{MonitoringState, SelectionSet};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopStatus {
    /// Waiting for the model to load.
    Loading,
    /// Ready, but monitoring is off (or no zone / no selection).
    Dormant,
    Running,
    /// Terminal: a collaborator is unavailable. No automatic retry.
    Failed(String),
}

/// Proof that a tick was started. Tied to the generation it was issued in.
#[derive(Debug)]
pub struct TickTicket {
    generation: u64,
}

impl TickTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Result arrived after teardown; dropped.
    Stale,
    Clear,
    /// Rising edge: fire the breach callback.
    BreachStarted,
    BreachContinues,
    BreachEnded,
    /// Transient detector failure; state untouched, next tick retries.
    DetectFailed,
    /// Collaborator gone; loop is now `Failed`.
    Unavailable,
}

/// A detection in display coordinates with its breach flag, for overlays.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub breaching: bool,
}

/// Keep selected categories, scale into display space and test each against the zone.
pub fn classify_detections(
    detections: Vec<Detection>,
    selected: &SelectionSet,
    zone: &Zone,
    scale: DisplayScale,
) -> Vec<ClassifiedDetection> {
    detections
        .into_iter()
        .filter(|d| selected.contains(&d.class))
        .map(|mut d| {
            d.bbox = scale_bbox(&d.bbox, scale);
            let breaching = intersects(&d.bbox, zone);
            ClassifiedDetection {
                detection: d,
                breaching,
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct DetectionLoop {
    status: LoopStatus,
    generation: u64,
    in_flight: bool,
    breached: bool,
    detections: Vec<ClassifiedDetection>,
    ticks: u64,
    episodes: u64,
    stale: u64,
    failures: u64,
}

impl Default for DetectionLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionLoop {
    pub fn new() -> Self {
        Self {
            status: LoopStatus::Loading,
            generation: 0,
            in_flight: false,
            breached: false,
            detections: Vec::new(),
            ticks: 0,
            episodes: 0,
            stale: 0,
            failures: 0,
        }
    }

    pub fn status(&self) -> &LoopStatus {
        &self.status
    }

    pub fn is_breached(&self) -> bool {
        self.breached
    }

    pub fn detections(&self) -> &[ClassifiedDetection] {
        &self.detections
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ticks whose results were applied.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn breach_episodes(&self) -> u64 {
        self.episodes
    }

    pub fn stale_results(&self) -> u64 {
        self.stale
    }

    pub fn detect_failures(&self) -> u64 {
        self.failures
    }

    pub fn model_ready(&mut self) {
        if self.status == LoopStatus::Loading {
            self.status = LoopStatus::Dormant;
        }
    }

    /// Enter the terminal failed state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.teardown();
        self.status = LoopStatus::Failed(reason.into());
    }

    /// Stop the session: cancel whatever is in flight and clear breach state.
    pub fn stop(&mut self) {
        self.teardown();
        if self.status == LoopStatus::Running {
            self.status = LoopStatus::Dormant;
        }
    }

    fn teardown(&mut self) {
        if self.in_flight || self.status == LoopStatus::Running {
            self.generation += 1;
        }
        self.in_flight = false;
        self.breached = false;
        self.detections.clear();
    }

    fn should_run(state: &MonitoringState) -> bool {
        state.is_monitoring && state.zone.is_some() && !state.selected.is_empty()
    }

    /// Align the loop with a session snapshot. Returns whether it is running.
    pub fn sync(&mut self, state: &MonitoringState) -> bool {
        match self.status {
            LoopStatus::Loading | LoopStatus::Failed(_) => false,
            LoopStatus::Dormant => {
                if Self::should_run(state) {
                    self.status = LoopStatus::Running;
                    true
                } else {
                    false
                }
            }
            LoopStatus::Running => {
                if Self::should_run(state) {
                    true
                } else {
                    self.stop();
                    false
                }
            }
        }
    }

    /// Start a tick, unless dormant or a previous call is still in flight.
    pub fn begin_tick(&mut self, state: &MonitoringState) -> Option<TickTicket> {
        if !self.sync(state) || self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(TickTicket {
            generation: self.generation,
        })
    }

    /// Apply a detector result against the snapshot current at resolution time.
    pub fn complete_tick(
        &mut self,
        ticket: TickTicket,
        result: Result<Vec<Detection>>,
        state: &MonitoringState,
        scale: DisplayScale,
    ) -> TickOutcome {
        if ticket.generation != self.generation || !self.sync(state) {
            self.stale += 1;
            log::debug!(
                "discarding stale detection result (generation {} != {})",
                ticket.generation,
                self.generation
            );
            return TickOutcome::Stale;
        }
        self.in_flight = false;

        let detections = match result {
            Ok(d) => d,
            Err(e) if is_unavailable(&e) => {
                log::error!("detection stopped: {}", e);
                self.fail(e.to_string());
                return TickOutcome::Unavailable;
            }
            Err(e) => {
                self.failures += 1;
                log::warn!("detection error (will retry next tick): {}", e);
                return TickOutcome::DetectFailed;
            }
        };

        let Some(zone) = state.zone else {
            return TickOutcome::Stale;
        };
        self.ticks += 1;
        self.detections = classify_detections(detections, &state.selected, &zone, scale);
        let breached = self.detections.iter().any(|d| d.breaching);
        log::debug!(
            "tick {}: {} selected detections, breached={}",
            self.ticks,
            self.detections.len(),
            breached
        );

        let outcome = match (self.breached, breached) {
            (false, true) => {
                self.episodes += 1;
                TickOutcome::BreachStarted
            }
            (true, true) => TickOutcome::BreachContinues,
            (true, false) => TickOutcome::BreachEnded,
            (false, false) => TickOutcome::Clear,
        };
        self.breached = breached;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use crate::state::{MonitoringAction, Session};
    use anyhow::anyhow;
    use std::sync::Arc;

    fn monitoring() -> Arc<MonitoringState> {
        let mut s = Session::new();
        s.dispatch(MonitoringAction::SetZone(Some(Zone::new(100.0, 100.0, 100.0, 100.0))))
            .unwrap();
        s.dispatch(MonitoringAction::SetSelectedAnimals(vec!["cat".into()]))
            .unwrap();
        s.dispatch(MonitoringAction::SetMonitoring(true)).unwrap()
    }

    fn inside() -> Vec<Detection> {
        vec![Detection::new("cat", BBox::new(120.0, 120.0, 20.0, 20.0), 0.9)]
    }

    fn outside() -> Vec<Detection> {
        vec![Detection::new("cat", BBox::new(300.0, 300.0, 20.0, 20.0), 0.9)]
    }

    fn ready_loop() -> DetectionLoop {
        let mut l = DetectionLoop::new();
        l.model_ready();
        l
    }

    fn tick(l: &mut DetectionLoop, state: &MonitoringState, r: Result<Vec<Detection>>) -> TickOutcome {
        let ticket = l.begin_tick(state).expect("tick should start");
        l.complete_tick(ticket, r, state, DisplayScale::IDENTITY)
    }

    #[test]
    fn breach_fires_once_per_episode() {
        let state = monitoring();
        let mut l = ready_loop();
        let outcomes: Vec<_> = [inside(), inside(), inside(), outside(), inside()]
            .into_iter()
            .map(|d| tick(&mut l, &state, Ok(d)))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::BreachStarted,
                TickOutcome::BreachContinues,
                TickOutcome::BreachContinues,
                TickOutcome::BreachEnded,
                TickOutcome::BreachStarted,
            ]
        );
        assert_eq!(l.breach_episodes(), 2);
    }

    #[test]
    fn unselected_classes_are_ignored() {
        let state = monitoring();
        let mut l = ready_loop();
        let dog = vec![Detection::new("dog", BBox::new(120.0, 120.0, 20.0, 20.0), 0.9)];
        assert_eq!(tick(&mut l, &state, Ok(dog)), TickOutcome::Clear);
        assert!(l.detections().is_empty());
    }

    #[test]
    fn detections_are_scaled_before_testing() {
        let state = monitoring();
        let mut l = ready_loop();
        // Native 1280 wide shown at 640: (300,300) native is (150,150) on screen.
        let scale = DisplayScale { x: 0.5, y: 0.5 };
        let ticket = l.begin_tick(&state).unwrap();
        assert_eq!(
            l.complete_tick(ticket, Ok(outside()), &state, scale),
            TickOutcome::BreachStarted
        );
        assert_eq!(l.detections()[0].detection.bbox, BBox::new(150.0, 150.0, 10.0, 10.0));
    }

    #[test]
    fn no_overlapping_ticks() {
        let state = monitoring();
        let mut l = ready_loop();
        let ticket = l.begin_tick(&state).unwrap();
        assert!(l.is_in_flight());
        assert!(l.begin_tick(&state).is_none());
        l.complete_tick(ticket, Ok(vec![]), &state, DisplayScale::IDENTITY);
        assert!(!l.is_in_flight());
        assert!(l.begin_tick(&state).is_some());
    }

    #[test]
    fn result_after_stop_is_discarded() {
        let state = monitoring();
        let mut l = ready_loop();
        tick(&mut l, &state, Ok(inside()));
        let ticket = l.begin_tick(&state).unwrap();
        l.stop();
        assert!(!l.is_breached());
        assert!(!l.is_in_flight());
        assert!(l.detections().is_empty());

        let outcome = l.complete_tick(ticket, Ok(inside()), &state, DisplayScale::IDENTITY);
        assert_eq!(outcome, TickOutcome::Stale);
        assert!(!l.is_breached());
        assert_eq!(l.stale_results(), 1);
    }

    #[test]
    fn stopping_monitoring_mid_call_discards_result() {
        let state = monitoring();
        let mut l = ready_loop();
        let ticket = l.begin_tick(&state).unwrap();
        let mut stopped = (*state).clone();
        stopped.is_monitoring = false;
        assert_eq!(
            l.complete_tick(ticket, Ok(inside()), &stopped, DisplayScale::IDENTITY),
            TickOutcome::Stale
        );
        assert_eq!(l.status(), &LoopStatus::Dormant);
    }

    #[test]
    fn restart_after_stop_retriggers() {
        let state = monitoring();
        let mut l = ready_loop();
        assert_eq!(tick(&mut l, &state, Ok(inside())), TickOutcome::BreachStarted);
        l.stop();
        assert_eq!(tick(&mut l, &state, Ok(inside())), TickOutcome::BreachStarted);
    }

    #[test]
    fn transient_failure_keeps_running() {
        let state = monitoring();
        let mut l = ready_loop();
        tick(&mut l, &state, Ok(inside()));
        assert_eq!(
            tick(&mut l, &state, Err(anyhow!("frame decode failed"))),
            TickOutcome::DetectFailed
        );
        assert!(l.is_breached());
        assert_eq!(tick(&mut l, &state, Ok(inside())), TickOutcome::BreachContinues);
        assert_eq!(l.detect_failures(), 1);
    }

    #[test]
    fn unavailable_is_terminal() {
        let state = monitoring();
        let mut l = ready_loop();
        let err = crate::detect::CollaboratorUnavailable::new("model", "crashed");
        assert_eq!(tick(&mut l, &state, Err(err.into())), TickOutcome::Unavailable);
        assert!(matches!(l.status(), LoopStatus::Failed(_)));
        assert!(l.begin_tick(&state).is_none());
    }

    #[test]
    fn dormant_without_requirements() {
        let mut l = ready_loop();
        assert!(l.begin_tick(&MonitoringState::default()).is_none());
        let mut not_loaded = DetectionLoop::new();
        assert!(not_loaded.begin_tick(&monitoring()).is_none());
    }

    #[test]
    fn classification_flags_each_detection() {
        let state = monitoring();
        let zone = state.zone.unwrap();
        let mut all = inside();
        all.extend(outside());
        let classified = classify_detections(all, &state.selected, &zone, DisplayScale::IDENTITY);
        assert_eq!(
            classified.iter().map(|c| c.breaching).collect::<Vec<_>>(),
            vec![true, false]
        );
    }
}
