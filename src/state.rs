//! Monitoring session state.
//!
//! `MonitoringState` is an immutable snapshot. Every transition goes through `reduce`,
//! which builds a whole new snapshot; `Session` swaps its `Arc` to the new one. Readers
//! (the detection loop, the editor) hold an `Arc` and never observe a half-applied update.
//!
//! While monitoring is active the zone, the selection set and the alert config are frozen.

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;

use crate::alert::cooldown_remaining_ms;
use crate::audio::AudioClip;
use crate::geometry::Zone;

/// Categories the detector can report that may be monitored.
pub const SUPPORTED_ANIMALS: [&str; 10] = [
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe",
];

pub const DEFAULT_COOLDOWN_SECONDS: f64 = 5.0;

/// Lower-case a category label and check it is a supported one.
pub fn validate_category(label: &str) -> Result<String> {
    static LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = LABEL_RE.get_or_init(|| regex::Regex::new(r"^[a-z][a-z ]{0,31}$").unwrap());

    let label = label.trim().to_lowercase();
    if !re.is_match(&label) {
        return Err(anyhow!("category label must match ^[a-z][a-z ]{{0,31}}$"));
    }
    if !SUPPORTED_ANIMALS.contains(&label.as_str()) {
        return Err(anyhow!("unsupported category '{}'", label));
    }
    Ok(label)
}

/// Categories the user has opted to monitor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionSet(BTreeSet<String>);

impl SelectionSet {
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for label in labels {
            set.insert(validate_category(label.as_ref())?);
        }
        Ok(Self(set))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn toggled(&self, label: String) -> Self {
        let mut set = self.0.clone();
        if !set.remove(&label) {
            set.insert(label);
        }
        Self(set)
    }
}

#[derive(Clone, Debug)]
pub struct AlertConfig {
    /// Uploaded alert sound. Shared between snapshots; released with the last one.
    pub audio: Option<Arc<AudioClip>>,
    /// True only once the platform granted permission.
    pub notifications_enabled: bool,
    pub cooldown_seconds: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            audio: None,
            notifications_enabled: false,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
        }
    }
}

impl AlertConfig {
    pub fn cooldown_ms(&self) -> u64 {
        (self.cooldown_seconds * 1000.0).round() as u64
    }

    pub fn has_alert_method(&self) -> bool {
        self.notifications_enabled || self.audio.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MonitoringState {
    pub is_monitoring: bool,
    pub zone: Option<Zone>,
    pub selected: SelectionSet,
    pub alert: AlertConfig,
    /// Milliseconds since the Unix epoch of the last dispatched alert.
    pub last_alert_ms: Option<u64>,
}

impl MonitoringState {
    /// Why monitoring cannot start yet, if it cannot.
    pub fn start_blocker(&self) -> Option<&'static str> {
        if self.zone.is_none() {
            Some("draw a zone to start")
        } else if self.selected.is_empty() {
            Some("select at least one animal")
        } else {
            None
        }
    }

    pub fn can_start(&self) -> bool {
        !self.is_monitoring && self.start_blocker().is_none()
    }

    pub fn cooldown_remaining_ms(&self, now_ms: u64) -> u64 {
        cooldown_remaining_ms(self.last_alert_ms, self.alert.cooldown_ms(), now_ms)
    }

    pub fn can_trigger_alert(&self, now_ms: u64) -> bool {
        self.cooldown_remaining_ms(now_ms) == 0
    }
}

#[derive(Debug)]
pub enum MonitoringAction {
    SetMonitoring(bool),
    SetZone(Option<Zone>),
    SetSelectedAnimals(Vec<String>),
    ToggleAnimal(String),
    SetAudio(Option<AudioClip>),
    SetNotifications(bool),
    SetCooldown(f64),
    RecordAlert(u64),
    Reset,
}

impl MonitoringAction {
    /// Actions that edit the monitoring setup and are refused during a session.
    fn edits_setup(&self) -> bool {
        matches!(
            self,
            MonitoringAction::SetZone(_)
                | MonitoringAction::SetSelectedAnimals(_)
                | MonitoringAction::ToggleAnimal(_)
                | MonitoringAction::SetAudio(_)
                | MonitoringAction::SetNotifications(_)
                | MonitoringAction::SetCooldown(_)
        )
    }
}

/// Apply an action to a snapshot, producing the next snapshot.
pub fn reduce(state: &MonitoringState, action: MonitoringAction) -> Result<MonitoringState> {
    if state.is_monitoring && action.edits_setup() {
        return Err(anyhow!("{:?} refused: setup is locked while monitoring", action));
    }

    let mut next = state.clone();
    match action {
        MonitoringAction::SetMonitoring(true) => {
            if !state.is_monitoring {
                if let Some(reason) = state.start_blocker() {
                    return Err(anyhow!("cannot start monitoring: {}", reason));
                }
            }
            next.is_monitoring = true;
        }
        MonitoringAction::SetMonitoring(false) => next.is_monitoring = false,
        MonitoringAction::SetZone(zone) => {
            if let Some(z) = &zone {
                if z.width < 0.0 || z.height < 0.0 {
                    return Err(anyhow!("zone dimensions must be non-negative"));
                }
            }
            next.zone = zone;
        }
        MonitoringAction::SetSelectedAnimals(labels) => {
            next.selected = SelectionSet::from_labels(labels)?;
        }
        MonitoringAction::ToggleAnimal(label) => {
            next.selected = state.selected.toggled(validate_category(&label)?);
        }
        MonitoringAction::SetAudio(clip) => next.alert.audio = clip.map(Arc::new),
        MonitoringAction::SetNotifications(enabled) => next.alert.notifications_enabled = enabled,
        MonitoringAction::SetCooldown(seconds) => {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(anyhow!("cooldown must be a non-negative number of seconds"));
            }
            next.alert.cooldown_seconds = seconds;
        }
        MonitoringAction::RecordAlert(now_ms) => next.last_alert_ms = Some(now_ms),
        MonitoringAction::Reset => next = MonitoringState::default(),
    }
    Ok(next)
}

/// Result of trying to pass the alert cooldown gate.
#[derive(Debug)]
pub enum AlertGate {
    /// The alert slot was taken; dispatch with this snapshot.
    Claimed(Arc<MonitoringState>),
    Cooling { remaining_ms: u64 },
}

/// Owner of the current snapshot.
#[derive(Debug)]
pub struct Session {
    current: Arc<MonitoringState>,
    revision: u64,
    changes: watch::Sender<u64>,
}

impl Default for Session {
    fn default() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            current: Arc::default(),
            revision: 0,
            changes,
        }
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_handle() -> SessionHandle {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn snapshot(&self) -> Arc<MonitoringState> {
        Arc::clone(&self.current)
    }

    /// Number of transitions applied so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Notified with the new revision after every applied transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Apply an action. On error the current snapshot is left untouched.
    pub fn dispatch(&mut self, action: MonitoringAction) -> Result<Arc<MonitoringState>> {
        let next = reduce(&self.current, action)?;
        self.current = Arc::new(next);
        self.revision += 1;
        self.changes.send_replace(self.revision);
        Ok(self.snapshot())
    }

    /// Cooldown check and `last_alert_ms` write as one step.
    pub fn try_claim_alert(&mut self, now_ms: u64) -> Result<AlertGate> {
        let remaining_ms = self.current.cooldown_remaining_ms(now_ms);
        if remaining_ms > 0 {
            return Ok(AlertGate::Cooling { remaining_ms });
        }
        let snapshot = self.dispatch(MonitoringAction::RecordAlert(now_ms))?;
        Ok(AlertGate::Claimed(snapshot))
    }
}

pub fn lock(session: &SessionHandle) -> Result<MutexGuard<'_, Session>> {
    session
        .lock()
        .map_err(|_| anyhow!("session lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_session() -> Session {
        let mut s = Session::new();
        s.dispatch(MonitoringAction::SetZone(Some(Zone::new(0.0, 0.0, 50.0, 50.0))))
            .unwrap();
        s.dispatch(MonitoringAction::ToggleAnimal("Cat".into())).unwrap();
        s
    }

    #[test]
    fn initial_state_is_idle() {
        let s = MonitoringState::default();
        assert!(!s.is_monitoring);
        assert!(s.zone.is_none());
        assert!(s.selected.is_empty());
        assert_eq!(s.alert.cooldown_seconds, 5.0);
        assert!(!s.alert.notifications_enabled);
        assert!(s.last_alert_ms.is_none());
    }

    #[test]
    fn start_requires_zone_and_selection() {
        let mut s = Session::new();
        assert_eq!(s.snapshot().start_blocker(), Some("draw a zone to start"));
        assert!(s.dispatch(MonitoringAction::SetMonitoring(true)).is_err());

        s.dispatch(MonitoringAction::SetZone(Some(Zone::new(0.0, 0.0, 20.0, 20.0))))
            .unwrap();
        assert_eq!(
            s.snapshot().start_blocker(),
            Some("select at least one animal")
        );
        assert!(s.dispatch(MonitoringAction::SetMonitoring(true)).is_err());

        s.dispatch(MonitoringAction::ToggleAnimal("dog".into())).unwrap();
        assert!(s.snapshot().can_start());
        assert!(s.dispatch(MonitoringAction::SetMonitoring(true)).unwrap().is_monitoring);
    }

    #[test]
    fn setup_is_frozen_while_monitoring() {
        let mut s = ready_session();
        s.dispatch(MonitoringAction::SetMonitoring(true)).unwrap();
        let before = s.snapshot();

        assert!(s.dispatch(MonitoringAction::SetZone(None)).is_err());
        assert!(s.dispatch(MonitoringAction::ToggleAnimal("dog".into())).is_err());
        assert!(s.dispatch(MonitoringAction::SetCooldown(1.0)).is_err());
        assert!(s.dispatch(MonitoringAction::SetNotifications(true)).is_err());
        assert!(Arc::ptr_eq(&before, &s.snapshot()));

        s.dispatch(MonitoringAction::SetMonitoring(false)).unwrap();
        assert!(s.dispatch(MonitoringAction::SetZone(None)).is_ok());
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut s = Session::new();
        s.dispatch(MonitoringAction::ToggleAnimal("cat".into())).unwrap();
        s.dispatch(MonitoringAction::ToggleAnimal("bird".into())).unwrap();
        s.dispatch(MonitoringAction::ToggleAnimal("cat".into())).unwrap();
        let labels: Vec<_> = s.snapshot().selected.iter().map(str::to_string).collect();
        assert_eq!(labels, vec!["bird"]);
        assert!(s.dispatch(MonitoringAction::ToggleAnimal("person".into())).is_err());
        assert!(s.dispatch(MonitoringAction::ToggleAnimal("c@t".into())).is_err());
    }

    #[test]
    fn each_transition_replaces_the_snapshot() {
        let mut s = Session::new();
        let a = s.snapshot();
        s.dispatch(MonitoringAction::SetCooldown(2.5)).unwrap();
        let b = s.snapshot();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.alert.cooldown_seconds, 5.0);
        assert_eq!(b.alert.cooldown_ms(), 2500);
        assert_eq!(s.revision(), 1);
    }

    #[test]
    fn claim_alert_respects_cooldown() {
        let mut s = Session::new();
        let t = 1_000_000;
        assert!(matches!(s.try_claim_alert(t).unwrap(), AlertGate::Claimed(_)));
        assert_eq!(s.snapshot().last_alert_ms, Some(t));

        match s.try_claim_alert(t + 3000).unwrap() {
            AlertGate::Cooling { remaining_ms } => assert_eq!(remaining_ms, 2000),
            other => panic!("expected cooldown, got {:?}", other),
        }
        assert_eq!(s.snapshot().last_alert_ms, Some(t));

        assert!(matches!(
            s.try_claim_alert(t + 5000).unwrap(),
            AlertGate::Claimed(_)
        ));
        assert_eq!(s.snapshot().last_alert_ms, Some(t + 5000));
    }

    #[test]
    fn concurrent_claims_pass_the_gate_once() {
        let handle = Session::new_handle();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let t = 1_700_000_000_000;

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let gate = lock(&handle).unwrap().try_claim_alert(t).unwrap();
                    matches!(gate, AlertGate::Claimed(_))
                })
            })
            .collect();
        let claimed = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|c| *c)
            .count();

        assert_eq!(claimed, 1);
        let s = lock(&handle).unwrap();
        assert_eq!(s.snapshot().last_alert_ms, Some(t));
        assert_eq!(s.revision(), 1);
    }

    #[test]
    fn subscribers_see_each_transition() {
        let mut s = Session::new();
        let mut changes = s.subscribe();
        assert!(!changes.has_changed().unwrap());

        s.dispatch(MonitoringAction::SetCooldown(1.0)).unwrap();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);

        // A refused transition is not announced.
        assert!(s.dispatch(MonitoringAction::SetCooldown(-1.0)).is_err());
        assert!(!changes.has_changed().unwrap());
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut s = ready_session();
        s.dispatch(MonitoringAction::SetMonitoring(true)).unwrap();
        s.dispatch(MonitoringAction::Reset).unwrap();
        let snap = s.snapshot();
        assert!(!snap.is_monitoring);
        assert!(snap.zone.is_none());
        assert!(snap.selected.is_empty());
    }

    #[test]
    fn replacing_audio_releases_previous_clip() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a.wav"), dir.path().join("b.ogg"));
        std::fs::write(&a, b"RIFF").unwrap();
        std::fs::write(&b, b"OggS").unwrap();
        let library = crate::audio::AudioLibrary::new();

        let mut s = Session::new();
        s.dispatch(MonitoringAction::SetAudio(Some(library.load(&a).unwrap())))
            .unwrap();
        s.dispatch(MonitoringAction::SetAudio(Some(library.load(&b).unwrap())))
            .unwrap();
        assert_eq!(library.live_clips(), 1);
        assert_eq!(s.snapshot().alert.audio.as_ref().unwrap().mime(), "audio/ogg");

        s.dispatch(MonitoringAction::SetAudio(None)).unwrap();
        assert_eq!(library.live_clips(), 0);
    }

    #[test]
    fn rejects_invalid_cooldown_and_zone() {
        let mut s = Session::new();
        assert!(s.dispatch(MonitoringAction::SetCooldown(-1.0)).is_err());
        assert!(s.dispatch(MonitoringAction::SetCooldown(f64::NAN)).is_err());
        assert!(s
            .dispatch(MonitoringAction::SetZone(Some(Zone::new(0.0, 0.0, -1.0, 5.0))))
            .is_err());
    }
}
