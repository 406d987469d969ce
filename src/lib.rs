//! Zone Guard
//!
//! Watches a live camera feed for selected animal categories and raises an alert when one
//! of them enters a user-drawn restricted zone.
//!
//! # Architecture
//!
//! The crate is a pure in-process core with collaborators behind traits:
//!
//! 1. **Geometry**: zones live in display space, detections in frame space; every
//!    detection is scaled before it is tested against the zone.
//! 2. **One state snapshot**: `Session` holds an immutable `MonitoringState`. Every
//!    transition replaces it whole, and the setup is locked while monitoring.
//! 3. **Edge-triggered breach**: the polling loop fires once per breach episode, and the
//!    alert manager rate-limits dispatch with a cooldown.
//! 4. **No stale results**: detector calls that resolve after a session was torn down are
//!    discarded.
//!
//! # Module Structure
//!
//! - `geometry`: `Zone`, `BBox`, resize handles, normalization, intersection
//! - `editor`: pointer-driven zone drawing and resizing
//! - `state`: `MonitoringState`, the reducer and the `Session` store
//! - `polling` / `runner`: the detection loop core and its tokio driver
//! - `alert`, `audio`, `notify`: alert dispatch and its collaborators
//! - `frame`, `detect`: camera and detector collaborators
//! - `config`: daemon configuration

use std::time::{SystemTime, UNIX_EPOCH};

pub mod alert;
pub mod audio;
pub mod config;
pub mod detect;
pub mod editor;
pub mod frame;
pub mod geometry;
pub mod notify;
pub mod polling;
pub mod runner;
pub mod state;

pub use alert::{AlertDecision, AlertManager, ALERT_BODY, ALERT_TITLE};
pub use audio::{AudioClip, AudioLibrary, AudioPlayer, CommandPlayer};
pub use config::GuardConfig;
pub use detect::{
    BackendRegistry, CollaboratorUnavailable, Detection, DetectorBackend, SharedBackend,
};
pub use editor::{EditOutcome, EditorConfig, EditorState, ZoneEditor};
pub use frame::{Frame, FrameSize, FrameSource, SyntheticCamera};
pub use geometry::{BBox, DisplayScale, ResizeHandle, Zone};
pub use notify::{LogNotifier, Notifier, Permission, ALERT_TAG};
pub use polling::{DetectionLoop, LoopStatus, TickOutcome};
pub use runner::{LoopReport, MonitorRunner, RunSummary};
pub use state::{MonitoringAction, MonitoringState, Session, SessionHandle};

/// Milliseconds since the Unix epoch. A clock before 1970 reads as zero.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
