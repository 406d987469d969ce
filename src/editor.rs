//! Zone editor - turns pointer gestures into zone edits.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Drawing              (pointer down away from any handle, or no zone yet)
//! Idle -> Resizing(handle)     (pointer down within the handle radius of the zone)
//! Drawing|Resizing -> Idle     (pointer up or pointer leaving the surface)
//! Drawing|Resizing -> Idle     (move or release after monitoring started; gesture dropped)
//! ```
//!
//! The gesture zone is live (shown while dragging) but only committed to the session on
//! release, and only if both sides exceed the minimum size. Nothing here runs while the
//! session is monitoring.

use anyhow::Result;

use crate::geometry::{apply_resize, hit_test_handle, normalize, ResizeHandle, Zone};
use crate::state::{MonitoringAction, Session};

pub const DEFAULT_HANDLE_RADIUS: f64 = 12.0;
pub const MIN_ZONE_SIZE: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditorState {
    Idle,
    Drawing {
        /// Where the pointer went down.
        anchor: (f64, f64),
    },
    Resizing {
        handle: ResizeHandle,
        /// Last pointer position; deltas are taken from here and it advances every move.
        anchor: (f64, f64),
    },
}

/// What a pointer event did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditOutcome {
    /// Nothing to do in the current state.
    Ignored,
    /// The session is monitoring; the zone cannot be touched.
    Locked,
    DrawStarted,
    ResizeStarted(ResizeHandle),
    /// Live zone changed (not committed).
    Updated(Zone),
    Committed(Zone),
    /// Released below the minimum size; the session zone is unchanged.
    Discarded,
    Cleared,
}

#[derive(Clone, Copy, Debug)]
pub struct EditorConfig {
    pub container_width: f64,
    pub container_height: f64,
    pub handle_radius: f64,
    pub min_zone_size: f64,
}

impl EditorConfig {
    pub fn new(container_width: f64, container_height: f64) -> Self {
        Self {
            container_width,
            container_height,
            handle_radius: DEFAULT_HANDLE_RADIUS,
            min_zone_size: MIN_ZONE_SIZE,
        }
    }
}

#[derive(Debug)]
pub struct ZoneEditor {
    config: EditorConfig,
    state: EditorState,
    live: Option<Zone>,
}

impl ZoneEditor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            state: EditorState::Idle,
            live: None,
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Zone to render: the gesture in progress, otherwise the committed one.
    pub fn visible_zone(&self, session: &Session) -> Option<Zone> {
        match self.state {
            EditorState::Idle => session.snapshot().zone,
            _ => self.live,
        }
    }

    pub fn pointer_down(&mut self, session: &Session, x: f64, y: f64) -> EditOutcome {
        let snapshot = session.snapshot();
        if snapshot.is_monitoring {
            return EditOutcome::Locked;
        }
        if self.state != EditorState::Idle {
            return EditOutcome::Ignored;
        }

        if let Some(zone) = snapshot.zone {
            if let Some(handle) = hit_test_handle(x, y, &zone, self.config.handle_radius) {
                self.state = EditorState::Resizing {
                    handle,
                    anchor: (x, y),
                };
                self.live = Some(zone);
                return EditOutcome::ResizeStarted(handle);
            }
        }

        self.state = EditorState::Drawing { anchor: (x, y) };
        self.live = Some(Zone::new(x, y, 0.0, 0.0));
        EditOutcome::DrawStarted
    }

    pub fn pointer_move(&mut self, session: &Session, x: f64, y: f64) -> EditOutcome {
        if session.snapshot().is_monitoring {
            self.abandon();
            return EditOutcome::Locked;
        }
        let next = match self.state {
            EditorState::Idle => return EditOutcome::Ignored,
            EditorState::Drawing { anchor: (ax, ay) } => Zone::new(
                ax.min(x),
                ay.min(y),
                (x - ax).abs(),
                (y - ay).abs(),
            ),
            EditorState::Resizing { handle, anchor } => {
                let Some(current) = self.live else {
                    return EditOutcome::Ignored;
                };
                self.state = EditorState::Resizing {
                    handle,
                    anchor: (x, y),
                };
                apply_resize(current, handle, x - anchor.0, y - anchor.1)
            }
        };
        let zone = normalize(next, self.config.container_width, self.config.container_height);
        self.live = Some(zone);
        EditOutcome::Updated(zone)
    }

    pub fn pointer_up(&mut self, session: &mut Session) -> Result<EditOutcome> {
        if session.snapshot().is_monitoring {
            // Monitoring started mid-gesture; the zone it froze stays.
            self.abandon();
            return Ok(EditOutcome::Locked);
        }
        if self.state == EditorState::Idle {
            return Ok(EditOutcome::Ignored);
        }
        self.state = EditorState::Idle;
        let Some(zone) = self.live.take() else {
            return Ok(EditOutcome::Discarded);
        };
        if !zone.exceeds(self.config.min_zone_size) {
            log::debug!(
                "zone {:.0}x{:.0} below minimum size, discarded",
                zone.width,
                zone.height
            );
            return Ok(EditOutcome::Discarded);
        }
        session.dispatch(MonitoringAction::SetZone(Some(zone)))?;
        log::info!(
            "zone set: x={:.0} y={:.0} w={:.0} h={:.0}",
            zone.x,
            zone.y,
            zone.width,
            zone.height
        );
        Ok(EditOutcome::Committed(zone))
    }

    fn abandon(&mut self) {
        if self.state != EditorState::Idle {
            log::debug!("zone gesture abandoned: monitoring is active");
        }
        self.state = EditorState::Idle;
        self.live = None;
    }

    /// Leaving the surface finishes the gesture exactly like a release.
    pub fn pointer_leave(&mut self, session: &mut Session) -> Result<EditOutcome> {
        self.pointer_up(session)
    }

    pub fn clear_zone(&mut self, session: &mut Session) -> Result<EditOutcome> {
        if session.snapshot().is_monitoring {
            return Ok(EditOutcome::Locked);
        }
        if self.state != EditorState::Idle {
            return Ok(EditOutcome::Ignored);
        }
        session.dispatch(MonitoringAction::SetZone(None))?;
        log::info!("zone cleared");
        Ok(EditOutcome::Cleared)
    }
}
