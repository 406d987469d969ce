//! Breach alerting with a cooldown.
//!
//! A breach episode start asks `AlertManager::on_breach` to alert. The cooldown gate and
//! the `last_alert_ms` write happen under the session lock in one step, so two callers
//! can never both pass the gate. The collaborators are then called outside the lock.

use anyhow::Result;

use crate::audio::AudioPlayer;
use crate::notify::{Notifier, ALERT_TAG};
use crate::state::{AlertGate, SessionHandle};

pub const ALERT_TITLE: &str = "Boundary Breach Detected!";
pub const ALERT_BODY: &str = "An animal has entered the restricted zone.";

/// Milliseconds until another alert may fire. Zero when none was ever sent.
pub fn cooldown_remaining_ms(last_alert_ms: Option<u64>, cooldown_ms: u64, now_ms: u64) -> u64 {
    match last_alert_ms {
        None => 0,
        Some(last) => cooldown_ms.saturating_sub(now_ms.saturating_sub(last)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertDecision {
    /// Still cooling down from the previous alert.
    Suppressed { remaining_ms: u64 },
    /// Alert slot claimed. Flags report which collaborators succeeded.
    Dispatched { notified: bool, played: bool },
    /// Alert slot claimed but no alert method is configured.
    Silent,
}

/// Dispatches alerts to the configured collaborators.
#[derive(Default)]
pub struct AlertManager {
    notifier: Option<Box<dyn Notifier>>,
    player: Option<Box<dyn AudioPlayer>>,
    dispatched: u64,
    suppressed: u64,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_player(mut self, player: Box<dyn AudioPlayer>) -> Self {
        self.player = Some(player);
        self
    }

    /// Alerts that passed the cooldown gate.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Whether an alert at `now_ms` would pass the cooldown gate.
    pub fn can_trigger(&self, session: &SessionHandle, now_ms: u64) -> Result<bool> {
        Ok(crate::state::lock(session)?
            .snapshot()
            .can_trigger_alert(now_ms))
    }

    pub fn cooldown_remaining(&self, session: &SessionHandle, now_ms: u64) -> Result<u64> {
        Ok(crate::state::lock(session)?
            .snapshot()
            .cooldown_remaining_ms(now_ms))
    }

    /// Handle the start of a breach episode at `now_ms`.
    ///
    /// Only a poisoned session lock is an error. Collaborator failures are logged.
    pub fn on_breach(&mut self, session: &SessionHandle, now_ms: u64) -> Result<AlertDecision> {
        let gate = crate::state::lock(session)?.try_claim_alert(now_ms)?;
        let snapshot = match gate {
            AlertGate::Cooling { remaining_ms } => {
                self.suppressed += 1;
                log::info!("breach alert suppressed: cooling down ({} ms left)", remaining_ms);
                return Ok(AlertDecision::Suppressed { remaining_ms });
            }
            AlertGate::Claimed(snapshot) => snapshot,
        };
        self.dispatched += 1;

        if !snapshot.alert.has_alert_method() {
            log::warn!(
                "breach detected but no alert method is configured (enable notifications or set an alert sound)"
            );
            return Ok(AlertDecision::Silent);
        }

        let mut notified = false;
        if snapshot.alert.notifications_enabled {
            match self.notifier.as_mut() {
                Some(n) => match n.show(ALERT_TITLE, ALERT_BODY, ALERT_TAG) {
                    Ok(()) => notified = true,
                    Err(e) => log::warn!("notification failed: {}", e),
                },
                None => log::warn!("notifications enabled but no notifier attached"),
            }
        }

        let mut played = false;
        if let Some(clip) = snapshot.alert.audio.as_deref() {
            match self.player.as_mut() {
                Some(p) => match p.play(clip) {
                    Ok(()) => played = true,
                    Err(e) => log::warn!("alert sound playback failed: {}", e),
                },
                None => log::warn!("alert sound {} set but no player attached", clip.name()),
            }
        }

        log::info!("breach alert dispatched (notified={}, played={})", notified, played);
        Ok(AlertDecision::Dispatched { notified, played })
    }
}
