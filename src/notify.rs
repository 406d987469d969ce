//! Desktop notification collaborator.

use anyhow::Result;
use std::collections::HashMap;

use crate::state::{MonitoringAction, SessionHandle};

/// Fixed notification tag; repeated breach notifications replace each other.
pub const ALERT_TAG: &str = "boundary-breach";

/// Outcome of a permission request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Default,
}

pub trait Notifier: Send {
    /// Ask the platform for permission to show notifications. May block on the user.
    fn request_permission(&mut self) -> Result<Permission>;

    /// Show a notification. Notifications sharing a tag coalesce.
    fn show(&mut self, title: &str, body: &str, tag: &str) -> Result<()>;
}

/// Writes notifications to the log. Always granted.
#[derive(Debug, Default)]
pub struct LogNotifier {
    shown: HashMap<String, u64>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many notifications were shown under `tag`.
    pub fn shown(&self, tag: &str) -> u64 {
        self.shown.get(tag).copied().unwrap_or(0)
    }
}

impl Notifier for LogNotifier {
    fn request_permission(&mut self) -> Result<Permission> {
        Ok(Permission::Granted)
    }

    fn show(&mut self, title: &str, body: &str, tag: &str) -> Result<()> {
        let count = self.shown.entry(tag.to_string()).or_insert(0);
        *count += 1;
        if *count > 1 {
            log::warn!("[{}] {} - {} (replaces previous)", tag, title, body);
        } else {
            log::warn!("[{}] {} - {}", tag, title, body);
        }
        Ok(())
    }
}

/// Request notification permission and record the result in the session.
///
/// Notifications are enabled only on an explicit grant. A failed request is logged and
/// leaves the config as it was.
pub fn request_notifications(
    session: &SessionHandle,
    notifier: &mut dyn Notifier,
) -> Result<Permission> {
    let permission = match notifier.request_permission() {
        Ok(p) => p,
        Err(e) => {
            log::error!("notification permission request failed: {}", e);
            return Err(e);
        }
    };
    let granted = permission == Permission::Granted;
    crate::state::lock(session)?.dispatch(MonitoringAction::SetNotifications(granted))?;
    log::info!("notification permission: {:?}", permission);
    Ok(permission)
}
