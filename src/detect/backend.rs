use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// The model is a black box: a frame goes in, `(class, bbox, score)` triples come out.
/// Boxes are in the frame's native pixel coordinates.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Load model weights. Called once before the first `detect`.
    ///
    /// A failure here is terminal for the session and should be returned as
    /// `CollaboratorUnavailable`.
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run detection on a frame.
    ///
    /// Ordinary errors are treated as transient (logged, next tick tries again).
    /// Return `CollaboratorUnavailable` to stop the loop.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// A collaborator (camera, model) can no longer serve this session.
///
/// Carried inside `anyhow::Error`; the polling loop looks for it with `downcast_ref`.
#[derive(Debug)]
pub struct CollaboratorUnavailable {
    pub collaborator: &'static str,
    pub reason: String,
}

impl CollaboratorUnavailable {
    pub fn new(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self {
            collaborator,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for CollaboratorUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} unavailable: {}", self.collaborator, self.reason)
    }
}

impl std::error::Error for CollaboratorUnavailable {}

/// Is this error terminal for the session?
pub fn is_unavailable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CollaboratorUnavailable>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn unavailable_survives_anyhow_wrapping() {
        let err: anyhow::Error = CollaboratorUnavailable::new("model", "weights missing").into();
        assert!(is_unavailable(&err));
        assert_eq!(err.to_string(), "model unavailable: weights missing");
        assert!(!is_unavailable(&anyhow!("one bad frame")));
    }
}
