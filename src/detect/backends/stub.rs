use anyhow::Result;

use crate::detect::backend::{CollaboratorUnavailable, DetectorBackend};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for testing. Reports the same detections for every frame.
pub struct StubBackend {
    detections: Vec<Detection>,
    load_error: Option<String>,
    calls: u64,
}

impl StubBackend {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            load_error: None,
            calls: 0,
        }
    }

    /// A backend whose model never loads.
    pub fn failing_load(reason: &str) -> Self {
        Self {
            detections: Vec::new(),
            load_error: Some(reason.to_string()),
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn load(&mut self) -> Result<()> {
        match &self.load_error {
            Some(reason) => Err(CollaboratorUnavailable::new("model", reason.clone()).into()),
            None => Ok(()),
        }
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backend::is_unavailable;
    use crate::geometry::BBox;

    #[test]
    fn stub_repeats_detections() {
        let frame = Frame::new(vec![0; 4], 2, 2, 1).unwrap();
        let mut backend = StubBackend::new(vec![Detection::new(
            "cat",
            BBox::new(0.0, 0.0, 1.0, 1.0),
            0.9,
        )]);
        backend.load().unwrap();
        assert_eq!(backend.detect(&frame).unwrap().len(), 1);
        assert_eq!(backend.detect(&frame).unwrap().len(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn failing_load_is_unavailable() {
        let mut backend = StubBackend::failing_load("no weights");
        let err = backend.load().unwrap_err();
        assert!(is_unavailable(&err));
    }
}
