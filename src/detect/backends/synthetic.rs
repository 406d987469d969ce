use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BBox;

/// Simulated scene: one animal wandering around the frame.
///
/// Deterministic for a given seed. The animal is sometimes out of view, which gives the
/// polling loop real breach episodes to edge-trigger on.
pub struct SyntheticBackend {
    rng: StdRng,
    classes: Vec<String>,
    class: usize,
    pos: (f64, f64),
    vel: (f64, f64),
    size: f64,
    visible: bool,
}

const STEP_PX: f64 = 40.0;
const APPEAR_CHANCE: f64 = 0.3;
const VANISH_CHANCE: f64 = 0.05;

impl SyntheticBackend {
    pub fn new(seed: u64, classes: Vec<String>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            classes,
            class: 0,
            pos: (0.0, 0.0),
            vel: (0.0, 0.0),
            size: 0.0,
            visible: false,
        }
    }

    fn spawn(&mut self, width: f64, height: f64) {
        self.size = self.rng.gen_range(0.1..0.25) * width.min(height);
        self.pos = (
            self.rng.gen_range(0.0..(width - self.size).max(1.0)),
            self.rng.gen_range(0.0..(height - self.size).max(1.0)),
        );
        self.vel = (
            self.rng.gen_range(-STEP_PX..STEP_PX),
            self.rng.gen_range(-STEP_PX..STEP_PX),
        );
        if !self.classes.is_empty() {
            self.class = self.rng.gen_range(0..self.classes.len());
        }
        self.visible = true;
    }

    fn advance(&mut self, width: f64, height: f64) {
        let max_x = (width - self.size).max(0.0);
        let max_y = (height - self.size).max(0.0);
        let (mut x, mut y) = (self.pos.0 + self.vel.0, self.pos.1 + self.vel.1);
        if x < 0.0 || x > max_x {
            self.vel.0 = -self.vel.0;
            x = x.clamp(0.0, max_x);
        }
        if y < 0.0 || y > max_y {
            self.vel.1 = -self.vel.1;
            y = y.clamp(0.0, max_y);
        }
        self.pos = (x, y);
    }
}

impl DetectorBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (width, height) = (frame.width as f64, frame.height as f64);
        if self.classes.is_empty() {
            return Ok(Vec::new());
        }

        if !self.visible {
            if self.rng.gen_bool(APPEAR_CHANCE) {
                self.spawn(width, height);
            } else {
                return Ok(Vec::new());
            }
        } else if self.rng.gen_bool(VANISH_CHANCE) {
            self.visible = false;
            return Ok(Vec::new());
        } else {
            self.advance(width, height);
        }

        let score = self.rng.gen_range(0.55..0.98);
        Ok(vec![Detection::new(
            &self.classes[self.class],
            BBox::new(self.pos.0, self.pos.1, self.size, self.size),
            score,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec![0; 200 * 100], 200, 100, 1).unwrap()
    }

    #[test]
    fn same_seed_same_scene() {
        let classes = vec!["cat".to_string(), "dog".to_string()];
        let mut a = SyntheticBackend::new(7, classes.clone());
        let mut b = SyntheticBackend::new(7, classes);
        for _ in 0..50 {
            assert_eq!(a.detect(&frame()).unwrap(), b.detect(&frame()).unwrap());
        }
    }

    #[test]
    fn animal_stays_inside_frame() {
        let mut backend = SyntheticBackend::new(42, vec!["bird".to_string()]);
        let mut seen = 0;
        for _ in 0..500 {
            for d in backend.detect(&frame()).unwrap() {
                seen += 1;
                assert_eq!(d.class, "bird");
                assert!(d.bbox.x >= 0.0 && d.bbox.y >= 0.0);
                assert!(d.bbox.x + d.bbox.width <= 200.0 + 1e-9);
                assert!(d.bbox.y + d.bbox.height <= 100.0 + 1e-9);
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn no_classes_no_detections() {
        let mut backend = SyntheticBackend::new(1, Vec::new());
        assert!(backend.detect(&frame()).unwrap().is_empty());
    }
}
