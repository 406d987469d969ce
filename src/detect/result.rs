use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

/// One object reported by a detector for one frame.
///
/// No identity survives between frames; each tick gets a fresh list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `[x, y, width, height]` in native frame pixels.
    pub bbox: BBox,
    /// Category label, e.g. "cat".
    pub class: String,
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

impl Detection {
    pub fn new(class: &str, bbox: BBox, score: f32) -> Self {
        Self {
            bbox,
            class: class.to_string(),
            score,
        }
    }

    /// Overlay label, e.g. `cat 87%`.
    pub fn label(&self) -> String {
        format!("{} {:.0}%", self.class, self.score * 100.0)
    }
}
