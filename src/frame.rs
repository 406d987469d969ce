//! Camera frames.
//!
//! - `Frame`: one captured image. Pixel bytes are private; detectors read them through
//!   `Frame::pixels` and get nothing else back out but detections.
//! - `FrameSource`: the camera collaborator. Besides frames it reports two sizes, the
//!   native capture resolution and the size the video is rendered at. Their ratio is the
//!   `DisplayScale` applied to every detection.

use anyhow::{anyhow, Result};

use crate::geometry::DisplayScale;

/// Width/height pair in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct Frame {
    /// Private pixel data (8-bit luma).
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture sequence number within the source.
    pub seq: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} luma bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            seq,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Camera collaborator.
pub trait FrameSource: Send {
    /// Capture resolution.
    fn native_size(&self) -> FrameSize;

    /// Size the video is rendered at (the zone's coordinate space).
    fn display_size(&self) -> FrameSize;

    fn capture(&mut self) -> Result<Frame>;

    fn display_scale(&self) -> Result<DisplayScale> {
        DisplayScale::from_sizes(self.native_size().as_tuple(), self.display_size().as_tuple())
    }
}

/// Produces flat gray frames at a fixed size. Used by the daemon when no real camera is
/// wired in, and by tests.
#[derive(Debug)]
pub struct SyntheticCamera {
    native: FrameSize,
    display: FrameSize,
    seq: u64,
}

impl SyntheticCamera {
    pub fn new(native: FrameSize, display: FrameSize) -> Self {
        Self {
            native,
            display,
            seq: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.seq
    }
}

impl FrameSource for SyntheticCamera {
    fn native_size(&self) -> FrameSize {
        self.native
    }

    fn display_size(&self) -> FrameSize {
        self.display
    }

    fn capture(&mut self) -> Result<Frame> {
        self.seq += 1;
        let len = self.native.width as usize * self.native.height as usize;
        Frame::new(
            vec![(self.seq % 256) as u8; len],
            self.native.width,
            self.native.height,
            self.seq,
        )
    }
}
