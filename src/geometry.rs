//! Zone geometry.
//!
//! Two coordinate spaces meet here:
//! - display space: the rendered surface the user draws on (`Zone` lives here)
//! - frame space: the native resolution of captured frames (`BBox` from detectors lives here)
//!
//! A `BBox` must go through `scale_bbox` before it is compared with a `Zone`.
//!
//! Intersection uses strict inequalities: rectangles that only share an edge do not
//! intersect (an animal standing on the fence line has not crossed it).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Restricted zone in display coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Zone {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Both dimensions strictly exceed `min_size`.
    pub fn exceeds(&self, min_size: f64) -> bool {
        self.width > min_size && self.height > min_size
    }

    /// Parse `x,y,width,height`.
    pub fn parse_csv(value: &str) -> Result<Self> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| anyhow!("zone must be x,y,width,height: {}", e))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(anyhow!(
                "zone must have exactly 4 components, got {}",
                parts.len()
            )),
        }
    }
}

/// Detection bounding box: `[x, y, width, height]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

impl From<Zone> for BBox {
    fn from(z: Zone) -> Self {
        Self::new(z.x, z.y, z.width, z.height)
    }
}

/// Factors mapping frame space onto display space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayScale {
    pub x: f64,
    pub y: f64,
}

impl DisplayScale {
    pub const IDENTITY: DisplayScale = DisplayScale { x: 1.0, y: 1.0 };

    /// `display / native` per axis. A zero native dimension means the camera has not
    /// reported its resolution yet.
    pub fn from_sizes(native: (u32, u32), display: (u32, u32)) -> Result<Self> {
        if native.0 == 0 || native.1 == 0 {
            return Err(anyhow!(
                "native frame size {}x{} is not known yet",
                native.0,
                native.1
            ));
        }
        Ok(Self {
            x: display.0 as f64 / native.0 as f64,
            y: display.1 as f64 / native.1 as f64,
        })
    }
}

/// Clamp a zone so it lies fully inside a `container_w` x `container_h` surface.
pub fn normalize(z: Zone, container_w: f64, container_h: f64) -> Zone {
    let container_w = container_w.max(0.0);
    let container_h = container_h.max(0.0);
    let x = z.x.min(container_w).max(0.0);
    let y = z.y.min(container_h).max(0.0);
    Zone {
        x,
        y,
        width: z.width.min(container_w - x).max(0.0),
        height: z.height.min(container_h - y).max(0.0),
    }
}

/// Strict axis-aligned overlap test between a display-space bbox and the zone.
pub fn intersects(bbox: &BBox, zone: &Zone) -> bool {
    let box_right = bbox.x + bbox.width;
    let box_bottom = bbox.y + bbox.height;
    !(box_right <= zone.x
        || bbox.x >= zone.right()
        || box_bottom <= zone.y
        || bbox.y >= zone.bottom())
}

/// Map a frame-space bbox into display space.
pub fn scale_bbox(bbox: &BBox, scale: DisplayScale) -> BBox {
    BBox {
        x: bbox.x * scale.x,
        y: bbox.y * scale.y,
        width: bbox.width * scale.x,
        height: bbox.height * scale.y,
    }
}

/// One of the eight resize grips around a zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
    North,
    South,
    East,
    West,
}

impl ResizeHandle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeHandle::NorthWest => "nw",
            ResizeHandle::NorthEast => "ne",
            ResizeHandle::SouthWest => "sw",
            ResizeHandle::SouthEast => "se",
            ResizeHandle::North => "n",
            ResizeHandle::South => "s",
            ResizeHandle::East => "e",
            ResizeHandle::West => "w",
        }
    }
}

impl fmt::Display for ResizeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResizeHandle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nw" => Ok(ResizeHandle::NorthWest),
            "ne" => Ok(ResizeHandle::NorthEast),
            "sw" => Ok(ResizeHandle::SouthWest),
            "se" => Ok(ResizeHandle::SouthEast),
            "n" => Ok(ResizeHandle::North),
            "s" => Ok(ResizeHandle::South),
            "e" => Ok(ResizeHandle::East),
            "w" => Ok(ResizeHandle::West),
            other => Err(anyhow!("unknown resize handle '{}'", other)),
        }
    }
}

/// Which handle (if any) lies within `radius` of `(x, y)`.
///
/// Corners are tested first: a corner sits at the end of two edge ranges and must win.
pub fn hit_test_handle(x: f64, y: f64, zone: &Zone, radius: f64) -> Option<ResizeHandle> {
    let near = |a: f64, b: f64| (a - b).abs() < radius;
    let (left, top, right, bottom) = (zone.x, zone.y, zone.right(), zone.bottom());

    if near(x, left) && near(y, top) {
        return Some(ResizeHandle::NorthWest);
    }
    if near(x, right) && near(y, top) {
        return Some(ResizeHandle::NorthEast);
    }
    if near(x, left) && near(y, bottom) {
        return Some(ResizeHandle::SouthWest);
    }
    if near(x, right) && near(y, bottom) {
        return Some(ResizeHandle::SouthEast);
    }

    let within_y = y > top && y < bottom;
    let within_x = x > left && x < right;
    if near(x, left) && within_y {
        return Some(ResizeHandle::West);
    }
    if near(x, right) && within_y {
        return Some(ResizeHandle::East);
    }
    if near(y, top) && within_x {
        return Some(ResizeHandle::North);
    }
    if near(y, bottom) && within_x {
        return Some(ResizeHandle::South);
    }
    None
}

/// Move the grabbed handle by `(dx, dy)`. The result is not normalized.
pub fn apply_resize(zone: Zone, handle: ResizeHandle, dx: f64, dy: f64) -> Zone {
    let Zone {
        x,
        y,
        width,
        height,
    } = zone;
    match handle {
        ResizeHandle::NorthWest => Zone::new(x + dx, y + dy, width - dx, height - dy),
        ResizeHandle::NorthEast => Zone::new(x, y + dy, width + dx, height - dy),
        ResizeHandle::SouthWest => Zone::new(x + dx, y, width - dx, height + dy),
        ResizeHandle::SouthEast => Zone::new(x, y, width + dx, height + dy),
        ResizeHandle::North => Zone::new(x, y + dy, width, height - dy),
        ResizeHandle::South => Zone::new(x, y, width, height + dy),
        ResizeHandle::East => Zone::new(x, y, width + dx, height),
        ResizeHandle::West => Zone::new(x + dx, y, width - dx, height),
    }
}
