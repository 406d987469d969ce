use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::editor::{EditorConfig, DEFAULT_HANDLE_RADIUS, MIN_ZONE_SIZE};
use crate::frame::FrameSize;
use crate::geometry::{normalize, Zone};
use crate::state::{validate_category, DEFAULT_COOLDOWN_SECONDS};

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_DISPLAY_WIDTH: u32 = 640;
const DEFAULT_DISPLAY_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_BACKEND: &str = "synthetic";

#[derive(Debug, Deserialize, Default)]
struct GuardConfigFile {
    poll_interval_ms: Option<u64>,
    cooldown_seconds: Option<f64>,
    handle_radius: Option<f64>,
    min_zone_size: Option<f64>,
    display: Option<DisplayConfigFile>,
    camera: Option<CameraConfigFile>,
    selected: Option<Vec<String>>,
    zone: Option<Zone>,
    audio_path: Option<PathBuf>,
    audio_player: Option<String>,
    notifications: Option<bool>,
    backend: Option<String>,
    script_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub poll_interval: Duration,
    pub cooldown_seconds: f64,
    pub handle_radius: f64,
    pub min_zone_size: f64,
    pub display: FrameSize,
    pub camera: CameraSettings,
    pub selected: Vec<String>,
    pub zone: Option<Zone>,
    pub audio_path: Option<PathBuf>,
    /// External program used to play the alert sound.
    pub audio_player: Option<String>,
    /// Ask for notification permission at startup.
    pub notifications: bool,
    pub backend: String,
    pub script_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub size: FrameSize,
    pub fps: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        // An empty file struct only yields defaults, which always convert.
        Self::from_file(GuardConfigFile::default())
    }
}

impl GuardConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ZONE_GUARD_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load with an explicit config file (e.g. from `--config`), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuardConfigFile) -> Self {
        let display = FrameSize::new(
            file.display
                .as_ref()
                .and_then(|d| d.width)
                .unwrap_or(DEFAULT_DISPLAY_WIDTH),
            file.display
                .as_ref()
                .and_then(|d| d.height)
                .unwrap_or(DEFAULT_DISPLAY_HEIGHT),
        );
        let camera = CameraSettings {
            size: FrameSize::new(
                file.camera
                    .as_ref()
                    .and_then(|c| c.width)
                    .unwrap_or(DEFAULT_CAMERA_WIDTH),
                file.camera
                    .as_ref()
                    .and_then(|c| c.height)
                    .unwrap_or(DEFAULT_CAMERA_HEIGHT),
            ),
            fps: file
                .camera
                .as_ref()
                .and_then(|c| c.fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
        };
        Self {
            poll_interval: Duration::from_millis(
                file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            cooldown_seconds: file.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECONDS),
            handle_radius: file.handle_radius.unwrap_or(DEFAULT_HANDLE_RADIUS),
            min_zone_size: file.min_zone_size.unwrap_or(MIN_ZONE_SIZE),
            display,
            camera,
            selected: file.selected.unwrap_or_default(),
            zone: file.zone,
            audio_path: file.audio_path,
            audio_player: file.audio_player,
            notifications: file.notifications.unwrap_or(false),
            backend: file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            script_path: file.script_path,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(ms) = std::env::var("ZONE_GUARD_POLL_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                anyhow!("ZONE_GUARD_POLL_MS must be an integer number of milliseconds")
            })?;
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Ok(secs) = std::env::var("ZONE_GUARD_COOLDOWN_SECS") {
            self.cooldown_seconds = secs
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONE_GUARD_COOLDOWN_SECS must be a number of seconds"))?;
        }
        if let Ok(selected) = std::env::var("ZONE_GUARD_SELECTED") {
            self.selected = split_csv(&selected);
        }
        if let Ok(backend) = std::env::var("ZONE_GUARD_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("ZONE_GUARD_SCRIPT") {
            if !path.trim().is_empty() {
                self.script_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("ZONE_GUARD_AUDIO") {
            if !path.trim().is_empty() {
                self.audio_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    /// Editor settings for the display surface.
    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            container_width: self.display.width as f64,
            container_height: self.display.height as f64,
            handle_radius: self.handle_radius,
            min_zone_size: self.min_zone_size,
        }
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow!("display dimensions must be greater than zero"));
        }
        if self.camera.size.width == 0 || self.camera.size.height == 0 {
            return Err(anyhow!("camera dimensions must be greater than zero"));
        }
        if !self.cooldown_seconds.is_finite() || self.cooldown_seconds < 0.0 {
            return Err(anyhow!("cooldown must be a non-negative number of seconds"));
        }
        if !(self.handle_radius > 0.0) || !(self.min_zone_size >= 0.0) {
            return Err(anyhow!("handle radius must be positive and min zone size non-negative"));
        }

        let mut selected = Vec::with_capacity(self.selected.len());
        for label in &self.selected {
            let label = validate_category(label)?;
            if !selected.contains(&label) {
                selected.push(label);
            }
        }
        self.selected = selected;

        if let Some(zone) = self.zone {
            let zone = normalize(
                zone,
                self.display.width as f64,
                self.display.height as f64,
            );
            if !zone.exceeds(self.min_zone_size) {
                return Err(anyhow!(
                    "configured zone is smaller than {} px once fitted to the display",
                    self.min_zone_size
                ));
            }
            self.zone = Some(zone);
        }
        if self.backend.trim().is_empty() {
            return Err(anyhow!("backend name must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GuardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
