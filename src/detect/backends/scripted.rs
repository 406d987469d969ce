use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::detect::backend::{CollaboratorUnavailable, DetectorBackend};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One scripted frame.
///
/// A script is JSON lines; each line is either a list of detections or a failure:
///
/// ```text
/// [{"bbox":[10,10,40,40],"class":"cat","score":0.9}]
/// []
/// {"error":"inference timed out"}
/// {"error":"camera unplugged","fatal":true}
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Detections(Vec<Detection>),
    Fail {
        error: String,
        #[serde(default)]
        fatal: bool,
    },
}

/// Replays a fixed sequence of detector outputs, one step per `detect` call.
/// Once exhausted it either wraps around or reports nothing.
pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    cursor: usize,
    repeat: bool,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            cursor: 0,
            repeat: false,
        }
    }

    pub fn from_frames(frames: Vec<Vec<Detection>>) -> Self {
        Self::new(frames.into_iter().map(ScriptStep::Detections).collect())
    }

    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn parse(script: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for (idx, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let step: ScriptStep = serde_json::from_str(line)
                .map_err(|e| anyhow!("script line {}: {}", idx + 1, e))?;
            steps.push(step);
        }
        Ok(Self::new(steps))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn next_step(&mut self) -> Option<ScriptStep> {
        if self.cursor >= self.steps.len() {
            if !self.repeat || self.steps.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let step = self.steps[self.cursor].clone();
        self.cursor += 1;
        Some(step)
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        match self.next_step() {
            None => Ok(Vec::new()),
            Some(ScriptStep::Detections(detections)) => Ok(detections),
            Some(ScriptStep::Fail { error, fatal: true }) => {
                Err(CollaboratorUnavailable::new("model", error).into())
            }
            Some(ScriptStep::Fail { error, fatal: false }) => Err(anyhow!(error)),
        }
    }
}
