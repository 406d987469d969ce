//! Alert sound clips.
//!
//! An uploaded clip is a scoped resource: `AudioLibrary::acquire` hands out an
//! `AudioClip`, and dropping the clip releases it. The alert config owns the clip, so
//! replacing or clearing the configured sound releases the previous one. The library
//! counts live clips so a leak on repeated replacement is observable.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Issues and tracks audio clip handles.
#[derive(Debug, Default)]
pub struct AudioLibrary {
    live: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl AudioLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a clip for a file on disk. Only `audio/*` content is accepted.
    pub fn acquire(&self, path: &Path, mime: &str) -> Result<AudioClip> {
        if !mime.starts_with("audio/") {
            return Err(anyhow!(
                "{} is not an audio file (type {})",
                path.display(),
                mime
            ));
        }
        let meta = std::fs::metadata(path)
            .map_err(|e| anyhow!("failed to read audio file {}: {}", path.display(), e))?;
        if !meta.is_file() {
            return Err(anyhow!("{} is not a regular file", path.display()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.live.fetch_add(1, Ordering::SeqCst);
        log::debug!("audio clip #{} acquired: {}", id, path.display());
        Ok(AudioClip {
            id,
            path: path.to_path_buf(),
            mime: mime.to_string(),
            size_bytes: meta.len(),
            live: Arc::clone(&self.live),
        })
    }

    /// Acquire a clip, inferring its type from the file extension.
    pub fn load(&self, path: &Path) -> Result<AudioClip> {
        let mime = mime_from_extension(path)
            .ok_or_else(|| anyhow!("unrecognised audio file type: {}", path.display()))?;
        self.acquire(path, mime)
    }

    /// Number of clips acquired and not yet released.
    pub fn live_clips(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "ogg" | "oga" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        "m4a" => Some("audio/mp4"),
        "aac" => Some("audio/aac"),
        "weba" => Some("audio/webm"),
        _ => None,
    }
}

/// Handle to an uploaded sound. Released on drop.
#[derive(Debug)]
pub struct AudioClip {
    id: u64,
    path: PathBuf,
    mime: String,
    size_bytes: u64,
    live: Arc<AtomicUsize>,
}

impl AudioClip {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Drop for AudioClip {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        log::debug!("audio clip #{} released", self.id);
    }
}

/// Audio playback collaborator.
///
/// Playback may be refused by the platform; callers log the error and carry on.
pub trait AudioPlayer: Send {
    /// Play the clip from its beginning.
    fn play(&mut self, clip: &AudioClip) -> Result<()>;
}

/// Plays clips by spawning an external player (`aplay`, `afplay`, `paplay`, ...).
pub struct CommandPlayer {
    program: String,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&mut self, clip: &AudioClip) -> Result<()> {
        // Fire-and-forget: each alert starts a fresh process, so the clip restarts.
        Command::new(&self.program)
            .arg(clip.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow!("failed to start audio player {}: {}", self.program, e))?;
        Ok(())
    }
}
