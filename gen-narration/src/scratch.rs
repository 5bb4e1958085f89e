//! Per-story scratch space for intermediate chunk audio.

use crate::error::{NarrationError, Result};
use crate::voices::VoiceConfiguration;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the base data directory for gen-narration.
fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("gen-narration"))
        .ok_or_else(|| {
            NarrationError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;

    Ok(data_dir)
}

/// Default root holding every story's scratch directory.
pub fn default_scratch_root() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("scratch"))
}

/// First 16 hex characters of the SHA-256 of the story text.
pub fn compute_story_hash(story_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(story_text.as_bytes());
    let result = hasher.finalize();

    format!("{:x}", result)[..16].to_string()
}

/// A scratch directory owned by one story's generation run.
///
/// Removed when dropped, on success and failure alike, unless
/// [`ScratchDir::retain`] was called.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    retained: bool,
}

impl ScratchDir {
    /// Create `{root}/{story_id}_{hash}_{timestamp}`.
    pub fn create(root: &Path, story_id: &str, story_text: &str) -> Result<Self> {
        let story_hash = compute_story_hash(story_text);
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let path = root.join(format!("{}_{}_{}", story_id, story_hash, timestamp));

        fs::create_dir_all(&path).map_err(|e| NarrationError::persist(&path, e))?;
        log::debug!("Created scratch directory {}", path.display());

        Ok(Self {
            path,
            retained: false,
        })
    }

    /// Subdirectory for one voice configuration's chunk files.
    pub fn voice_dir(&self, voice: &VoiceConfiguration) -> Result<PathBuf> {
        let dir = self
            .path
            .join(format!("{}_{}", voice.language_code, voice.gender.label()));
        fs::create_dir_all(&dir).map_err(|e| NarrationError::persist(&dir, e))?;
        Ok(dir)
    }

    /// Keep the directory on disk and return its path.
    pub fn retain(mut self) -> PathBuf {
        self.retained = true;
        self.path.clone()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.retained {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Removed scratch directory {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove scratch directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
