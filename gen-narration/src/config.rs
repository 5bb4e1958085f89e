//! gen-narration configuration management.

use crate::synthesis::{RenumberPolicy, SynthesisOptions};
use crate::text::{DEFAULT_MAX_CHUNK_BYTES, OversizePolicy};
use crate::voices::{VoiceCatalog, VoiceConfiguration};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tts_client::AudioEncoding;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_VOICE_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    /// Byte ceiling for one synthesis request's SSML
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// What to do with a single piece larger than the ceiling
    #[serde(default)]
    pub oversize_policy: OversizePolicy,

    /// How chunk-local mark names map back to story-wide ids
    #[serde(default)]
    pub renumber_policy: RenumberPolicy,

    #[serde(default)]
    pub audio_encoding: AudioEncoding,

    /// Synthesis requests in flight per voice
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Voice configurations processed at once
    #[serde(default = "default_max_concurrent_voices")]
    pub max_concurrent_voices: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Limit for one voice configuration end to end
    #[serde(default = "default_voice_timeout_secs")]
    pub voice_timeout_secs: u64,

    /// Retries for rate limits and server errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Leave chunk audio and concat lists on disk after a run
    #[serde(default)]
    pub keep_scratch: bool,

    /// FFmpeg binary. None means `ffmpeg` on PATH.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Root for per-story scratch directories. None means the data dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Replaces the built-in voice catalog
    #[serde(default)]
    pub voices: Option<Vec<VoiceConfiguration>>,
}

fn default_max_chunk_bytes() -> usize {
    DEFAULT_MAX_CHUNK_BYTES
}

fn default_max_concurrent_chunks() -> usize {
    4
}

fn default_max_concurrent_voices() -> usize {
    2
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_voice_timeout_secs() -> u64 {
    DEFAULT_VOICE_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    3
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: default_max_chunk_bytes(),
            oversize_policy: OversizePolicy::default(),
            renumber_policy: RenumberPolicy::default(),
            audio_encoding: AudioEncoding::default(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            max_concurrent_voices: default_max_concurrent_voices(),
            request_timeout_secs: default_request_timeout_secs(),
            voice_timeout_secs: default_voice_timeout_secs(),
            max_retries: default_max_retries(),
            keep_scratch: false,
            ffmpeg_path: None,
            scratch_dir: None,
            voices: None,
        }
    }
}

impl NarrationConfig {
    /// Get the config file path: ~/.config/cli-programs/gen-narration.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("gen-narration.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: NarrationConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Voice catalog, from the config file if it lists voices.
    pub fn catalog(&self) -> Result<VoiceCatalog> {
        match &self.voices {
            Some(voices) => VoiceCatalog::new(voices.clone()),
            None => Ok(VoiceCatalog::default()),
        }
    }

    pub fn synthesis_options(&self) -> SynthesisOptions {
        SynthesisOptions {
            encoding: self.audio_encoding,
            max_concurrent_chunks: self.max_concurrent_chunks.max(1),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            ..SynthesisOptions::default()
        }
    }

    pub fn voice_timeout(&self) -> Duration {
        Duration::from_secs(self.voice_timeout_secs)
    }
}
