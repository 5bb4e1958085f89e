use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Audio encoding requested from the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    #[default]
    Mp3,
    OggOpus,
    Linear16,
}

impl AudioEncoding {
    /// File extension for audio in this encoding
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::OggOpus => "ogg",
            Self::Linear16 => "wav",
        }
    }

    /// Name used on the provider wire format
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::OggOpus => "OGG_OPUS",
            Self::Linear16 => "LINEAR16",
        }
    }
}

/// Voice gender as understood by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
}

impl VoiceGender {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Male => "MALE",
            Self::Female => "FEMALE",
        }
    }

    /// Lowercase label used in output paths and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }
}

/// Concrete provider voice identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelection {
    pub language_code: String,
    pub voice_name: String,
    pub gender: VoiceGender,
}

/// Request to synthesize one SSML document
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub ssml: String,
    pub voice: VoiceSelection,
    pub encoding: AudioEncoding,
    /// Ask the provider to report the time of every `<mark/>`
    pub enable_mark_timepoints: bool,
}

/// Time at which a named SSML mark was reached, relative to the start of the
/// audio returned for the same request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timepoint {
    pub mark_name: String,
    pub time_seconds: f64,
}

impl Timepoint {
    pub fn new(mark_name: impl Into<String>, time_seconds: f64) -> Self {
        Self {
            mark_name: mark_name.into(),
            time_seconds,
        }
    }
}

/// Response from a speech synthesis provider
#[derive(Debug, Clone)]
pub struct SynthesisResponse {
    /// Encoded audio bytes, in the requested encoding
    pub audio: Vec<u8>,
    /// Mark timepoints in the order the provider reported them
    pub timepoints: Vec<Timepoint>,
}

/// Trait for speech synthesis providers
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one SSML document
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse>;

    /// Get the provider name for display
    fn name(&self) -> &'static str;

    /// Check if the provider is usable (credentials present, etc.)
    fn is_available(&self) -> Result<()>;
}
