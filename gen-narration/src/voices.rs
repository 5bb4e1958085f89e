//! Fixed catalog of narration voices, one per (language, gender).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tts_client::{VoiceGender, VoiceSelection};

/// A concrete provider voice for one language and gender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfiguration {
    pub language_code: String,
    pub gender: VoiceGender,
    pub voice_name: String,
}

impl VoiceConfiguration {
    pub fn new(language_code: &str, gender: VoiceGender, voice_name: &str) -> Self {
        Self {
            language_code: language_code.to_string(),
            gender,
            voice_name: voice_name.to_string(),
        }
    }

    /// Voice identity sent with each synthesis request.
    pub fn selection(&self) -> VoiceSelection {
        VoiceSelection {
            language_code: self.language_code.clone(),
            voice_name: self.voice_name.clone(),
            gender: self.gender,
        }
    }

    /// Short label like `es-US/female`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.language_code, self.gender.label())
    }
}

/// Immutable, ordered voice table built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCatalog {
    voices: Vec<VoiceConfiguration>,
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self {
            voices: vec![
                VoiceConfiguration::new("es-ES", VoiceGender::Male, "es-ES-Neural2-G"),
                VoiceConfiguration::new("es-ES", VoiceGender::Female, "es-ES-Neural2-H"),
                VoiceConfiguration::new("es-US", VoiceGender::Male, "es-US-Neural2-C"),
                VoiceConfiguration::new("es-US", VoiceGender::Female, "es-US-Neural2-A"),
            ],
        }
    }
}

impl VoiceCatalog {
    /// Build a catalog, rejecting empty tables and repeated (language, gender) pairs.
    pub fn new(voices: Vec<VoiceConfiguration>) -> Result<Self> {
        if voices.is_empty() {
            anyhow::bail!("Voice catalog is empty");
        }
        for (i, voice) in voices.iter().enumerate() {
            if voices[..i]
                .iter()
                .any(|v| v.language_code == voice.language_code && v.gender == voice.gender)
            {
                anyhow::bail!("Duplicate voice configuration for {}", voice.label());
            }
        }
        Ok(Self { voices })
    }

    /// Look up the voice for a language and gender.
    pub fn get(&self, language_code: &str, gender: VoiceGender) -> Option<&VoiceConfiguration> {
        self.voices
            .iter()
            .find(|v| v.language_code == language_code && v.gender == gender)
    }

    /// Look up a voice by its `language/gender` label.
    pub fn get_by_label(&self, label: &str) -> Option<&VoiceConfiguration> {
        let (language, gender) = label.split_once('/')?;
        self.get(language, VoiceGender::from_label(gender)?)
    }

    /// Keep only the voices whose labels are listed, in catalog order.
    pub fn restricted_to(&self, labels: &[String]) -> Result<Self> {
        for label in labels {
            if self.get_by_label(label).is_none() {
                anyhow::bail!("Unknown voice '{}'. Use language/gender, e.g. es-US/female", label);
            }
        }
        let voices = self
            .voices
            .iter()
            .filter(|v| labels.iter().any(|l| self.get_by_label(l) == Some(*v)))
            .cloned()
            .collect();
        Self::new(voices)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoiceConfiguration> {
        self.voices.iter()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }
}
