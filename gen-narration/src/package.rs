//! Result packaging: final audio and timing files per voice configuration.

use crate::error::{NarrationError, Result};
use crate::voices::VoiceConfiguration;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tts_client::{AudioEncoding, Timepoint, VoiceGender};

/// File name of the serialized [`AudioGenerationResult`].
pub const RESULT_FILE_NAME: &str = "audio_result.json";
pub const TIMINGS_FILE_NAME: &str = "timings.json";

/// Output of one successful voice configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAudioResult {
    pub language_code: String,
    pub gender: VoiceGender,
    pub voice_name: String,
    pub audio_file_path: PathBuf,
    pub timing_file_path: PathBuf,
    /// Size of the audio file in MiB
    pub file_size_mb: f64,
}

/// A voice configuration that produced no output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceFailure {
    pub language_code: String,
    pub gender: VoiceGender,
    pub error: String,
}

impl VoiceFailure {
    pub fn new(voice: &VoiceConfiguration, error: &NarrationError) -> Self {
        Self {
            language_code: voice.language_code.clone(),
            gender: voice.gender,
            error: error.to_string(),
        }
    }
}

/// Everything produced for one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioGenerationResult {
    pub success: bool,
    pub story_id: String,
    pub voice_results: Vec<VoiceAudioResult>,
    #[serde(default)]
    pub failures: Vec<VoiceFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AudioGenerationResult {
    /// Aggregate per-voice outcomes. Succeeds when any voice produced output.
    pub fn from_outcomes(
        story_id: &str,
        voice_results: Vec<VoiceAudioResult>,
        failures: Vec<VoiceFailure>,
    ) -> Self {
        let success = !voice_results.is_empty();
        let error_message = if success || failures.is_empty() {
            None
        } else {
            Some(
                failures
                    .iter()
                    .map(|f| format!("{}/{}: {}", f.language_code, f.gender.label(), f.error))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        Self {
            success,
            story_id: story_id.to_string(),
            voice_results,
            failures,
            error_message,
        }
    }

    /// A failure that stopped the story before any voice ran.
    pub fn story_failure(story_id: &str, error: &NarrationError) -> Self {
        Self {
            success: false,
            story_id: story_id.to_string(),
            voice_results: Vec::new(),
            failures: Vec::new(),
            error_message: Some(error.to_string()),
        }
    }

    /// Write `audio_result.json` into `{output_dir}/{story_id}/audio/`.
    pub fn write_json(&self, output_dir: &Path) -> Result<PathBuf> {
        let dir = output_dir.join(&self.story_id).join("audio");
        fs::create_dir_all(&dir).map_err(|e| NarrationError::persist(&dir, e))?;

        let path = dir.join(RESULT_FILE_NAME);
        write_json_pretty(&path, self)?;
        Ok(path)
    }
}

/// `{output_dir}/{story_id}/audio/{language}/{gender}`
pub fn voice_output_dir(output_dir: &Path, story_id: &str, voice: &VoiceConfiguration) -> PathBuf {
    output_dir
        .join(story_id)
        .join("audio")
        .join(&voice.language_code)
        .join(voice.gender.label())
}

/// Place the assembled audio and the merged timeline in the voice's output
/// directory.
pub fn package_voice(
    output_dir: &Path,
    story_id: &str,
    voice: &VoiceConfiguration,
    assembled_audio: &Path,
    timeline: &[Timepoint],
    encoding: AudioEncoding,
) -> Result<VoiceAudioResult> {
    let dir = voice_output_dir(output_dir, story_id, voice);
    fs::create_dir_all(&dir).map_err(|e| NarrationError::persist(&dir, e))?;

    let audio_file_path = dir.join(format!("audio.{}", encoding.extension()));
    fs::copy(assembled_audio, &audio_file_path)
        .map_err(|e| NarrationError::persist(&audio_file_path, e))?;

    let timing_file_path = dir.join(TIMINGS_FILE_NAME);
    write_json_pretty(&timing_file_path, timeline)?;

    let size = fs::metadata(&audio_file_path)
        .map_err(|e| NarrationError::persist(&audio_file_path, e))?
        .len();

    Ok(VoiceAudioResult {
        language_code: voice.language_code.clone(),
        gender: voice.gender,
        voice_name: voice.voice_name.clone(),
        audio_file_path,
        timing_file_path,
        file_size_mb: size as f64 / (1024.0 * 1024.0),
    })
}

fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| NarrationError::persist(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| NarrationError::persist(path, e.into()))?;
    writer
        .flush()
        .map_err(|e| NarrationError::persist(path, e))?;
    Ok(())
}
