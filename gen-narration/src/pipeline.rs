//! Story orchestration: one narration pass per voice configuration.
//!
//! Text preparation runs once per story. Each voice configuration then
//! synthesizes, merges, assembles, and packages on its own; a failing
//! configuration is recorded and the others carry on.

use crate::audio::{AudioConcatenator, FfmpegConcatenator, write_chunk_files};
use crate::config::NarrationConfig;
use crate::error::{NarrationError, Result};
use crate::package::{AudioGenerationResult, VoiceAudioResult, VoiceFailure, package_voice};
use crate::scratch::{ScratchDir, default_scratch_root};
use crate::synthesis::{RenumberPolicy, SynthesisDriver, merge_timepoints, timeline_gaps};
use crate::text::{MarkupDocument, OversizePolicy, SsmlChunk, build_markup, normalize_story, split_markup};
use crate::voices::{VoiceCatalog, VoiceConfiguration};
use anyhow::Context;
use futures_util::{StreamExt, stream};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tts_client::SpeechSynthesizer;

/// Where a story or voice configuration is in its generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NotStarted,
    Normalizing,
    Marking,
    Chunking,
    Synthesizing,
    Merging,
    Assembling,
    Packaged,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NotStarted => "not started",
            Stage::Normalizing => "normalizing",
            Stage::Marking => "marking",
            Stage::Chunking => "chunking",
            Stage::Synthesizing => "synthesizing",
            Stage::Merging => "merging",
            Stage::Assembling => "assembling",
            Stage::Packaged => "packaged",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Marked-up story split into synthesis requests.
struct PreparedStory {
    doc: MarkupDocument,
    chunks: Vec<SsmlChunk>,
}

pub struct NarrationPipeline {
    catalog: VoiceCatalog,
    driver: SynthesisDriver,
    concatenator: Arc<dyn AudioConcatenator>,
    output_dir: PathBuf,
    scratch_root: PathBuf,
    max_chunk_bytes: usize,
    oversize_policy: OversizePolicy,
    renumber_policy: RenumberPolicy,
    max_concurrent_voices: usize,
    voice_timeout: Duration,
    keep_scratch: bool,
}

impl NarrationPipeline {
    /// Build a pipeline writing under `output_dir`, using FFmpeg for assembly.
    pub fn new(
        config: &NarrationConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let scratch_root = match &config.scratch_dir {
            Some(dir) => dir.clone(),
            None => default_scratch_root()?,
        };
        // Chunk paths handed to FFmpeg must not depend on the working directory
        let scratch_root = std::path::absolute(&scratch_root).with_context(|| {
            format!("Invalid scratch directory {}", scratch_root.display())
        })?;

        Ok(Self {
            catalog: config.catalog()?,
            driver: SynthesisDriver::new(synthesizer, config.synthesis_options()),
            concatenator: Arc::new(FfmpegConcatenator::new(config.ffmpeg_path.clone())),
            output_dir,
            scratch_root,
            max_chunk_bytes: config.max_chunk_bytes,
            oversize_policy: config.oversize_policy,
            renumber_policy: config.renumber_policy,
            max_concurrent_voices: config.max_concurrent_voices.max(1),
            voice_timeout: config.voice_timeout(),
            keep_scratch: config.keep_scratch,
        })
    }

    pub fn with_catalog(mut self, catalog: VoiceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_concatenator(mut self, concatenator: Arc<dyn AudioConcatenator>) -> Self {
        self.concatenator = concatenator;
        self
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Generate narration for every voice configuration of a story file.
    pub async fn generate(&self, story_path: &Path, story_id: &str) -> AudioGenerationResult {
        self.generate_with_progress(story_path, story_id, |_, _| {})
            .await
    }

    /// Like [`NarrationPipeline::generate`], calling `on_voice_done` as each
    /// voice configuration finishes.
    pub async fn generate_with_progress<F>(
        &self,
        story_path: &Path,
        story_id: &str,
        on_voice_done: F,
    ) -> AudioGenerationResult
    where
        F: Fn(&VoiceConfiguration, bool),
    {
        match std::fs::read_to_string(story_path) {
            Ok(raw) => self.generate_text(&raw, story_id, on_voice_done).await,
            Err(e) => {
                let err = NarrationError::Io(e);
                log::error!("[{}] {}: {}", story_id, Stage::Failed, err);
                self.finish(AudioGenerationResult::story_failure(story_id, &err))
            }
        }
    }

    /// Generate narration from story text already in memory.
    pub async fn generate_text<F>(
        &self,
        raw: &str,
        story_id: &str,
        on_voice_done: F,
    ) -> AudioGenerationResult
    where
        F: Fn(&VoiceConfiguration, bool),
    {
        log::info!("[{}] {}", story_id, Stage::NotStarted);

        let story = match self.prepare(raw, story_id) {
            Ok(story) => story,
            Err(e) => {
                log::error!("[{}] {}: {}", story_id, Stage::Failed, e);
                return self.finish(AudioGenerationResult::story_failure(story_id, &e));
            }
        };

        let scratch = match ScratchDir::create(&self.scratch_root, story_id, raw) {
            Ok(scratch) => scratch,
            Err(e) => {
                log::error!("[{}] {}: {}", story_id, Stage::Failed, e);
                return self.finish(AudioGenerationResult::story_failure(story_id, &e));
            }
        };

        let story = &story;
        let scratch_ref = &scratch;
        let on_voice_done = &on_voice_done;

        let mut outcomes: Vec<(usize, &VoiceConfiguration, Result<VoiceAudioResult>)> =
            stream::iter(self.catalog.iter().enumerate())
                .map(|(position, voice)| async move {
                    let outcome = match tokio::time::timeout(
                        self.voice_timeout,
                        self.run_voice(voice, story, scratch_ref, story_id),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => Err(NarrationError::Timeout {
                            operation: format!("generating {}", voice.label()),
                            after: self.voice_timeout,
                        }),
                    };
                    on_voice_done(voice, outcome.is_ok());
                    (position, voice, outcome)
                })
                .buffer_unordered(self.max_concurrent_voices)
                .collect()
                .await;

        outcomes.sort_by_key(|(position, _, _)| *position);

        let mut voice_results = Vec::new();
        let mut failures = Vec::new();
        for (_, voice, outcome) in outcomes {
            match outcome {
                Ok(result) => voice_results.push(result),
                Err(e) => {
                    log::warn!("[{}] {} {}: {}", story_id, voice.label(), Stage::Failed, e);
                    failures.push(VoiceFailure::new(voice, &e));
                }
            }
        }

        if self.keep_scratch {
            let kept = scratch.retain();
            log::info!("[{}] Scratch files kept in {}", story_id, kept.display());
        } else {
            drop(scratch);
        }

        let result = AudioGenerationResult::from_outcomes(story_id, voice_results, failures);
        if result.success {
            log::info!(
                "[{}] {} of {} voice configurations packaged",
                story_id,
                result.voice_results.len(),
                self.catalog.len()
            );
        } else {
            log::error!(
                "[{}] Every voice configuration failed: {}",
                story_id,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        self.finish(result)
    }

    /// Normalize, mark up, and chunk the story once for all voices.
    fn prepare(&self, raw: &str, story_id: &str) -> Result<PreparedStory> {
        log::info!("[{}] {}", story_id, Stage::Normalizing);
        let narration = normalize_story(raw)?;

        log::info!("[{}] {}", story_id, Stage::Marking);
        let doc = build_markup(&narration);

        log::info!("[{}] {}", story_id, Stage::Chunking);
        let chunks = split_markup(&doc, self.max_chunk_bytes, self.oversize_policy)?;
        log::info!(
            "[{}] {} marks in {} chunk(s) of at most {} bytes",
            story_id,
            doc.mark_count,
            chunks.len(),
            self.max_chunk_bytes
        );

        Ok(PreparedStory { doc, chunks })
    }

    async fn run_voice(
        &self,
        voice: &VoiceConfiguration,
        story: &PreparedStory,
        scratch: &ScratchDir,
        story_id: &str,
    ) -> Result<VoiceAudioResult> {
        let label = voice.label();

        log::info!("[{}] {} {}", story_id, label, Stage::Synthesizing);
        let audio = self.driver.synthesize_chunks(voice, &story.chunks).await?;

        log::info!("[{}] {} {}", story_id, label, Stage::Merging);
        let timeline = merge_timepoints(&audio, self.renumber_policy)?;
        let gaps = timeline_gaps(&timeline, story.doc.mark_count);
        if let Some(first) = gaps.first() {
            log::warn!(
                "[{}] {}: {} of {} marks have no timepoint (first: w{})",
                story_id,
                label,
                gaps.len(),
                story.doc.mark_count,
                first
            );
        }

        log::info!(
            "[{}] {} {} with {}",
            story_id,
            label,
            Stage::Assembling,
            self.concatenator.name()
        );
        let voice_dir = scratch.voice_dir(voice)?;
        let encoding = self.driver.encoding();
        let concatenator = Arc::clone(&self.concatenator);
        let assembled = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let files = write_chunk_files(&voice_dir, &audio, encoding)?;
            let inputs: Vec<&Path> = files.iter().map(|p| p.as_path()).collect();
            let output = voice_dir.join(format!("assembled.{}", encoding.extension()));
            concatenator.concatenate(&inputs, &output)?;
            Ok(output)
        })
        .await
        .map_err(|e| NarrationError::Concatenation(format!("assembly task failed: {}", e)))??;

        let result = package_voice(
            &self.output_dir,
            story_id,
            voice,
            &assembled,
            &timeline,
            encoding,
        )?;
        log::info!(
            "[{}] {} {}: {} ({:.2} MB)",
            story_id,
            label,
            Stage::Packaged,
            result.audio_file_path.display(),
            result.file_size_mb
        );

        Ok(result)
    }

    /// Persist the aggregate record next to the story's audio directory.
    fn finish(&self, result: AudioGenerationResult) -> AudioGenerationResult {
        if let Err(e) = result.write_json(&self.output_dir) {
            log::warn!("[{}] Could not write result record: {}", result.story_id, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ByteConcatenator;
    use crate::package::RESULT_FILE_NAME;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tts_client::{MockSynthesizer, Timepoint, VoiceGender};

    const SCENARIO: &str = "Hola mundo. [IMAGE: x.png] Pie de foto ignorado. Adiós.";

    struct Fixture {
        dir: TempDir,
        output: PathBuf,
        scratch: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out");
        let scratch = dir.path().join("scratch");
        Fixture {
            dir,
            output,
            scratch,
        }
    }

    fn pipeline(
        fixture: &Fixture,
        synthesizer: Arc<MockSynthesizer>,
        config: NarrationConfig,
    ) -> NarrationPipeline {
        let config = NarrationConfig {
            scratch_dir: Some(fixture.scratch.clone()),
            ..config
        };
        NarrationPipeline::new(&config, synthesizer, fixture.output.clone())
            .unwrap()
            .with_concatenator(Arc::new(ByteConcatenator))
    }

    fn single_voice() -> VoiceCatalog {
        VoiceCatalog::default()
            .restricted_to(&["es-ES/male".to_string()])
            .unwrap()
    }

    fn read_timings(result: &VoiceAudioResult) -> Vec<Timepoint> {
        serde_json::from_str(&std::fs::read_to_string(&result.timing_file_path).unwrap()).unwrap()
    }

    fn names(timeline: &[Timepoint]) -> Vec<String> {
        timeline.iter().map(|t| t.mark_name.clone()).collect()
    }

    #[tokio::test]
    async fn test_single_chunk_story() {
        let fixture = fixture();
        let mock = Arc::new(MockSynthesizer::new());
        let pipeline =
            pipeline(&fixture, mock.clone(), NarrationConfig::default()).with_catalog(single_voice());

        let result = pipeline.generate_text(SCENARIO, "story-1", |_, _| {}).await;

        assert!(result.success);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(
            mock.received_ssml()[0],
            "<speak><mark name='w0'/>Hola <mark name='w1'/>mundo. <mark name='w2'/>Adiós. </speak>"
        );

        let voice = &result.voice_results[0];
        let timeline = read_timings(voice);
        assert_eq!(names(&timeline), vec!["w0", "w1", "w2"]);
        assert!(
            timeline
                .windows(2)
                .all(|w| w[0].time_seconds < w[1].time_seconds)
        );
        assert!(
            voice
                .audio_file_path
                .ends_with("story-1/audio/es-ES/male/audio.mp3")
        );
    }

    #[tokio::test]
    async fn test_two_chunk_story_offsets_second_chunk() {
        let fixture = fixture();
        let mock = Arc::new(MockSynthesizer::new());
        let config = NarrationConfig {
            max_chunk_bytes: 70,
            max_concurrent_chunks: 1,
            ..NarrationConfig::default()
        };
        let pipeline = pipeline(&fixture, mock.clone(), config).with_catalog(single_voice());

        let result = pipeline.generate_text(SCENARIO, "story-2", |_, _| {}).await;

        assert!(result.success);
        let requests = mock.received_ssml();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("mundo."));
        assert_eq!(requests[1], "<speak><mark name='w0'/>Adiós. </speak>");

        let voice = &result.voice_results[0];
        assert_eq!(names(&read_timings(voice)), vec!["w0", "w1", "w2"]);

        // Chunk audio is joined in order
        let audio = std::fs::read_to_string(&voice.audio_file_path).unwrap();
        assert_eq!(audio, format!("{}{}", requests[0], requests[1]));
    }

    #[tokio::test]
    async fn test_one_failing_voice_is_isolated() {
        let fixture = fixture();
        let mock = Arc::new(MockSynthesizer::new().failing_for_voice("es-US-Neural2-A"));
        let pipeline = pipeline(&fixture, mock, NarrationConfig::default());
        let finished = AtomicUsize::new(0);

        let result = pipeline
            .generate_text(SCENARIO, "story-3", |_, _| {
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(result.success);
        assert_eq!(result.voice_results.len(), 3);
        assert_eq!(finished.load(Ordering::SeqCst), 4);

        let labels: Vec<_> = result
            .voice_results
            .iter()
            .map(|r| format!("{}/{}", r.language_code, r.gender.label()))
            .collect();
        assert_eq!(labels, vec!["es-ES/male", "es-ES/female", "es-US/male"]);

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].language_code, "es-US");
        assert_eq!(result.failures[0].gender, VoiceGender::Female);
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_all_voices_failing() {
        let fixture = fixture();
        let mut mock = MockSynthesizer::new();
        for voice in VoiceCatalog::default().iter() {
            mock = mock.failing_for_voice(&voice.voice_name);
        }
        let pipeline = pipeline(&fixture, Arc::new(mock), NarrationConfig::default());

        let result = pipeline.generate_text(SCENARIO, "story-4", |_, _| {}).await;

        assert!(!result.success);
        assert!(result.voice_results.is_empty());
        assert_eq!(result.failures.len(), 4);
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn test_empty_story_fails_without_synthesis() {
        let fixture = fixture();
        let mock = Arc::new(MockSynthesizer::new());
        let pipeline = pipeline(&fixture, mock.clone(), NarrationConfig::default());

        let result = pipeline
            .generate_text("[IMAGE: cover.png]\nUna portada.\n", "story-5", |_, _| {})
            .await;

        assert!(!result.success);
        assert_eq!(mock.call_count(), 0);
        assert_eq!(
            result.error_message.as_deref(),
            Some(NarrationError::EmptyNarration.to_string().as_str())
        );
        assert!(
            fixture
                .output
                .join("story-5/audio")
                .join(RESULT_FILE_NAME)
                .exists()
        );
    }

    #[tokio::test]
    async fn test_oversized_word_fails_story() {
        let fixture = fixture();
        let config = NarrationConfig {
            max_chunk_bytes: 40,
            ..NarrationConfig::default()
        };
        let pipeline = pipeline(&fixture, Arc::new(MockSynthesizer::new()), config);

        let result = pipeline
            .generate_text("Supercalifragilisticoespialidoso", "story-6", |_, _| {})
            .await;

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("ceiling"));
    }

    #[tokio::test]
    async fn test_scratch_removed_after_run() {
        let fixture = fixture();
        let mock = Arc::new(MockSynthesizer::new().failing_for_voice("es-ES-Neural2-H"));
        let pipeline = pipeline(&fixture, mock, NarrationConfig::default());

        pipeline.generate_text(SCENARIO, "story-7", |_, _| {}).await;

        let leftovers = std::fs::read_dir(&fixture.scratch).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_scratch_kept_on_request() {
        let fixture = fixture();
        let config = NarrationConfig {
            keep_scratch: true,
            ..NarrationConfig::default()
        };
        let pipeline =
            pipeline(&fixture, Arc::new(MockSynthesizer::new()), config).with_catalog(single_voice());

        pipeline.generate_text(SCENARIO, "story-8", |_, _| {}).await;

        let kept: Vec<_> = std::fs::read_dir(&fixture.scratch)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].join("es-ES_male").join("chunk_0000.mp3").exists());
    }

    #[tokio::test]
    async fn test_dropped_mark_still_packages() {
        let fixture = fixture();
        let mock = Arc::new(MockSynthesizer::new().dropping_mark("w1"));
        let pipeline =
            pipeline(&fixture, mock, NarrationConfig::default()).with_catalog(single_voice());

        let result = pipeline.generate_text(SCENARIO, "story-9", |_, _| {}).await;

        assert!(result.success);
        assert_eq!(names(&read_timings(&result.voice_results[0])), vec!["w0", "w2"]);
    }

    #[tokio::test]
    async fn test_missing_story_file() {
        let fixture = fixture();
        let pipeline = pipeline(&fixture, Arc::new(MockSynthesizer::new()), NarrationConfig::default());

        let result = pipeline
            .generate(&fixture.output.join("missing.txt"), "story-10")
            .await;

        assert!(!result.success);
        assert!(result.error_message.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_scratch_dir_assembles_with_ffmpeg() {
        let fixture = fixture();
        let scratch = TempDir::new_in(".").unwrap();
        assert!(scratch.path().is_relative());
        let ffmpeg = crate::audio::assembler::write_fake_ffmpeg(fixture.dir.path());

        let mock = Arc::new(MockSynthesizer::new());
        let config = NarrationConfig {
            scratch_dir: Some(scratch.path().to_path_buf()),
            max_chunk_bytes: 70,
            max_concurrent_chunks: 1,
            ..NarrationConfig::default()
        };
        let pipeline = NarrationPipeline::new(&config, mock.clone(), fixture.output.clone())
            .unwrap()
            .with_catalog(single_voice())
            .with_concatenator(Arc::new(FfmpegConcatenator::new(Some(ffmpeg))));

        let result = pipeline.generate_text(SCENARIO, "story-11", |_, _| {}).await;

        assert!(result.success, "{:?}", result.failures);
        let requests = mock.received_ssml();
        assert_eq!(requests.len(), 2);
        let audio = std::fs::read_to_string(&result.voice_results[0].audio_file_path).unwrap();
        assert_eq!(audio, format!("{}{}", requests[0], requests[1]));
    }

    struct SlowConcatenator(Duration);

    impl AudioConcatenator for SlowConcatenator {
        fn concatenate(&self, inputs: &[&Path], output: &Path) -> Result<()> {
            std::thread::sleep(self.0);
            ByteConcatenator.concatenate(inputs, output)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_voice_timeout_fails_configuration() {
        let fixture = fixture();
        let config = NarrationConfig {
            voice_timeout_secs: 1,
            max_concurrent_voices: 4,
            ..NarrationConfig::default()
        };
        let pipeline = pipeline(&fixture, Arc::new(MockSynthesizer::new()), config)
            .with_concatenator(Arc::new(SlowConcatenator(Duration::from_millis(1500))));

        let result = pipeline.generate_text(SCENARIO, "story-12", |_, _| {}).await;

        assert!(!result.success);
        assert!(result.voice_results.is_empty());
        assert_eq!(result.failures.len(), 4);
        for failure in &result.failures {
            assert!(
                failure.error.starts_with("Timed out after 1s while generating"),
                "{}",
                failure.error
            );
        }

        let leftovers = std::fs::read_dir(&fixture.scratch).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Synthesizing.to_string(), "synthesizing");
        assert_eq!(Stage::Packaged.to_string(), "packaged");
    }
}
