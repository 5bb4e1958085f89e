//! gen-narration - Narrate illustrated stories with word-level timing marks

mod audio;
mod config;
mod error;
mod package;
mod pipeline;
mod scratch;
mod synthesis;
mod text;
mod voices;

use anyhow::{Context, Result};
use audio::FfmpegConcatenator;
use clap::{Parser, Subcommand};
use config::NarrationConfig;
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::NarrationPipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use text::OversizePolicy;

#[derive(Parser, Debug)]
#[command(name = "gen-narration")]
#[command(about = "Narrate illustrated stories with word-level timing marks", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the story text file
    story_file: Option<PathBuf>,

    /// Story identifier used in output paths (default: file stem)
    #[arg(long)]
    story_id: Option<String>,

    /// Root directory for generated audio
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Voice configurations to generate, as language/gender (repeatable)
    #[arg(long = "voice")]
    voices: Vec<String>,

    /// Byte ceiling for one synthesis request
    #[arg(long)]
    max_chunk_bytes: Option<usize>,

    /// Speech provider (default from ~/.config/cli-programs/tts.toml)
    #[arg(long)]
    provider: Option<String>,

    /// Keep per-chunk audio files after the run
    #[arg(long)]
    keep_scratch: bool,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show how a story would be split into synthesis requests
    Chunks {
        /// Path to the story text file
        story_file: PathBuf,

        /// Byte ceiling for one synthesis request
        #[arg(long)]
        max_chunk_bytes: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set the byte ceiling for one synthesis request
    SetMaxChunkBytes {
        /// Bytes (at least 64)
        value: usize,
    },
    /// Set how many voice configurations run at once
    SetVoiceConcurrency {
        /// Value (1-8)
        value: usize,
    },
    /// Set how many chunk requests run at once per voice
    SetChunkConcurrency {
        /// Value (1-16)
        value: usize,
    },
    /// Set the FFmpeg binary used for assembly
    SetFfmpeg {
        /// Path to ffmpeg
        path: PathBuf,
    },
    /// Allow words larger than the chunk ceiling to be sent alone
    SetAllowOversize {
        /// true or false
        value: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // Handle subcommands
    match &args.command {
        Some(Commands::Config { action }) => {
            return handle_config_command(action);
        }
        Some(Commands::Chunks {
            story_file,
            max_chunk_bytes,
        }) => {
            return handle_chunks_command(story_file, *max_chunk_bytes);
        }
        None => {}
    }

    let story_path = args.story_file.clone().ok_or_else(|| {
        anyhow::anyhow!("Story file path is required. Run 'gen-narration --help' for usage.")
    })?;

    if !story_path.exists() {
        anyhow::bail!("Story file not found: {}", story_path.display());
    }

    let story_id = match &args.story_id {
        Some(id) => id.clone(),
        None => story_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a story id; pass --story-id"))?,
    };

    // Load configuration
    let mut config = NarrationConfig::load().context("Failed to load configuration")?;
    if let Some(bytes) = args.max_chunk_bytes {
        config.max_chunk_bytes = bytes;
    }
    if args.keep_scratch {
        config.keep_scratch = true;
    }

    let tts_config = tts_client::Config::load().context("Failed to load TTS configuration")?;
    let provider_name = args
        .provider
        .clone()
        .unwrap_or_else(|| tts_config.provider.clone());
    let synthesizer = tts_client::get_provider(
        &provider_name,
        tts_config.get_provider_config(&provider_name),
    )
    .context("Failed to create speech provider")?;
    synthesizer
        .is_available()
        .with_context(|| format!("Speech provider '{}' is not available", synthesizer.name()))?;

    let ffmpeg_available = match &config.ffmpeg_path {
        Some(path) => FfmpegConcatenator::new(Some(path.clone())).is_available(),
        None => audio::is_ffmpeg_available(),
    };
    if !ffmpeg_available {
        anyhow::bail!(
            "FFmpeg not found. Install it or run 'gen-narration config set-ffmpeg <path>'."
        );
    }

    if args.debug {
        eprintln!("Story: {}", story_path.display());
        eprintln!("Story id: {}", story_id);
        eprintln!("Output: {}", args.output_dir.display());
        eprintln!("Provider: {}", synthesizer.name());
        eprintln!("Chunk ceiling: {} bytes", config.max_chunk_bytes);
    }

    let mut pipeline =
        NarrationPipeline::new(&config, Arc::from(synthesizer), args.output_dir.clone())?;
    if !args.voices.is_empty() {
        let catalog = pipeline.catalog().restricted_to(&args.voices)?;
        pipeline = pipeline.with_catalog(catalog);
    }

    eprintln!(
        "Generating {} voice configuration(s) for \"{}\"...",
        pipeline.catalog().len(),
        story_id
    );

    let pb = ProgressBar::new(pipeline.catalog().len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let result = pipeline
        .generate_with_progress(&story_path, &story_id, |voice, ok| {
            pb.inc(1);
            pb.set_message(format!(
                "{} {}",
                voice.label(),
                if ok { "done" } else { "FAILED" }
            ));
        })
        .await;

    pb.finish_with_message("Narration complete");

    // Report summary
    for voice in &result.voice_results {
        eprintln!(
            "  {}/{} ({}): {} ({:.1} MB)",
            voice.language_code,
            voice.gender.label(),
            voice.voice_name,
            voice.audio_file_path.display(),
            voice.file_size_mb
        );
    }
    for failure in &result.failures {
        eprintln!(
            "  {}/{}: FAILED - {}",
            failure.language_code,
            failure.gender.label(),
            failure.error
        );
    }

    eprintln!(
        "\nCompleted: {}, Failed: {}",
        result.voice_results.len(),
        result.failures.len()
    );

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        anyhow::bail!(
            "{}",
            result
                .error_message
                .as_deref()
                .unwrap_or("No voice configuration succeeded")
        );
    }

    Ok(())
}

fn handle_chunks_command(story_path: &Path, max_chunk_bytes: Option<usize>) -> Result<()> {
    let config = NarrationConfig::load()?;
    let ceiling = max_chunk_bytes.unwrap_or(config.max_chunk_bytes);

    let narration = text::read_story(story_path)
        .with_context(|| format!("Failed to read {}", story_path.display()))?;
    let doc = text::build_markup(&narration);
    let chunks = text::split_markup(&doc, ceiling, config.oversize_policy)?;

    println!(
        "{} words, {} marks, {} chunk(s) at {} bytes",
        narration.split_whitespace().count(),
        doc.mark_count,
        chunks.len(),
        ceiling
    );
    for chunk in &chunks {
        println!(
            "  chunk {:>3}: {:>5} bytes, marks w{}..w{}",
            chunk.index,
            chunk.byte_len(),
            chunk.marks.start,
            chunk.marks.end.saturating_sub(1)
        );
    }
    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = NarrationConfig::load()?;
            println!("Configuration file: {:?}", NarrationConfig::config_path()?);
            println!();
            println!("max_chunk_bytes = {}", config.max_chunk_bytes);
            println!("oversize_policy = {:?}", config.oversize_policy);
            println!("renumber_policy = {:?}", config.renumber_policy);
            println!("audio_encoding = {:?}", config.audio_encoding);
            println!("max_concurrent_chunks = {}", config.max_concurrent_chunks);
            println!("max_concurrent_voices = {}", config.max_concurrent_voices);
            println!("request_timeout_secs = {}", config.request_timeout_secs);
            println!("voice_timeout_secs = {}", config.voice_timeout_secs);
            println!("max_retries = {}", config.max_retries);
            println!("keep_scratch = {}", config.keep_scratch);
            if let Some(ffmpeg) = &config.ffmpeg_path {
                println!("ffmpeg_path = \"{}\"", ffmpeg.display());
            } else {
                println!("ffmpeg_path = (PATH)");
            }
            println!("voices:");
            for voice in config.catalog()?.iter() {
                println!("  {} = {}", voice.label(), voice.voice_name);
            }
        }
        ConfigAction::SetMaxChunkBytes { value } => {
            let mut config = NarrationConfig::load()?;
            config.max_chunk_bytes = (*value).max(64);
            config.save()?;
            println!("Chunk ceiling set to: {} bytes", config.max_chunk_bytes);
        }
        ConfigAction::SetVoiceConcurrency { value } => {
            let mut config = NarrationConfig::load()?;
            config.max_concurrent_voices = (*value).clamp(1, 8);
            config.save()?;
            println!("Voice concurrency set to: {}", config.max_concurrent_voices);
        }
        ConfigAction::SetChunkConcurrency { value } => {
            let mut config = NarrationConfig::load()?;
            config.max_concurrent_chunks = (*value).clamp(1, 16);
            config.save()?;
            println!("Chunk concurrency set to: {}", config.max_concurrent_chunks);
        }
        ConfigAction::SetFfmpeg { path } => {
            let mut config = NarrationConfig::load()?;
            config.ffmpeg_path = Some(path.clone());
            config.save()?;
            println!("FFmpeg set to: {}", path.display());
        }
        ConfigAction::SetAllowOversize { value } => {
            let mut config = NarrationConfig::load()?;
            config.oversize_policy = if *value {
                OversizePolicy::Allow
            } else {
                OversizePolicy::Reject
            };
            config.save()?;
            println!("Oversize policy set to: {:?}", config.oversize_policy);
        }
    }
    Ok(())
}
