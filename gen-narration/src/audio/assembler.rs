//! Audio file assembly using FFmpeg stream copy.

use crate::error::{NarrationError, Result};
use crate::synthesis::ChunkAudio;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tts_client::AudioEncoding;

/// Name of the concat demuxer manifest written next to the chunk files.
pub const MANIFEST_NAME: &str = "concat_list.txt";

/// Joins audio files, in the given order, into one output file.
pub trait AudioConcatenator: Send + Sync {
    fn concatenate(&self, inputs: &[&Path], output: &Path) -> Result<()>;

    /// Name for logs.
    fn name(&self) -> &'static str;
}

/// Lossless concatenation with FFmpeg's concat demuxer (`-c copy`).
#[derive(Debug, Clone)]
pub struct FfmpegConcatenator {
    ffmpeg: PathBuf,
}

impl Default for FfmpegConcatenator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FfmpegConcatenator {
    /// Use `ffmpeg` from PATH unless a path is given.
    pub fn new(ffmpeg: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.unwrap_or_else(|| PathBuf::from("ffmpeg")),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.ffmpeg)
    }

    /// Check if this FFmpeg can be run.
    pub fn is_available(&self) -> bool {
        self.command()
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl AudioConcatenator for FfmpegConcatenator {
    fn concatenate(&self, inputs: &[&Path], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(NarrationError::Concatenation(
                "No audio files provided".to_string(),
            ));
        }

        if inputs.len() == 1 {
            std::fs::copy(inputs[0], output).map_err(|e| NarrationError::persist(output, e))?;
            return Ok(());
        }

        let manifest_dir = inputs[0].parent().unwrap_or_else(|| Path::new("."));
        let list_file = write_manifest(manifest_dir, inputs)?;

        let result = self
            .command()
            .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_file)
            .args(["-c", "copy"])
            .arg(output)
            .output()
            .map_err(|e| {
                NarrationError::Concatenation(format!(
                    "Failed to run {}: {}",
                    self.ffmpeg.display(),
                    e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(NarrationError::Concatenation(format!(
                "ffmpeg concat exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Raw byte concatenation. Valid for self-framing streams such as MP3, and
/// used as a test double where no encoder is installed.
#[derive(Debug, Clone, Default)]
pub struct ByteConcatenator;

impl AudioConcatenator for ByteConcatenator {
    fn concatenate(&self, inputs: &[&Path], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(NarrationError::Concatenation(
                "No audio files provided".to_string(),
            ));
        }

        let file = File::create(output).map_err(|e| NarrationError::persist(output, e))?;
        let mut writer = BufWriter::new(file);
        for input in inputs {
            let bytes = std::fs::read(input)?;
            writer
                .write_all(&bytes)
                .map_err(|e| NarrationError::persist(output, e))?;
        }
        writer
            .flush()
            .map_err(|e| NarrationError::persist(output, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bytes"
    }
}

/// Write the concat demuxer list for `inputs` into `dir`, with absolute paths.
fn write_manifest(dir: &Path, inputs: &[&Path]) -> Result<PathBuf> {
    let list_file = dir.join(MANIFEST_NAME);

    // The concat demuxer resolves relative entries against the list's directory
    let mut list_content = String::new();
    for path in inputs {
        let path = std::path::absolute(path).map_err(|e| NarrationError::persist(*path, e))?;
        // Escape single quotes in path
        let path_str = path.to_string_lossy().replace('\'', "'\\''");
        list_content.push_str(&format!("file '{}'\n", path_str));
    }
    std::fs::write(&list_file, &list_content).map_err(|e| NarrationError::persist(&list_file, e))?;

    Ok(list_file)
}

/// Write each chunk's audio to `dir` as `chunk_NNNN.<ext>`, in chunk order.
pub fn write_chunk_files(
    dir: &Path,
    chunks: &[ChunkAudio],
    encoding: AudioEncoding,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| NarrationError::persist(dir, e))?;

    let mut ordered: Vec<&ChunkAudio> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);

    ordered
        .into_iter()
        .map(|chunk| {
            let path = dir.join(format!("chunk_{:04}.{}", chunk.index, encoding.extension()));
            std::fs::write(&path, &chunk.audio).map_err(|e| NarrationError::persist(&path, e))?;
            Ok(path)
        })
        .collect()
}

/// Check if FFmpeg is available on PATH.
pub fn is_ffmpeg_available() -> bool {
    FfmpegConcatenator::default().is_available()
}

/// A stand-in `ffmpeg` that joins concat list entries byte for byte,
/// resolving relative entries against the list's directory.
#[cfg(all(test, unix))]
pub(crate) fn write_fake_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in -i) list="$2"; shift ;; esac
  out="$1"
  shift
done
base=$(dirname "$list")
: > "$out"
sed -n "s/^file '\(.*\)'$/\1/p" "$list" | while IFS= read -r entry; do
  case "$entry" in /*) src="$entry" ;; *) src="$base/$entry" ;; esac
  cat "$src" >> "$out" || exit 1
done
"#;
    let path = dir.join("ffmpeg");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
