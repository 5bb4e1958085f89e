//! Audio assembly: joins per-chunk audio into one narration file.

pub mod assembler;

pub use assembler::{
    AudioConcatenator, ByteConcatenator, FfmpegConcatenator, is_ffmpeg_available, write_chunk_files,
};
