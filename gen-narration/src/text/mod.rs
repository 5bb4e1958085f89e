//! Text processing for narration: normalization, SSML marking, and chunking.

pub mod chunker;
pub mod markup;
pub mod normalizer;

pub use chunker::{DEFAULT_MAX_CHUNK_BYTES, OversizePolicy, SsmlChunk, split_markup};
pub use markup::{MarkupDocument, build_markup};
pub use normalizer::{normalize_story, read_story};
