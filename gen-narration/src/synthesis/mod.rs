//! Speech synthesis of SSML chunks and merging of their timing marks.

pub mod driver;
pub mod timeline;

pub use driver::{ChunkAudio, SynthesisDriver, SynthesisOptions};
pub use timeline::{RenumberPolicy, merge_timepoints, timeline_gaps};
