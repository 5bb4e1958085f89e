//! Error taxonomy for narration generation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrationError {
    #[error("No narratable text left after removing image references")]
    EmptyNarration,

    #[error("A single piece needs {piece_bytes} bytes but the chunk ceiling is {ceiling} bytes")]
    ChunkOverflow { piece_bytes: usize, ceiling: usize },

    #[error("Synthesis failed for chunk {chunk_index}: {message}")]
    Synthesis { chunk_index: usize, message: String },

    #[error("Timed out after {}s while {operation}", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("Audio concatenation failed: {0}")]
    Concatenation(String),

    #[error("Failed to write {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NarrationError {
    pub(crate) fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, NarrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failure() {
        let err = NarrationError::ChunkOverflow {
            piece_bytes: 120,
            ceiling: 64,
        };
        assert!(err.to_string().contains("120"));
        assert!(err.to_string().contains("64"));

        let err = NarrationError::Synthesis {
            chunk_index: 3,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Synthesis failed for chunk 3: boom");

        let err = NarrationError::Timeout {
            operation: "synthesizing chunk 0".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Timed out after 30s while synthesizing chunk 0");
    }

    #[test]
    fn test_persist_includes_path() {
        let err = NarrationError::persist(
            "/tmp/out/audio.mp3",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/out/audio.mp3"));
    }
}
