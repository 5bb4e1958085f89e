//! Splits a marked-up story into `<speak>` documents that fit the provider's
//! request size limit.

use super::markup::{MarkupDocument, SPEAK_CLOSE, SPEAK_OPEN, mark_ids, renumber_marks};
use crate::error::{NarrationError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Default request ceiling in bytes, measured on the wrapped document.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 4500;

/// A marked word (mark plus token) or a bare token.
static PIECE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<mark name='w\d+'/>[^<\s]+|[^<\s]+").unwrap());

/// What to do with a single piece that cannot fit under the ceiling even alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Fail with `ChunkOverflow`.
    #[default]
    Reject,
    /// Emit the piece as a chunk of its own, over the ceiling.
    Allow,
}

/// One synthesis request's worth of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsmlChunk {
    /// Position of this chunk in the story.
    pub index: usize,
    /// Pieces with their story-wide mark ids, each followed by one space.
    pub content: String,
    /// Story-wide ids of the marks inside this chunk.
    pub marks: Range<usize>,
}

impl SsmlChunk {
    /// The chunk as a standalone `<speak>` document with story-wide mark ids.
    pub fn wrapped(&self) -> String {
        format!("{}{}{}", SPEAK_OPEN, self.content, SPEAK_CLOSE)
    }

    /// The document sent to the provider: marks renumbered from `w0` within
    /// the chunk. Never longer than [`SsmlChunk::wrapped`].
    pub fn request_ssml(&self) -> String {
        let first = self.marks.start;
        renumber_marks(&self.wrapped(), |id| id - first)
    }

    /// Size of the wrapped document in bytes.
    pub fn byte_len(&self) -> usize {
        SPEAK_OPEN.len() + self.content.len() + SPEAK_CLOSE.len()
    }

    /// Number of marks this chunk carries.
    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }
}

/// Re-extract the ordered pieces of a marked-up document.
pub fn extract_pieces(content: &str) -> Vec<&str> {
    PIECE.find_iter(content).map(|m| m.as_str()).collect()
}

/// Split `doc` into chunks whose wrapped size is at most `ceiling` bytes.
///
/// Pieces are packed greedily in document order. A mark is never separated
/// from its word. An empty document yields one empty chunk.
pub fn split_markup(
    doc: &MarkupDocument,
    ceiling: usize,
    policy: OversizePolicy,
) -> Result<Vec<SsmlChunk>> {
    let wrapper_len = SPEAK_OPEN.len() + SPEAK_CLOSE.len();

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chunk_first_mark = 0;
    let mut next_mark = 0;

    for raw in extract_pieces(doc.content()) {
        let piece_len = raw.len() + 1;

        if !current.is_empty() && wrapper_len + current.len() + piece_len > ceiling {
            chunks.push(SsmlChunk {
                index: chunks.len(),
                content: std::mem::take(&mut current),
                marks: chunk_first_mark..next_mark,
            });
            chunk_first_mark = next_mark;
        }

        if current.is_empty() && wrapper_len + piece_len > ceiling {
            match policy {
                OversizePolicy::Reject => {
                    return Err(NarrationError::ChunkOverflow {
                        piece_bytes: wrapper_len + piece_len,
                        ceiling,
                    });
                }
                OversizePolicy::Allow => {
                    log::warn!(
                        "Piece of {} bytes exceeds the {} byte ceiling; sending it alone",
                        wrapper_len + piece_len,
                        ceiling
                    );
                }
            }
        }

        if let Some(&id) = mark_ids(raw).first() {
            if current.is_empty() {
                chunk_first_mark = id;
            }
            next_mark = id + 1;
        }

        current.push_str(raw);
        current.push(' ');
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(SsmlChunk {
            index: chunks.len(),
            content: current,
            marks: chunk_first_mark..next_mark,
        });
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::markup::build_markup;
    use proptest::prelude::*;

    fn doc() -> MarkupDocument {
        build_markup("Hola mundo. Adiós.")
    }

    #[test]
    fn test_single_chunk_when_ceiling_is_large() {
        let doc = doc();
        let chunks = split_markup(&doc, DEFAULT_MAX_CHUNK_BYTES, OversizePolicy::Reject).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].wrapped(), doc.ssml);
        assert_eq!(chunks[0].marks, 0..3);
        assert_eq!(chunks[0].request_ssml(), doc.ssml);
    }

    #[test]
    fn test_two_chunks() {
        let doc = doc();
        let first = "<speak><mark name='w0'/>Hola <mark name='w1'/>mundo. </speak>";
        let chunks = split_markup(&doc, first.len(), OversizePolicy::Reject).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].wrapped(), first);
        assert_eq!(chunks[0].marks, 0..2);
        assert_eq!(chunks[1].content, "<mark name='w2'/>Adiós. ");
        assert_eq!(chunks[1].marks, 2..3);
        assert_eq!(chunks[1].index, 1);
        assert_eq!(
            chunks[1].request_ssml(),
            "<speak><mark name='w0'/>Adiós. </speak>"
        );
    }

    #[test]
    fn test_ceiling_counts_closing_tag() {
        let doc = doc();
        let first = "<speak><mark name='w0'/>Hola <mark name='w1'/>mundo. </speak>";
        let chunks = split_markup(&doc, first.len() - 1, OversizePolicy::Reject).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.byte_len() < first.len()));
    }

    #[test]
    fn test_multibyte_characters_measured_in_bytes() {
        let doc = build_markup("ñañaña ñañaña");
        let one = "<speak><mark name='w0'/>ñañaña </speak>";
        let chunks = split_markup(&doc, one.len(), OversizePolicy::Reject).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.byte_len() <= one.len()));
    }

    #[test]
    fn test_unmarked_pieces_stay_in_order() {
        let doc = build_markup("uno — dos");
        let chunks = split_markup(&doc, 40, OversizePolicy::Reject).unwrap();
        let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(joined, doc.content());
        let ranges: Vec<_> = chunks.iter().map(|c| c.marks.clone()).collect();
        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        assert_eq!(ranges.last().map(|r| r.end), Some(2));
    }

    #[test]
    fn test_oversize_piece_rejected() {
        let doc = build_markup("a supercalifragilisticoespialidoso b");
        let err = split_markup(&doc, 40, OversizePolicy::Reject).unwrap_err();
        match err {
            NarrationError::ChunkOverflow { piece_bytes, ceiling } => {
                assert_eq!(ceiling, 40);
                assert!(piece_bytes > 40);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_oversize_piece_allowed_alone() {
        let doc = build_markup("a supercalifragilisticoespialidoso b");
        let chunks = split_markup(&doc, 40, OversizePolicy::Allow).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].content.contains("supercalifragilisticoespialidoso"));
        assert!(chunks[1].byte_len() > 40);
        assert!(chunks[0].byte_len() <= 40 && chunks[2].byte_len() <= 40);
        assert_eq!(chunks[1].marks, 1..2);
    }

    #[test]
    fn test_empty_document_gives_one_empty_chunk() {
        let doc = build_markup("");
        let chunks = split_markup(&doc, DEFAULT_MAX_CHUNK_BYTES, OversizePolicy::Reject).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].wrapped(), "<speak></speak>");
        assert!(chunks[0].marks.is_empty());
    }

    #[test]
    fn test_request_ssml_never_longer_than_wrapped() {
        let words: Vec<String> = (0..400).map(|i| format!("palabra{}", i)).collect();
        let doc = build_markup(&words.join(" "));
        let chunks = split_markup(&doc, 500, OversizePolicy::Reject).unwrap();
        for chunk in &chunks {
            assert!(chunk.request_ssml().len() <= chunk.byte_len());
            assert!(chunk.request_ssml().contains("<mark name='w0'/>"));
        }
    }

    fn words() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-zA-Záéñ0-9.,!?&-]{1,10}", 1..120)
    }

    proptest! {
        #[test]
        fn prop_chunks_fit_and_reconstruct(words in words(), ceiling in 128usize..600) {
            let doc = build_markup(&words.join(" "));
            let chunks = split_markup(&doc, ceiling, OversizePolicy::Reject).unwrap();

            for chunk in &chunks {
                prop_assert!(chunk.byte_len() <= ceiling);
                prop_assert!(!chunk.content.is_empty());
            }

            let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
            prop_assert_eq!(joined.as_str(), doc.content());

            let mut expected_start = 0;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.marks.start, expected_start);
                prop_assert_eq!(
                    crate::text::markup::mark_ids(&chunk.content),
                    chunk.marks.clone().collect::<Vec<_>>()
                );
                expected_start = chunk.marks.end;
            }
            prop_assert_eq!(expected_start, doc.mark_count);
        }

        #[test]
        fn prop_chunk_count_grows_as_ceiling_shrinks(words in words(), ceiling in 128usize..600) {
            let doc = build_markup(&words.join(" "));
            let larger = split_markup(&doc, ceiling + 25, OversizePolicy::Reject).unwrap();
            let smaller = split_markup(&doc, ceiling, OversizePolicy::Reject).unwrap();
            prop_assert!(smaller.len() >= larger.len());
        }
    }
}
