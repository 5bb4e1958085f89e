//! Merges chunk-local timepoints into one story-wide timeline.
//!
//! Timestamps stay relative to the start of their own chunk's audio; they are
//! not shifted by the durations of earlier chunks.

use super::driver::ChunkAudio;
use crate::error::{NarrationError, Result};
use crate::text::markup::{mark_name, parse_mark_name};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tts_client::Timepoint;

/// How chunk-local mark names are mapped back to story-wide ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenumberPolicy {
    /// Offset by the first story-wide mark id the chunk carried.
    #[default]
    MarkRange,
    /// Offset by the number of timepoints returned for earlier chunks. Any
    /// mark the provider leaves out shifts every later label.
    ReturnedCount,
}

/// Fold chunk results, in chunk order, into one timeline sorted by mark id.
pub fn merge_timepoints(chunks: &[ChunkAudio], policy: RenumberPolicy) -> Result<Vec<Timepoint>> {
    let (mut merged, _) = chunks.iter().try_fold(
        (Vec::new(), 0usize),
        |(mut merged, returned_before), chunk| {
            for tp in &chunk.timepoints {
                let local = parse_mark_name(&tp.mark_name).ok_or_else(|| {
                    NarrationError::Synthesis {
                        chunk_index: chunk.index,
                        message: format!("unexpected mark name '{}'", tp.mark_name),
                    }
                })?;

                let global = match policy {
                    RenumberPolicy::MarkRange => {
                        if local >= chunk.marks.len() {
                            return Err(NarrationError::Synthesis {
                                chunk_index: chunk.index,
                                message: format!(
                                    "mark '{}' is outside the {} marks sent",
                                    tp.mark_name,
                                    chunk.marks.len()
                                ),
                            });
                        }
                        chunk.marks.start + local
                    }
                    RenumberPolicy::ReturnedCount => returned_before + local,
                };

                merged.push((global, Timepoint::new(mark_name(global), tp.time_seconds)));
            }
            Ok((merged, returned_before + chunk.timepoints.len()))
        },
    )?;

    merged.sort_by_key(|(id, _)| *id);
    Ok(merged.into_iter().map(|(_, tp)| tp).collect())
}

/// Story-wide mark ids in `0..total_marks` with no timepoint.
pub fn timeline_gaps(timeline: &[Timepoint], total_marks: usize) -> Vec<usize> {
    let seen: HashSet<usize> = timeline
        .iter()
        .filter_map(|tp| parse_mark_name(&tp.mark_name))
        .collect();
    (0..total_marks).filter(|id| !seen.contains(id)).collect()
}
