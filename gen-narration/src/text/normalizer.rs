//! Story text normalization: drops image references and their captions and
//! flattens what remains into a single narration line.

use crate::error::{NarrationError, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;

/// Prefix of an illustration reference line.
pub const IMAGE_PREFIX: &str = "[IMAGE:";

/// An image reference inside a narrated line, plus the caption sentence that
/// follows it on the same line.
static INLINE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[IMAGE:[^\]]*\](\s*[^.!?\[]*[.!?]*)").unwrap());

/// Invisible characters that would otherwise end up inside narrated tokens.
const INVISIBLE_CHARS: &[char] = &['\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}'];

/// Read a story file and normalize it for narration.
pub fn read_story(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)?;
    normalize_story(&raw)
}

/// Normalize raw story text into one whitespace-collapsed narration line.
///
/// A line starting with `[IMAGE:` is dropped together with the next non-blank
/// line (its caption). A reference embedded in a narrated line is removed along
/// with the caption sentence that follows it; when nothing follows it on that
/// line, the next non-blank line is treated as the caption.
pub fn normalize_story(raw: &str) -> Result<String> {
    let mut kept: Vec<String> = Vec::new();
    let mut skip_next_line = false;

    for line in raw.lines() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.starts_with(IMAGE_PREFIX) {
            skip_next_line = true;
            continue;
        }

        if skip_next_line {
            skip_next_line = false;
            continue;
        }

        let (text, caption_pending) = strip_inline_images(line);
        skip_next_line = caption_pending;
        kept.push(text);
    }

    let joined = strip_invisible(&kept.join(" "));
    let narration = joined.split_whitespace().collect::<Vec<_>>().join(" ");

    if narration.is_empty() {
        return Err(NarrationError::EmptyNarration);
    }

    Ok(narration)
}

/// Remove inline image references and their captions from one line.
///
/// Returns the remaining text and whether the last reference had no caption on
/// this line.
fn strip_inline_images(line: &str) -> (String, bool) {
    let mut caption_pending = false;
    let stripped = INLINE_IMAGE.replace_all(line, |caps: &Captures| {
        caption_pending = caps[1].trim().is_empty();
        " "
    });
    (stripped.into_owned(), caption_pending)
}

/// Drop control and zero-width characters, keeping ordinary whitespace.
fn strip_invisible(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_whitespace() || !(c.is_control() || INVISIBLE_CHARS.contains(c)))
        .collect()
}
