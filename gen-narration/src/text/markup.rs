//! SSML markup with one numbered `<mark/>` in front of every spoken word.

use once_cell::sync::Lazy;
use regex::Regex;

pub const SPEAK_OPEN: &str = "<speak>";
pub const SPEAK_CLOSE: &str = "</speak>";
/// Mark names are this prefix followed by the mark id.
pub const MARK_PREFIX: &str = "w";

static MARK_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"<mark name='w(\d+)'/>").unwrap());

/// A complete `<speak>` document for one story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupDocument {
    pub ssml: String,
    /// Number of marks; ids run from 0 to `mark_count - 1`.
    pub mark_count: usize,
}

impl MarkupDocument {
    /// The document without its `<speak>` wrapper.
    pub fn content(&self) -> &str {
        self.ssml
            .strip_prefix(SPEAK_OPEN)
            .and_then(|s| s.strip_suffix(SPEAK_CLOSE))
            .unwrap_or(&self.ssml)
    }
}

/// Build the marked-up document for a normalized narration string.
///
/// Every whitespace-separated token is escaped and followed by one space.
/// Tokens containing a letter or digit get a mark with the next id.
pub fn build_markup(narration: &str) -> MarkupDocument {
    let mut ssml = String::with_capacity(narration.len() * 2 + SPEAK_OPEN.len());
    ssml.push_str(SPEAK_OPEN);

    let mut mark_count = 0;
    for token in narration.split_whitespace() {
        if is_narratable(token) {
            ssml.push_str(&mark_tag(mark_count));
            mark_count += 1;
        }
        ssml.push_str(&escape(token));
        ssml.push(' ');
    }

    ssml.push_str(SPEAK_CLOSE);
    MarkupDocument { ssml, mark_count }
}

/// The `<mark/>` element for `id`.
pub fn mark_tag(id: usize) -> String {
    format!("<mark name='{}'/>", mark_name(id))
}

/// The mark name for `id`, e.g. `w12`.
pub fn mark_name(id: usize) -> String {
    format!("{}{}", MARK_PREFIX, id)
}

/// Parse a mark name back into its id.
pub fn parse_mark_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(MARK_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Mark ids found in `ssml`, in order.
pub fn mark_ids(ssml: &str) -> Vec<usize> {
    MARK_ID
        .captures_iter(ssml)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Rewrite every mark id in `ssml` through `f`.
pub fn renumber_marks(ssml: &str, f: impl Fn(usize) -> usize) -> String {
    MARK_ID
        .replace_all(ssml, |caps: &regex::Captures| match caps[1].parse::<usize>() {
            Ok(id) => mark_tag(f(id)),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

fn is_narratable(token: &str) -> bool {
    token.chars().any(char::is_alphanumeric)
}

/// Escape text for embedding in SSML.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_build_markup() {
        let doc = build_markup("Hola mundo. Adiós.");
        assert_eq!(
            doc.ssml,
            "<speak><mark name='w0'/>Hola <mark name='w1'/>mundo. <mark name='w2'/>Adiós. </speak>"
        );
        assert_eq!(doc.mark_count, 3);
    }

    #[test]
    fn test_punctuation_tokens_are_unmarked() {
        let doc = build_markup("Sí — claro ... ¿vale?");
        assert_eq!(
            doc.ssml,
            "<speak><mark name='w0'/>Sí — <mark name='w1'/>claro ... <mark name='w2'/>¿vale? </speak>"
        );
        assert_eq!(mark_ids(&doc.ssml), vec![0, 1, 2]);
    }

    #[test]
    fn test_tokens_are_escaped() {
        let doc = build_markup("Tom & \"Jerry\" <3 l'eau");
        assert_eq!(
            doc.content(),
            "<mark name='w0'/>Tom &amp; <mark name='w1'/>&quot;Jerry&quot; <mark name='w2'/>&lt;3 <mark name='w3'/>l&#x27;eau "
        );
    }

    #[test]
    fn test_empty_narration() {
        let doc = build_markup("");
        assert_eq!(doc.ssml, "<speak></speak>");
        assert_eq!(doc.mark_count, 0);
        assert_eq!(doc.content(), "");
    }

    #[test]
    fn test_parse_mark_name() {
        assert_eq!(parse_mark_name("w0"), Some(0));
        assert_eq!(parse_mark_name("w123"), Some(123));
        assert_eq!(parse_mark_name("w"), None);
        assert_eq!(parse_mark_name("x1"), None);
        assert_eq!(parse_mark_name("w-1"), None);
        assert_eq!(parse_mark_name("w1a"), None);
    }

    #[test]
    fn test_renumber_marks() {
        let ssml = "<speak><mark name='w7'/>uno <mark name='w8'/>dos </speak>";
        assert_eq!(
            renumber_marks(ssml, |id| id - 7),
            "<speak><mark name='w0'/>uno <mark name='w1'/>dos </speak>"
        );
    }

    proptest! {
        #[test]
        fn prop_mark_ids_are_dense_and_increasing(
            words in proptest::collection::vec("[a-zA-Z0-9áé&<>'\"!?.,-]{1,12}", 0..60)
        ) {
            let narration = words.join(" ");
            let doc = build_markup(&narration);
            let ids = mark_ids(&doc.ssml);
            prop_assert_eq!(ids.len(), doc.mark_count);
            prop_assert_eq!(ids, (0..doc.mark_count).collect::<Vec<_>>());
            let expected = words.iter().filter(|w| w.chars().any(char::is_alphanumeric)).count();
            prop_assert_eq!(doc.mark_count, expected);
        }
    }
}
