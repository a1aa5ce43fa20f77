//! Text helpers shared by prompt builders and the pipeline.

/// The first `max_chars` characters of `text`, never splitting a code point.
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
