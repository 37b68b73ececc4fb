//! Character-aware text helpers.
//!
//! All lengths are measured in Unicode scalar values, never bytes, so cuts never split a
//! multi-byte character.

/// Returns the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Counts whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Counts alphabetic characters.
pub fn count_alphabetic(text: &str) -> usize {
    text.chars().filter(|ch| ch.is_alphabetic()).count()
}

/// Keeps at most `max_words` words. Longer input is re-joined with single spaces and an
/// ellipsis is appended; shorter input is returned unchanged.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words = text.split_whitespace().collect::<Vec<_>>();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{}...", words[..max_words].join(" "))
}
