//! Splitting oversized context into compressible chunks.

use crate::util::safe_truncate_index;

/// Share of a chunk, from its end, searched for a natural break.
const BREAK_SEARCH_FRACTION: f64 = 0.2;

/// Split `text` into chunks of at most `max_chunk` bytes.
///
/// A chunk prefers to end just after the last paragraph break (`\n\n`) in
/// its final 20%, then a line break, then a space, else at the hard limit
/// (snapped back to a char boundary).
///
/// # Properties
/// - `chunks.concat() == text`
/// - every chunk is non-empty and at most `max_chunk` bytes, unless
///   `max_chunk` is smaller than a single character
pub fn split_into_chunks(text: &str, max_chunk: usize) -> Vec<&str> {
    if text.len() <= max_chunk {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chunk {
            chunks.push(remaining);
            break;
        }

        let mut limit = safe_truncate_index(remaining, max_chunk);
        if limit == 0 {
            // max_chunk is narrower than the next character
            limit = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
        }

        let window = &remaining[..limit];
        let search_start = safe_truncate_index(
            window,
            (max_chunk as f64 * (1.0 - BREAK_SEARCH_FRACTION)) as usize,
        );
        let tail = &window[search_start..];

        let break_point = if let Some(idx) = tail.rfind("\n\n") {
            search_start + idx + 2
        } else if let Some(idx) = tail.rfind('\n') {
            search_start + idx + 1
        } else if let Some(idx) = tail.rfind(' ') {
            search_start + idx + 1
        } else {
            limit
        };

        chunks.push(&remaining[..break_point]);
        remaining = &remaining[break_point..];
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_chunk_properties(text: &str, max: usize) {
        let chunks = split_into_chunks(text, max);
        assert_eq!(chunks.concat(), text);
        for chunk in &chunks {
            assert!(chunk.len() <= max, "chunk of {} > {}", chunk.len(), max);
            assert!(!chunk.is_empty() || text.is_empty());
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_into_chunks("hello", 10), vec!["hello"]);
        assert_eq!(split_into_chunks("", 10), vec![""]);
    }

    #[test]
    fn prefers_paragraph_break_in_tail() {
        let text = format!("{}\n\n{}", "a".repeat(85), "b".repeat(50));
        let chunks = split_into_chunks(&text, 100);
        assert_eq!(chunks[0], format!("{}\n\n", "a".repeat(85)));
        assert_eq!(chunks[1], "b".repeat(50));
    }

    #[test]
    fn ignores_break_outside_tail() {
        // the paragraph break sits in the first 80%, so a space later wins
        let text = format!("{}\n\n{} {}", "a".repeat(10), "b".repeat(80), "c".repeat(40));
        let chunks = split_into_chunks(&text, 100);
        assert!(chunks[0].ends_with(' '));
        assert_eq!(chunks[0].len(), 93);
    }

    #[test]
    fn hard_split_without_whitespace() {
        let text = "x".repeat(250);
        let chunks = split_into_chunks(&text, 100);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![100, 100, 50]);
    }

    #[test]
    fn reconstructs_mixed_text() {
        let text = "Round 1 results\n- item one: 120 EUR\n  URL: http://x.com/a\n\n"
            .repeat(40)
            + &"word ".repeat(300)
            + "é".repeat(200).as_str();
        for max in [7, 50, 64, 100, 333, 2000] {
            assert_chunk_properties(&text, max);
        }
    }
}
