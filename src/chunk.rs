//! Boundary-aware overlapping text chunker.
//!
//! Splits extracted document text into retrieval-sized chunks that prefer
//! to end on natural boundaries (paragraph breaks, sentence ends,
//! whitespace) while guaranteeing forward progress and a bounded chunk
//! count for any input.
//!
//! # Algorithm
//!
//! 1. Sanitize parameters: `chunk_size == 0` resets to
//!    [`DEFAULT_CHUNK_SIZE`]; `overlap >= chunk_size` resets to
//!    `chunk_size / 3`. Corrections are warned to stderr and returned on
//!    the [`ChunkingResult`] so callers and tests can observe them.
//! 2. If the text fits in one chunk, return it as-is.
//! 3. Otherwise advance a window `[start, end)` of `chunk_size` bytes.
//!    Before emitting, search backward from `end` within
//!    `min(chunk_size / 2, 500)` bytes for, in priority order: a paragraph
//!    break (`\n\n`), a sentence end (`". "`), then any whitespace. A
//!    boundary is accepted only past `start + chunk_size / 3`, rejecting
//!    pathologically small chunks.
//! 4. Emit the window trimmed of surrounding whitespace, skipping empties.
//! 5. Advance to `end - overlap`; if that does not move the window
//!    forward, force a one-byte step. This is the loop-safety invariant —
//!    chunking terminates for every input.
//! 6. Cap the chunk count at `max(100, 2 * len / (chunk_size - overlap))`;
//!    at the cap the untouched remainder is appended as one final chunk.
//!
//! The function is pure: identical inputs always produce the identical
//! chunk sequence, which keeps embeddings reproducible.

/// Default window size in bytes when the caller passes `chunk_size == 0`.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks.
pub const DEFAULT_OVERLAP: usize = 100;

/// Upper bound on the backward boundary search, regardless of chunk size.
const MAX_LOOKBACK: usize = 500;

/// Ordered chunks plus any parameter corrections that were applied.
#[derive(Debug, Clone)]
pub struct ChunkingResult {
    /// Ordered, non-empty chunk strings covering the input. Text that
    /// fits in one window is returned verbatim; split chunks are trimmed.
    pub chunks: Vec<String>,
    /// Human-readable notes for every silently corrected parameter.
    pub corrections: Vec<String>,
    /// The chunk size actually used after correction.
    pub chunk_size: usize,
    /// The overlap actually used after correction.
    pub overlap: usize,
}

/// Split `text` into overlapping chunks of at most `chunk_size` bytes.
///
/// Never fails: invalid parameters are corrected, the progress invariant
/// guarantees termination, and the safety ceiling bounds the result even
/// for adversarial input with no natural boundaries.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> ChunkingResult {
    let mut corrections = Vec::new();

    let chunk_size = if chunk_size == 0 {
        corrections.push(format!(
            "chunk_size 0 is invalid; using default {}",
            DEFAULT_CHUNK_SIZE
        ));
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    let overlap = if overlap >= chunk_size {
        let corrected = chunk_size / 3;
        corrections.push(format!(
            "overlap {} >= chunk_size {}; using {}",
            overlap, chunk_size, corrected
        ));
        corrected
    } else {
        overlap
    };

    for note in &corrections {
        eprintln!("Warning: {}", note);
    }

    let mut result = ChunkingResult {
        chunks: Vec::new(),
        corrections,
        chunk_size,
        overlap,
    };

    if text.is_empty() {
        return result;
    }

    if text.len() <= chunk_size {
        result.chunks.push(text.to_string());
        return result;
    }

    // chunk_size > overlap holds after correction, so the divisor is nonzero.
    let ceiling = (2 * text.len() / (chunk_size - overlap)).max(100);

    let mut start = 0usize;
    while start < text.len() {
        if result.chunks.len() + 1 >= ceiling {
            // Safety ceiling: emit the untouched remainder and stop.
            let remainder = text[start..].trim();
            if !remainder.is_empty() {
                result.chunks.push(remainder.to_string());
            }
            eprintln!(
                "Warning: chunk ceiling {} reached; remainder emitted as one chunk",
                ceiling
            );
            break;
        }

        let mut end = snap_back(text, (start + chunk_size).min(text.len()));
        if end < text.len() {
            if let Some(boundary) = find_boundary(text, start, end, chunk_size) {
                end = boundary;
            }
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            result.chunks.push(piece.to_string());
        }

        if end >= text.len() {
            break;
        }

        let new_start = snap_back(text, end.saturating_sub(overlap));
        start = if new_start <= start {
            // Loop-safety invariant: always move forward.
            snap_forward(text, start + 1)
        } else {
            new_start
        };
    }

    result
}

/// Chunk with the default window and overlap, returning only the chunks.
///
/// Used for whole-document comparison where the parameters are not
/// caller-tunable.
pub fn chunk_with_defaults(text: &str) -> Vec<String> {
    chunk_text(text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP).chunks
}

/// Search backward from `end` for the best boundary to cut at.
///
/// Boundaries are considered in priority order (paragraph break, sentence
/// end, whitespace) and accepted only past `start + chunk_size / 3`.
/// Returns `None` when no acceptable boundary exists within the lookback.
fn find_boundary(text: &str, start: usize, end: usize, chunk_size: usize) -> Option<usize> {
    let lookback = (chunk_size / 2).min(MAX_LOOKBACK);
    let floor = start + chunk_size / 3;
    let search_from = snap_forward(text, end.saturating_sub(lookback).max(start));
    if search_from >= end {
        return None;
    }
    let window = &text[search_from..end];

    if let Some(pos) = window.rfind("\n\n") {
        let cut = search_from + pos + 2;
        if cut > floor {
            return Some(cut);
        }
    }

    if let Some(pos) = window.rfind(". ") {
        let cut = search_from + pos + 1;
        if cut > floor {
            return Some(cut);
        }
    }

    if let Some(pos) = window.rfind(char::is_whitespace) {
        let cut = search_from + pos + window[pos..].chars().next().map_or(1, char::len_utf8);
        if cut > floor && cut <= end {
            return Some(cut);
        }
    }

    None
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_back(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Snap a byte index forward to the nearest valid UTF-8 char boundary.
fn snap_forward(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let result = chunk_text("Hello, world!", 1000, 100);
        assert_eq!(result.chunks, vec!["Hello, world!"]);
        assert!(result.corrections.is_empty());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let result = chunk_text("", 1000, 100);
        assert!(result.chunks.is_empty());
    }

    #[test]
    fn test_zero_chunk_size_corrected() {
        let result = chunk_text("some text", 0, 100);
        assert_eq!(result.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.chunks.len(), 1);
    }

    #[test]
    fn test_overlap_equal_to_chunk_size_corrected() {
        let text = "word ".repeat(100);
        let result = chunk_text(&text, 60, 60);
        assert_eq!(result.overlap, 20);
        assert!(!result.chunks.is_empty());
        assert!(result.corrections[0].contains("overlap"));
    }

    #[test]
    fn test_malformed_params_never_empty_for_nonempty_input() {
        for (size, overlap) in [(0, 0), (0, 5000), (10, 10), (10, 99)] {
            let result = chunk_text("a small but non-empty input text", size, overlap);
            assert!(
                !result.chunks.is_empty(),
                "size={} overlap={} produced no chunks",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let first = "First paragraph about apples and orchards in autumn.";
        let text = format!("{}\n\nSecond paragraph about something else entirely.", first);
        let result = chunk_text(&text, 70, 10);
        // The cut lands on the paragraph break rather than mid-sentence.
        assert_eq!(result.chunks[0], first);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "alpha beta gamma delta ".repeat(50);
        let result = chunk_text(&text, 100, 30);
        assert!(result.chunks.len() > 1);
        for pair in result.chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<String>();
            let tail: String = tail.chars().rev().collect();
            assert!(
                pair[1].contains(tail.trim()),
                "chunks share no overlap region: {:?} / {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_terminates_on_boundary_free_input() {
        // Adversarial: no whitespace, no sentence ends, no paragraphs.
        let text = "x".repeat(50_000);
        let result = chunk_text(&text, 200, 50);
        let ceiling = (2 * text.len() / (200 - 50)).max(100);
        assert!(result.chunks.len() <= ceiling);
        assert!(!result.chunks.is_empty());
    }

    #[test]
    fn test_ceiling_bounds_chunk_count() {
        let text = "ab ".repeat(20_000);
        for (size, overlap) in [(30, 29), (100, 99), (50, 0)] {
            let result = chunk_text(&text, size, overlap);
            let ceiling = (2 * text.len() / (result.chunk_size - result.overlap)).max(100);
            assert!(
                result.chunks.len() <= ceiling,
                "size={} overlap={}: {} chunks exceeds ceiling {}",
                size,
                overlap,
                result.chunks.len(),
                ceiling
            );
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox. Jumps over the lazy dog. ".repeat(100);
        let a = chunk_text(&text, 150, 40);
        let b = chunk_text(&text, 150, 40);
        assert_eq!(a.chunks, b.chunks);
    }

    #[test]
    fn test_chunks_are_trimmed_and_non_empty() {
        let text = "one two three.  \n\n   four five six.  \n\n  seven eight nine. ".repeat(30);
        let result = chunk_text(&text, 80, 20);
        for chunk in &result.chunks {
            assert!(!chunk.is_empty());
            assert_eq!(chunk, chunk.trim());
        }
    }

    #[test]
    fn test_multibyte_utf8_input() {
        let text = "héllo wörld ünïcode çhärs ".repeat(100);
        let result = chunk_text(&text, 64, 16);
        assert!(!result.chunks.is_empty());
        // Reassembly sanity: every chunk is valid UTF-8 drawn from the input.
        for chunk in &result.chunks {
            assert!(text.contains(chunk.as_str()));
        }
    }

    #[test]
    fn test_rejects_pathologically_small_chunks() {
        // A boundary inside the first third of the window is ignored.
        let text = format!("ab cd {}", "z".repeat(400));
        let result = chunk_text(&text, 120, 20);
        assert!(
            result.chunks[0].len() > 120 / 3,
            "first chunk too small: {:?}",
            result.chunks[0]
        );
    }
}
