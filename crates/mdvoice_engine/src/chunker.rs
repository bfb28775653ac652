//! Chunker (component C5): sentence-aware splitting of a text span into
//! overlapping, detector-sized windows, with skip heuristics for windows
//! that should not be sent to the detector.

const SENTENCE_BOUNDARIES: [char; 4] = ['.', '!', '?', ';'];

/// Why a window was excluded from the returned sequence rather than
/// skipped at the caller's discretion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyOrWhitespace,
    MostlyUppercase,
    ContainsUrlLikeSlashes,
    MostlyNonAlphabetic,
}

/// One candidate window of a text span, with its byte range into the
/// span's own text (not the whole document).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Splits `span_text` into windows of at most `max_chars` characters,
/// consecutive windows overlapping by `overlap` characters, skipping
/// windows that fail the skip heuristics. Windows are never split at a
/// point that would fall inside a mask token — the caller passes
/// `mask_token_ranges` (byte ranges, sorted, non-overlapping) so a window
/// boundary can be pushed outward to keep every token strictly inside a
/// single window.
pub fn chunk_span(span_text: &str, max_chars: usize, overlap: usize, mask_token_ranges: &[(usize, usize)]) -> Vec<Chunk> {
    if span_text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let chars: Vec<(usize, char)> = span_text.char_indices().collect();
    let len_chars = chars.len();
    let mut chunks = Vec::new();
    let mut start_char = 0usize;

    while start_char < len_chars {
        let ideal_end_char = (start_char + max_chars).min(len_chars);
        let end_char = if ideal_end_char >= len_chars {
            len_chars
        } else {
            find_window_end(&chars, start_char, ideal_end_char, max_chars)
        };

        let start_byte = chars[start_char].0;
        let end_byte = if end_char >= len_chars {
            span_text.len()
        } else {
            chars[end_char].0
        };

        let (start_byte, end_byte) = adjust_for_mask_tokens(start_byte, end_byte, span_text.len(), mask_token_ranges);

        let text = span_text[start_byte..end_byte].to_string();
        chunks.push(Chunk { start: start_byte, end: end_byte, text });

        if end_char >= len_chars {
            break;
        }
        let next_start_char = end_char.saturating_sub(overlap);
        start_char = if next_start_char > start_char { next_start_char } else { end_char };
    }

    chunks
}

/// Searches for a sentence boundary in the tail window
/// `[max_chars-100, max_chars]` (clamped to the span); falls back to the
/// last whitespace within the window, then to a hard cut at `max_chars`.
fn find_window_end(chars: &[(usize, char)], start_char: usize, ideal_end_char: usize, max_chars: usize) -> usize {
    let window_len = ideal_end_char - start_char;
    let tail_start_offset = window_len.saturating_sub(100);
    let tail_start_char = start_char + tail_start_offset;

    for i in (tail_start_char..ideal_end_char).rev() {
        if SENTENCE_BOUNDARIES.contains(&chars[i].1) {
            return i + 1;
        }
    }

    for i in (start_char..ideal_end_char).rev() {
        if chars[i].1.is_whitespace() {
            return i + 1;
        }
    }

    let _ = max_chars;
    ideal_end_char
}

/// If a mask token range straddles the proposed boundary, extends the
/// window so the token lies strictly inside it rather than on the edge.
fn adjust_for_mask_tokens(mut start: usize, mut end: usize, doc_len: usize, mask_token_ranges: &[(usize, usize)]) -> (usize, usize) {
    for &(tok_start, tok_end) in mask_token_ranges {
        if tok_start < start && tok_end > start {
            start = tok_start;
        }
        if tok_start < end && tok_end > end {
            end = tok_end.min(doc_len);
        }
    }
    (start, end)
}

/// Determines whether a chunk should be withheld from the detector.
pub fn skip_reason(text: &str) -> Option<SkipReason> {
    if text.trim().is_empty() {
        return Some(SkipReason::EmptyOrWhitespace);
    }

    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if !letters.is_empty() {
        let upper = letters.iter().filter(|c| c.is_uppercase()).count();
        if upper as f64 / letters.len() as f64 > 0.8 {
            return Some(SkipReason::MostlyUppercase);
        }
    }

    if text.contains("://") || text.contains("//") {
        return Some(SkipReason::ContainsUrlLikeSlashes);
    }

    let non_space: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if !non_space.is_empty() {
        let non_alpha = non_space.iter().filter(|c| !c.is_alphabetic()).count();
        if non_alpha as f64 / non_space.len() as f64 > 0.5 {
            return Some(SkipReason::MostlyNonAlphabetic);
        }
    }

    None
}
