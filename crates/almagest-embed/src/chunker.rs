//! Byte-budget text chunking on paragraph boundaries.

use std::mem::take;

/// Default chunk budget in bytes, sized to the embedding API's input limit.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 30_000;

/// Split text into chunks of at most `max_bytes` bytes each.
///
/// Text that fits the budget is returned as a single chunk, including empty
/// input. Longer text is split on blank-line paragraph boundaries, greedily
/// packing paragraphs into each chunk; a single paragraph larger than the
/// budget is hard-split at UTF-8 character boundaries. Paragraph separators
/// stay attached to their paragraph, so concatenating the chunks reproduces
/// the input byte-for-byte.
///
/// Budgets smaller than 4 bytes are floored to 4 during hard splits so a
/// multi-byte character can always be emitted whole.
#[must_use]
pub fn split_by_bytes(text: &str, max_bytes: usize) -> Vec<String> {
    if text.len() <= max_bytes {
        return vec![text.to_owned()];
    }

    let mut chunks = Vec::new();
    let mut buffer = String::new();

    for segment in paragraph_segments(text) {
        if buffer.len() + segment.len() <= max_bytes {
            buffer.push_str(segment);
            continue;
        }

        if !buffer.is_empty() {
            chunks.push(take(&mut buffer));
        }

        if segment.len() <= max_bytes {
            buffer.push_str(segment);
        } else {
            chunks.extend(hard_split(segment, max_bytes));
        }
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }

    chunks
}

/// Split text into paragraph segments, each carrying its trailing separator.
///
/// A separator is a run of two or more newlines. The segments concatenate
/// back to the input exactly.
fn paragraph_segments(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\n' {
            let run_start = index;
            while index < bytes.len() && bytes[index] == b'\n' {
                index += 1;
            }
            if index - run_start >= 2 {
                segments.push(&text[start..index]);
                start = index;
            }
        } else {
            index += 1;
        }
    }

    if start < bytes.len() {
        segments.push(&text[start..]);
    }

    segments
}

/// Hard-split an oversized paragraph into byte-bounded pieces.
///
/// Each cut backs up to the nearest UTF-8 character boundary, so every piece
/// is valid text. A UTF-8 scalar value is at most four bytes, which is why
/// flooring the budget to four guarantees each cut makes progress.
fn hard_split(paragraph: &str, max_bytes: usize) -> Vec<String> {
    let budget = max_bytes.max(4);
    let mut pieces = Vec::new();
    let mut rest = paragraph;

    while rest.len() > budget {
        let mut cut = budget;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        pieces.push(rest[..cut].to_owned());
        rest = &rest[cut..];
    }
    pieces.push(rest.to_owned());

    pieces
}
