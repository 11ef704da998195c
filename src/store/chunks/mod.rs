
use std::collections::HashSet;

/// Fragments shorter than this (after trimming) carry too little signal to
/// embed and are dropped during preparation.
pub const MIN_CHUNK_CHARS: usize = 40;

const LIVE_SEGMENT_MAX_CHARS: usize = 900;
const LIVE_SEGMENT_LIMIT: usize = 5;
const LIVE_SEGMENT_PREFIX: &str = "[Live Visit] ";

/// Normalize raw scraper fragments into the canonical chunk list: trimmed,
/// at least `MIN_CHUNK_CHARS` characters long, exact duplicates removed,
/// first-seen order preserved.
#[inline]
pub fn prepare_chunks(raw: &[String]) -> Vec<String> {
    let mut cleaned = Vec::new();
    let mut seen = HashSet::new();

    for fragment in raw {
        let trimmed = fragment.trim();
        if trimmed.chars().count() < MIN_CHUNK_CHARS {
            continue;
        }
        if !seen.insert(trimmed) {
            continue;
        }
        cleaned.push(trimmed.to_string());
    }

    cleaned
}

/// Split live-fetched page text into prefixed segments suitable for
/// appending to an entry's chunk list. Segments hold at most
/// `LIVE_SEGMENT_MAX_CHARS` characters and at most `LIVE_SEGMENT_LIMIT`
/// segments are produced; anything beyond that is discarded.
#[inline]
pub fn live_visit_segments(content: &str) -> Vec<String> {
    let normalized = content.replace("\r\n", "\n");
    let mut remaining = normalized.trim();

    let mut segments = Vec::new();
    while !remaining.is_empty() && segments.len() < LIVE_SEGMENT_LIMIT {
        let (head, tail) = remaining.split_at(char_boundary(remaining, LIVE_SEGMENT_MAX_CHARS));
        let segment = head.trim();
        if !segment.is_empty() {
            segments.push(format!("{}{}", LIVE_SEGMENT_PREFIX, segment));
        }
        remaining = tail;
    }

    segments
}

/// Byte offset of the `max_chars`-th character, or the string's length when
/// it is shorter than that. Always lands on a character boundary.
fn char_boundary(text: &str, max_chars: usize) -> usize {
    text.char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(offset, _)| offset)
}
