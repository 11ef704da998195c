// Search module
// Keyword fallback ranking used when semantic retrieval is unavailable


use std::cmp::Ordering;
use std::collections::HashSet;

use crate::store::ChunkMatch;

/// Only the front of an entry's chunk list is scanned; the fallback is a
/// cheap last resort, not a full-text engine.
const SCAN_WINDOW: usize = 25;
const MIN_TOKEN_CHARS: usize = 3;

/// Rank chunks by how many query tokens they contain, case-insensitively.
///
/// Tokens are alphanumeric runs of at least `MIN_TOKEN_CHARS` characters; a
/// query with no such runs falls back to matching its whole text. Only the
/// first `SCAN_WINDOW` chunks are considered, and chunks containing no
/// token are omitted entirely.
#[inline]
pub fn keyword_scan(chunks: &[String], query: &str, top_k: usize) -> Vec<ChunkMatch> {
    if chunks.is_empty() || query.trim().is_empty() {
        return Vec::new();
    }

    let mut tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .collect();
    if tokens.is_empty() {
        tokens.push(query.to_lowercase());
    }

    let mut results: Vec<ChunkMatch> = Vec::new();
    for (index, chunk) in chunks.iter().take(SCAN_WINDOW).enumerate() {
        let lowered = chunk.to_lowercase();
        let score = tokens
            .iter()
            .filter(|token| lowered.contains(token.as_str()))
            .count();
        if score > 0 {
            results.push(ChunkMatch {
                chunk_index: index,
                chunk_text: chunk.clone(),
                score: score as f32,
            });
        }
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(top_k);
    results
}

/// Collapse duplicate chunk indexes, keeping the first (highest ranked)
/// occurrence of each. A limit of zero means no limit.
#[inline]
pub fn dedupe_matches(matches: Vec<ChunkMatch>, limit: usize) -> Vec<ChunkMatch> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();

    for item in matches {
        if !seen.insert(item.chunk_index) {
            continue;
        }
        deduped.push(item);
        if limit > 0 && deduped.len() >= limit {
            break;
        }
    }

    deduped
}
