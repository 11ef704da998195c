// Analysis store module
// In-memory registry of analyzed websites with per-entry semantic indexes

#[cfg(test)]
mod tests;

pub mod chunks;
pub mod index;
pub mod models;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::DeepInfraClient;
use crate::{InsightsError, Result};

pub use index::VectorIndex;
pub use models::{ChunkMatch, SitePayload, WebsiteEntry};

/// In-memory registry of analyzed websites.
///
/// One instance serves the whole process. The registry mutex is only held
/// around map reads and writes; embedding calls always happen outside it so
/// a slow provider cannot stall unrelated lookups. Concurrent writes to the
/// same key resolve last-writer-wins.
#[derive(Debug)]
pub struct AnalysisStore {
    embedder: DeepInfraClient,
    entries: Mutex<HashMap<String, WebsiteEntry>>,
    ttl_seconds: u64,
}

impl AnalysisStore {
    /// Build a store from configuration, wiring up the embedding client.
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let embedder = DeepInfraClient::new(&config.embedding)?;
        Ok(Self::with_embedder(embedder, config.store.ttl_seconds))
    }

    /// Build a store around an existing client. Tests use this to point the
    /// client at a mock server or to strip its credential.
    #[inline]
    pub fn with_embedder(embedder: DeepInfraClient, ttl_seconds: u64) -> Self {
        Self {
            embedder,
            entries: Mutex::new(HashMap::new()),
            ttl_seconds,
        }
    }

    /// Chunk, embed, and index a scraped payload, replacing any previous
    /// entry for the `(session, url)` key. Insights already stored for the
    /// key survive the rebuild.
    ///
    /// A blank URL (after falling back to the payload's own) is a caller
    /// bug and fails loudly. Embedding failures are not errors; the entry
    /// is stored without an index and search degrades accordingly.
    #[inline]
    pub fn prepare_site(
        &self,
        url: &str,
        payload: &SitePayload,
        session_id: Option<&str>,
    ) -> Result<WebsiteEntry> {
        let url = resolve_url(url, payload)?;

        let prepared = chunks::prepare_chunks(&payload.structured_chunks);
        let index = self.build_index(&url, &prepared);

        let mut entry = WebsiteEntry::new(
            url.clone(),
            normalize_session(session_id).map(str::to_string),
        );
        entry.scraped_data = payload.clone();
        entry.chunks = prepared;
        entry.index = index;

        let key = make_key(&url, session_id);
        let mut entries = self.lock_entries();
        self.sweep_expired(&mut entries);
        if let Some(existing) = entries.get(&key) {
            if !existing.insights.is_empty() {
                entry.insights = existing.insights.clone();
            }
        }
        entries.insert(key, entry.clone());

        debug!(
            "Prepared {} with {} chunks (index: {})",
            entry.url,
            entry.chunks.len(),
            entry.has_index()
        );
        Ok(entry)
    }

    /// Replace the stored insights for a key. Creates a bare entry when
    /// analysis output arrives before any scrape; silently ignores blank
    /// URLs.
    #[inline]
    pub fn update_insights(
        &self,
        url: &str,
        insights: Map<String, Value>,
        session_id: Option<&str>,
    ) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }

        let key = make_key(url, session_id);
        let mut entries = self.lock_entries();
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.insights = insights;
                entry.updated_at = Utc::now();
            }
            None => {
                let mut entry = WebsiteEntry::new(
                    url.to_string(),
                    normalize_session(session_id).map(str::to_string),
                );
                entry.insights = insights;
                entries.insert(key, entry);
            }
        }
    }

    /// `prepare_site` followed by `update_insights`, returning the final
    /// snapshot.
    #[inline]
    pub fn store_analysis(
        &self,
        url: &str,
        payload: &SitePayload,
        insights: Map<String, Value>,
        session_id: Option<&str>,
    ) -> Result<WebsiteEntry> {
        let mut entry = self.prepare_site(url, payload, session_id)?;
        self.update_insights(&entry.url, insights.clone(), session_id);
        entry.insights = insights;
        Ok(entry)
    }

    /// Snapshot of the entry for a key, if present and fresh. Every lookup
    /// sweeps expired entries first, so eviction cost amortizes over reads.
    #[inline]
    pub fn get(&self, url: &str, session_id: Option<&str>) -> Option<WebsiteEntry> {
        let key = make_key(url.trim(), session_id);
        let mut entries = self.lock_entries();
        self.sweep_expired(&mut entries);
        entries.get(&key).cloned()
    }

    /// Rank an entry's chunks against a query, best match first.
    ///
    /// Every degraded condition collapses to an empty list: blank query,
    /// missing or expired entry, entry without an index, failed query
    /// embedding, or a query vector of the wrong width. Callers never
    /// branch on why retrieval was unavailable.
    #[inline]
    pub fn search_chunks(
        &self,
        url: &str,
        query: &str,
        top_k: usize,
        session_id: Option<&str>,
    ) -> Vec<ChunkMatch> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let Some(entry) = self.get(url, session_id) else {
            return Vec::new();
        };
        let Some(index) = entry.index.as_ref() else {
            debug!("No semantic index for {}; returning no matches", entry.url);
            return Vec::new();
        };

        let vectors = self.embedder.embed(&[query.to_string()]);
        let Some(query_vector) = vectors.first() else {
            debug!("Query embedding unavailable for {}", entry.url);
            return Vec::new();
        };

        if query_vector.len() != index.dimension() {
            warn!(
                "Embedding dimension mismatch for {} (expected {}, got {})",
                entry.url,
                index.dimension(),
                query_vector.len()
            );
            return Vec::new();
        }

        let limit = top_k.min(entry.chunks.len());
        if limit == 0 {
            return Vec::new();
        }

        index
            .search(query_vector, limit)
            .into_iter()
            .filter_map(|(row, score)| {
                entry.chunks.get(row).map(|chunk| ChunkMatch {
                    chunk_index: row,
                    chunk_text: chunk.clone(),
                    score,
                })
            })
            .collect()
    }

    /// Chunk list for a key; empty when the entry is missing.
    #[inline]
    pub fn get_chunks(&self, url: &str, session_id: Option<&str>) -> Vec<String> {
        self.get(url, session_id)
            .map(|entry| entry.chunks)
            .unwrap_or_default()
    }

    /// Fold live-fetched page text into an existing entry and rebuild its
    /// index, keeping the key's insights. Returns whether anything new was
    /// merged; content already present and unknown keys are no-ops.
    #[inline]
    pub fn merge_live_content(
        &self,
        url: &str,
        content: &str,
        session_id: Option<&str>,
    ) -> Result<bool> {
        let segments = chunks::live_visit_segments(content);
        if segments.is_empty() {
            return Ok(false);
        }

        let Some(entry) = self.get(url, session_id) else {
            debug!("No entry for {}; skipping live content merge", url.trim());
            return Ok(false);
        };

        let mut merged = entry.chunks.clone();
        let mut added = false;
        for segment in segments {
            if !merged.contains(&segment) {
                merged.push(segment);
                added = true;
            }
        }
        if !added {
            return Ok(false);
        }

        let mut payload = entry.scraped_data.clone();
        payload.structured_chunks = merged;
        self.prepare_site(&entry.url, &payload, session_id)?;
        Ok(true)
    }

    fn build_index(&self, url: &str, prepared: &[String]) -> Option<Arc<VectorIndex>> {
        if prepared.is_empty() {
            return None;
        }

        let vectors = self.embedder.embed(prepared);
        if vectors.is_empty() {
            info!(
                "No embeddings generated for {}; semantic search will be unavailable",
                url
            );
            return None;
        }

        VectorIndex::build(vectors).map(Arc::new)
    }

    fn sweep_expired(&self, entries: &mut HashMap<String, WebsiteEntry>) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl_seconds));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} expired entries", evicted);
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, WebsiteEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn resolve_url(url: &str, payload: &SitePayload) -> Result<String> {
    let url = url.trim();
    if !url.is_empty() {
        return Ok(url.to_string());
    }

    let fallback = payload.url.as_deref().unwrap_or_default().trim();
    if fallback.is_empty() {
        return Err(InsightsError::Store(
            "URL is required to prepare site data".to_string(),
        ));
    }
    Ok(fallback.to_string())
}

/// Registry key for a `(session, url)` pair: session-prefixed when a
/// non-blank session id is given, the bare URL otherwise.
fn make_key(url: &str, session_id: Option<&str>) -> String {
    match normalize_session(session_id) {
        Some(session) => format!("{}:{}", session, url),
        None => url.to_string(),
    }
}

/// Blank and whitespace-only session ids mean "no session".
fn normalize_session(session_id: Option<&str>) -> Option<&str> {
    session_id
        .map(str::trim)
        .filter(|session| !session.is_empty())
}
