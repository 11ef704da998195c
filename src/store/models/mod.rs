
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::store::index::VectorIndex;

/// Payload handed over by the external scraper. Only `url` and
/// `structured_chunks` are interpreted here; every other field rides along
/// untouched and comes back out through `WebsiteEntry::scraped_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub structured_chunks: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One analyzed website, keyed by `(session, url)`.
#[derive(Debug, Clone)]
pub struct WebsiteEntry {
    pub url: String,
    pub session_id: Option<String>,
    pub scraped_data: SitePayload,
    pub insights: Map<String, Value>,
    pub chunks: Vec<String>,
    pub index: Option<Arc<VectorIndex>>,
    pub updated_at: DateTime<Utc>,
}

impl WebsiteEntry {
    /// Bare entry with no content yet; used when analysis insights arrive
    /// before any scrape.
    #[inline]
    pub fn new(url: String, session_id: Option<String>) -> Self {
        Self {
            url,
            session_id,
            scraped_data: SitePayload::default(),
            insights: Map::new(),
            chunks: Vec::new(),
            index: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether a usable semantic index is attached.
    #[inline]
    pub fn has_index(&self) -> bool {
        self.index
            .as_ref()
            .is_some_and(|index| index.dimension() > 0)
    }

    /// Whether strictly more than `ttl_seconds` have elapsed since the last
    /// write. Measured in milliseconds, so a TTL of zero expires an entry as
    /// soon as any time has passed but never at the instant it was written.
    #[inline]
    pub fn is_expired(&self, ttl_seconds: u64) -> bool {
        let elapsed_ms = Utc::now()
            .signed_duration_since(self.updated_at)
            .num_milliseconds();
        let ttl_ms = i64::try_from(ttl_seconds)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        elapsed_ms > ttl_ms
    }
}

/// One retrieved chunk together with its similarity (or keyword) score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMatch {
    pub chunk_index: usize,
    pub chunk_text: String,
    pub score: f32,
}
