use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::{API_KEY_ENV_VAR, Config};
use crate::search::{dedupe_matches, keyword_scan};
use crate::store::chunks::{MIN_CHUNK_CHARS, prepare_chunks};
use crate::store::{AnalysisStore, SitePayload};

const PREVIEW_CHARS: usize = 160;

/// Prepare a scraped payload and rank its chunks against a query, falling
/// back to keyword matching when semantic search is unavailable.
#[inline]
pub fn search_payload(
    payload_path: &Path,
    query: &str,
    top_k: usize,
    session_id: Option<&str>,
) -> Result<()> {
    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    let config = Config::load(&config_dir)?;
    let store = AnalysisStore::new(&config)?;

    let payload = read_payload(payload_path)?;
    let entry = store.prepare_site("", &payload, session_id)?;
    info!(
        "Prepared {} chunks for {} (semantic index: {})",
        entry.chunks.len(),
        entry.url,
        entry.has_index()
    );

    let mut matches = store.search_chunks(&entry.url, query, top_k, session_id);
    let mut method = "semantic";
    if matches.is_empty() {
        matches = keyword_scan(&entry.chunks, query, top_k);
        method = "keyword";
    }
    let matches = dedupe_matches(matches, top_k);

    if matches.is_empty() {
        println!("No matching chunks for \"{}\"", query);
        return Ok(());
    }

    println!("Top {} matches ({} search):", matches.len(), method);
    for item in &matches {
        println!(
            "  [{}] {:.3}  {}",
            item.chunk_index,
            item.score,
            preview(&item.chunk_text)
        );
    }

    Ok(())
}

/// Show which fragments of a payload survive chunk preparation.
#[inline]
pub fn show_chunks(payload_path: &Path) -> Result<()> {
    let payload = read_payload(payload_path)?;
    let chunks = prepare_chunks(&payload.structured_chunks);

    if chunks.is_empty() {
        println!(
            "No chunks survived preparation (fragments shorter than {} characters are dropped)",
            MIN_CHUNK_CHARS
        );
        return Ok(());
    }

    println!("{} prepared chunks:", chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        println!("  [{}] {}", index, preview(chunk));
    }

    Ok(())
}

/// Print the resolved configuration. The credential is reported only as
/// present or absent.
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    let config = Config::load(&config_dir)?;

    println!("Configuration file: {}", config.config_file_path().display());
    println!("Embedding:");
    println!("  Endpoint: {}", config.embedding.base_url);
    println!("  Model: {}", config.embedding.model);
    println!("  Batch size: {}", config.embedding.batch_size);
    println!("  Timeout: {}s", config.embedding.timeout_seconds);
    println!(
        "  Credential ({}): {}",
        API_KEY_ENV_VAR,
        if config.embedding.api_key.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!("Store:");
    println!("  Entry TTL: {}s", config.store.ttl_seconds);

    Ok(())
}

fn read_payload(path: &Path) -> Result<SitePayload> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload file: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse payload file: {}", path.display()))
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", truncated.trim_end())
}
