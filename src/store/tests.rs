use super::*;
use crate::config::EmbeddingConfig;
use serde_json::json;

const STRIPE_CHUNK: &str = "Stripe provides payment processing APIs for online businesses";
const NOTION_CHUNK: &str = "Notion is an all-in-one workspace for notes, docs, and projects";

/// Store whose client has no credential; it never performs network calls
/// and every entry is stored without a semantic index.
fn offline_store(ttl_seconds: u64) -> AnalysisStore {
    let config = EmbeddingConfig {
        api_key: None,
        ..Default::default()
    };
    let embedder = DeepInfraClient::new(&config).expect("should create offline client");
    AnalysisStore::with_embedder(embedder, ttl_seconds)
}

fn payload_with_chunks(url: &str, chunks: &[&str]) -> SitePayload {
    SitePayload {
        url: Some(url.to_string()),
        structured_chunks: chunks.iter().map(|chunk| (*chunk).to_string()).collect(),
        extra: Map::new(),
    }
}

fn insights_from(value: Value) -> Map<String, Value> {
    value
        .as_object()
        .expect("insights fixture should be an object")
        .clone()
}

fn backdate(store: &AnalysisStore, key: &str, seconds: i64) {
    let mut entries = store.entries.lock().expect("should lock entries");
    let entry = entries.get_mut(key).expect("entry should exist");
    entry.updated_at = Utc::now() - chrono::Duration::seconds(seconds);
}

#[test]
fn prepare_requires_url() {
    let store = offline_store(3600);

    let result = store.prepare_site("", &SitePayload::default(), None);
    assert!(result.is_err());

    let result = store.prepare_site("   ", &SitePayload::default(), None);
    let error = result.expect_err("blank url should be rejected");
    assert!(error.to_string().contains("URL is required"));
}

#[test]
fn prepare_falls_back_to_payload_url() {
    let store = offline_store(3600);
    let payload = payload_with_chunks("https://example.com", &[STRIPE_CHUNK]);

    let entry = store
        .prepare_site("", &payload, None)
        .expect("should resolve url from payload");
    assert_eq!(entry.url, "https://example.com");
    assert!(store.get("https://example.com", None).is_some());
}

#[test]
fn prepare_without_credential_stores_entry_without_index() {
    let store = offline_store(3600);
    let payload = payload_with_chunks("https://example.com", &[STRIPE_CHUNK]);

    let entry = store
        .prepare_site("https://example.com", &payload, None)
        .expect("should prepare site");

    assert!(!entry.has_index());
    assert_eq!(entry.chunks, vec![STRIPE_CHUNK.to_string()]);
    assert_eq!(entry.session_id, None);
}

#[test]
fn prepare_applies_chunk_rules() {
    let store = offline_store(3600);
    let payload = payload_with_chunks(
        "https://example.com",
        &["too short", STRIPE_CHUNK, STRIPE_CHUNK, NOTION_CHUNK],
    );

    let entry = store
        .prepare_site("https://example.com", &payload, None)
        .expect("should prepare site");

    assert_eq!(
        entry.chunks,
        vec![STRIPE_CHUNK.to_string(), NOTION_CHUNK.to_string()]
    );
}

#[test]
fn sessions_isolate_entries_for_same_url() {
    let store = offline_store(3600);
    let url = "https://example.com";

    store
        .store_analysis(
            url,
            &payload_with_chunks(url, &[STRIPE_CHUNK]),
            insights_from(json!({ "summary": "Session A insights", "industry": "Technology" })),
            Some("session-a"),
        )
        .expect("should store session A");
    store
        .store_analysis(
            url,
            &payload_with_chunks(url, &[NOTION_CHUNK]),
            insights_from(json!({ "summary": "Session B insights", "industry": "Healthcare" })),
            Some("session-b"),
        )
        .expect("should store session B");

    let entry_a = store.get(url, Some("session-a")).expect("session A entry");
    let entry_b = store.get(url, Some("session-b")).expect("session B entry");

    assert_eq!(entry_a.insights["summary"], json!("Session A insights"));
    assert_eq!(entry_b.insights["summary"], json!("Session B insights"));
    assert_eq!(entry_a.chunks, vec![STRIPE_CHUNK.to_string()]);
    assert_eq!(entry_b.chunks, vec![NOTION_CHUNK.to_string()]);
    assert_eq!(entry_a.session_id.as_deref(), Some("session-a"));
}

#[test]
fn sessionless_entry_is_separate_from_sessions() {
    let store = offline_store(3600);
    let url = "https://example.com";

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should store sessionless entry");

    assert!(store.get(url, Some("session-a")).is_none());
    let entry = store.get(url, None).expect("sessionless entry");
    assert_eq!(entry.session_id, None);
}

#[test]
fn same_session_keeps_urls_apart() {
    let store = offline_store(3600);

    store
        .store_analysis(
            "https://payments.example.com",
            &payload_with_chunks("https://payments.example.com", &[STRIPE_CHUNK]),
            insights_from(json!({ "topic": "Payments" })),
            Some("session-a"),
        )
        .expect("should store first url");
    store
        .store_analysis(
            "https://productivity.example.com",
            &payload_with_chunks("https://productivity.example.com", &[NOTION_CHUNK]),
            insights_from(json!({ "topic": "Productivity" })),
            Some("session-a"),
        )
        .expect("should store second url");

    let payments = store
        .get("https://payments.example.com", Some("session-a"))
        .expect("payments entry");
    let productivity = store
        .get("https://productivity.example.com", Some("session-a"))
        .expect("productivity entry");

    assert_eq!(payments.insights["topic"], json!("Payments"));
    assert_eq!(productivity.insights["topic"], json!("Productivity"));
}

#[test]
fn registry_keys_scope_by_session() {
    assert_eq!(
        make_key("https://example.com", Some("abc-123")),
        "abc-123:https://example.com"
    );
    assert_eq!(make_key("https://example.com", None), "https://example.com");
    assert_eq!(make_key("https://example.com", Some("")), "https://example.com");
    assert_eq!(
        make_key("https://example.com", Some("   ")),
        "https://example.com"
    );
}

#[test]
fn update_insights_creates_bare_entry() {
    let store = offline_store(3600);

    store.update_insights(
        "https://example.com",
        insights_from(json!({ "headquarters": "New York" })),
        Some("session-a"),
    );

    let entry = store
        .get("https://example.com", Some("session-a"))
        .expect("bare entry should exist");
    assert_eq!(entry.insights["headquarters"], json!("New York"));
    assert!(entry.chunks.is_empty());
    assert!(!entry.has_index());
}

#[test]
fn update_insights_ignores_blank_url() {
    let store = offline_store(3600);

    store.update_insights("   ", insights_from(json!({ "lost": true })), None);
    assert!(store.get("", None).is_none());
    assert!(store.get("   ", None).is_none());
}

#[test]
fn insights_survive_reprepare() {
    let store = offline_store(3600);
    let url = "https://example.com";

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should prepare site");
    store.update_insights(url, insights_from(json!({ "summary": "Kept" })), None);

    let entry = store
        .prepare_site(url, &payload_with_chunks(url, &[NOTION_CHUNK]), None)
        .expect("should rebuild entry");

    assert_eq!(entry.insights["summary"], json!("Kept"));
    assert_eq!(entry.chunks, vec![NOTION_CHUNK.to_string()]);
}

#[test]
fn store_analysis_returns_entry_with_insights() {
    let store = offline_store(3600);
    let url = "https://example.com";

    let entry = store
        .store_analysis(
            url,
            &payload_with_chunks(url, &[STRIPE_CHUNK]),
            insights_from(json!({ "summary": "Payment processing company" })),
            None,
        )
        .expect("should store analysis");

    assert_eq!(entry.insights["summary"], json!("Payment processing company"));

    let fetched = store.get(url, None).expect("entry should exist");
    assert_eq!(fetched.insights["summary"], json!("Payment processing company"));
}

#[test]
fn zero_ttl_evicts_on_next_access() {
    let store = offline_store(0);
    let url = "https://example.com";

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should prepare site");

    std::thread::sleep(std::time::Duration::from_millis(10));
    assert!(store.get(url, None).is_none());
}

#[test]
fn sweep_keeps_fresh_entries() {
    let store = offline_store(3600);

    store
        .prepare_site(
            "https://stale.example.com",
            &payload_with_chunks("https://stale.example.com", &[STRIPE_CHUNK]),
            None,
        )
        .expect("should prepare stale site");
    store
        .prepare_site(
            "https://fresh.example.com",
            &payload_with_chunks("https://fresh.example.com", &[NOTION_CHUNK]),
            None,
        )
        .expect("should prepare fresh site");

    backdate(&store, "https://stale.example.com", 7200);

    assert!(store.get("https://stale.example.com", None).is_none());
    assert!(store.get("https://fresh.example.com", None).is_some());
}

#[test]
fn get_chunks_for_missing_entry() {
    let store = offline_store(3600);
    assert!(store.get_chunks("https://unknown.example.com", None).is_empty());
}

#[test]
fn get_chunks_returns_prepared_chunks() {
    let store = offline_store(3600);
    let url = "https://example.com";

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK, NOTION_CHUNK]), None)
        .expect("should prepare site");

    assert_eq!(
        store.get_chunks(url, None),
        vec![STRIPE_CHUNK.to_string(), NOTION_CHUNK.to_string()]
    );
}

#[test]
fn search_degrades_to_empty() {
    let store = offline_store(3600);
    let url = "https://example.com";

    // Missing entry
    assert!(store.search_chunks(url, "payments", 5, None).is_empty());

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should prepare site");

    // Blank query
    assert!(store.search_chunks(url, "   ", 5, None).is_empty());
    // Entry exists but carries no index without a credential
    assert!(store.search_chunks(url, "payments", 5, None).is_empty());
}

#[test]
fn merge_live_content_appends_and_rebuilds() {
    let store = offline_store(3600);
    let url = "https://example.com";
    let live_text = "The team announced a new enterprise tier with custom pricing today.";

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should prepare site");
    store.update_insights(url, insights_from(json!({ "summary": "Kept" })), None);

    let merged = store
        .merge_live_content(url, live_text, None)
        .expect("should merge live content");
    assert!(merged);

    let chunks = store.get_chunks(url, None);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1], format!("[Live Visit] {}", live_text));

    // Insights survive the rebuild triggered by the merge
    let entry = store.get(url, None).expect("entry should exist");
    assert_eq!(entry.insights["summary"], json!("Kept"));
}

#[test]
fn merge_live_content_is_idempotent() {
    let store = offline_store(3600);
    let url = "https://example.com";
    let live_text = "The team announced a new enterprise tier with custom pricing today.";

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should prepare site");

    assert!(store
        .merge_live_content(url, live_text, None)
        .expect("first merge should succeed"));
    assert!(!store
        .merge_live_content(url, live_text, None)
        .expect("second merge should be a no-op"));

    assert_eq!(store.get_chunks(url, None).len(), 2);
}

#[test]
fn merge_live_content_without_entry() {
    let store = offline_store(3600);

    let merged = store
        .merge_live_content("https://unknown.example.com", "some live text", None)
        .expect("merge without entry should not fail");
    assert!(!merged);
}

#[test]
fn merge_live_content_with_blank_text() {
    let store = offline_store(3600);
    let url = "https://example.com";

    store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should prepare site");

    let merged = store
        .merge_live_content(url, "   \n ", None)
        .expect("blank merge should not fail");
    assert!(!merged);
}

#[test]
fn writes_advance_entry_timestamp() {
    let store = offline_store(3600);
    let url = "https://example.com";

    let entry = store
        .prepare_site(url, &payload_with_chunks(url, &[STRIPE_CHUNK]), None)
        .expect("should prepare site");
    let first_write = entry.updated_at;

    std::thread::sleep(std::time::Duration::from_millis(5));
    store.update_insights(url, insights_from(json!({ "summary": "New" })), None);

    let refreshed = store.get(url, None).expect("entry should exist");
    assert!(refreshed.updated_at > first_write);
}

#[test]
fn payload_extras_survive_storage() {
    let store = offline_store(3600);
    let url = "https://example.com";

    let mut payload = payload_with_chunks(url, &[STRIPE_CHUNK]);
    payload
        .extra
        .insert("title".to_string(), json!("Example Site"));

    store
        .prepare_site(url, &payload, None)
        .expect("should prepare site");

    let entry = store.get(url, None).expect("entry should exist");
    assert_eq!(entry.scraped_data.extra["title"], json!("Example Site"));
}
