
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::{API_KEY_ENV_VAR, EmbeddingConfig};
use crate::resilience::CircuitBreaker;

/// Service name under which embedding calls register with the circuit
/// breaker.
pub const EMBEDDING_SERVICE: &str = "deepinfra_embedding";

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const MAX_BACKOFF_MS: u64 = 60_000;

/// Blocking client for the DeepInfra inference API.
///
/// The credential is optional. A client without one stays fully functional
/// but answers every embedding request with an empty matrix, which
/// downstream code treats as "semantic search unavailable".
#[derive(Debug, Clone)]
pub struct DeepInfraClient {
    endpoint: Url,
    api_key: Option<String>,
    batch_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
    breaker: Arc<CircuitBreaker>,
}

impl DeepInfraClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .context("Failed to generate DeepInfra URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        if config.api_key.is_none() {
            warn!(
                "{} is not set; embeddings are disabled and search falls back to keyword matching",
                API_KEY_ENV_VAR
            );
        }

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            batch_size: config.batch_size.max(1) as usize,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            breaker: Arc::new(CircuitBreaker::default()),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Share a circuit breaker with other clients instead of the private
    /// default one.
    #[inline]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// Whether a credential is configured.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate embeddings for a list of texts, one vector per non-blank
    /// input, in input order.
    ///
    /// This never fails. A missing credential, an all-blank input list, a
    /// provider error, a malformed response, or rows of uneven width all
    /// collapse to an empty matrix; callers degrade to keyword matching
    /// instead of surfacing provider failures.
    #[inline]
    pub fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let filtered: Vec<&str> = texts
            .iter()
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .collect();

        if filtered.is_empty() {
            return Vec::new();
        }

        let Some(api_key) = self.api_key.as_deref() else {
            debug!(
                "No embedding credential configured; skipping {} texts",
                filtered.len()
            );
            return Vec::new();
        };

        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(filtered.len());

        // Process in batches to stay within provider request limits
        for batch in filtered.chunks(self.batch_size) {
            match self.embed_batch(api_key, batch) {
                Ok(batch_rows) => rows.extend(batch_rows),
                Err(error) => {
                    error!("Embedding request failed: {:#}", error);
                    return Vec::new();
                }
            }
        }

        if has_ragged_rows(&rows) {
            error!("Embedding provider returned vectors of uneven width; discarding all rows");
            return Vec::new();
        }

        debug!("Generated {} embeddings", rows.len());
        rows
    }

    fn embed_batch(&self, api_key: &str, batch: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request_json = serde_json::to_string(&json!({ "inputs": batch }))
            .context("Failed to serialize embedding request")?;
        let auth_header = format!("Bearer {}", api_key);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(self.endpoint.as_str())
                    .header("Authorization", auth_header.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?;

        let payload: Value = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        let vectors = extract_embeddings(&payload)
            .ok_or_else(|| anyhow::anyhow!("Unrecognized embedding response shape"))?;

        if vectors.len() != batch.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                batch.len(),
                vectors.len()
            ));
        }

        Ok(vectors)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        if !self.breaker.should_attempt(EMBEDDING_SERVICE) {
            return Err(anyhow::anyhow!(
                "Circuit breaker is open for {}",
                EMBEDDING_SERVICE
            ));
        }

        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    self.breaker.record_success(EMBEDDING_SERVICE);
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    self.breaker.record_failure(EMBEDDING_SERVICE);

                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true // Retry server errors
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true // Retry transport errors
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false // Don't retry other errors
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    // Wait before retry (exponential backoff)
                    if attempt < self.retry_attempts {
                        let delay_ms =
                            (EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000).min(MAX_BACKOFF_MS);
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.endpoint);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn has_ragged_rows(rows: &[Vec<f32>]) -> bool {
    rows.first().is_some_and(|first| {
        let dimension = first.len();
        dimension == 0 || rows.iter().any(|row| row.len() != dimension)
    })
}

/// Pull the vector list out of a provider response, tolerating the envelope
/// variants DeepInfra has shipped across model versions: `outputs`, `data`,
/// a single `embedding` row, `embeddings`, or a bare top-level list.
fn extract_embeddings(payload: &Value) -> Option<Vec<Vec<f32>>> {
    match payload {
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("outputs") {
                return items.iter().map(extract_vector).collect();
            }
            if let Some(Value::Array(items)) = map.get("data") {
                return items.iter().map(extract_vector).collect();
            }
            if let Some(Value::Array(values)) = map.get("embedding") {
                return Some(vec![collect_floats(values)?]);
            }
            if let Some(Value::Array(items)) = map.get("embeddings") {
                return items.iter().map(extract_vector).collect();
            }
            None
        }
        Value::Array(items) => items.iter().map(extract_vector).collect(),
        _ => None,
    }
}

fn extract_vector(item: &Value) -> Option<Vec<f32>> {
    match item {
        Value::Object(map) => {
            if let Some(Value::Array(values)) = map.get("embedding") {
                return collect_floats(values);
            }
            if let Some(Value::Array(values)) = map.get("vector") {
                return collect_floats(values);
            }
            if let Some(Value::Array(values)) = map.get("outputs") {
                return collect_floats(values);
            }
            None
        }
        Value::Array(values) => collect_floats(values),
        _ => None,
    }
}

fn collect_floats(values: &[Value]) -> Option<Vec<f32>> {
    values
        .iter()
        .map(|value| value.as_f64().map(|float| float as f32))
        .collect()
}
