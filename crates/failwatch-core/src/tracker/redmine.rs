//! Redmine `search.json` backend.
//!
//! This is the only place that interprets HTTP status codes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::config::TrackerConfig;
use super::error::{TrackerError, TrackerResult};
use super::search::{IssueCandidate, IssueSearch};

const USER_AGENT_VALUE: &str = concat!("failwatch/", env!("CARGO_PKG_VERSION"));
const API_KEY_HEADER: &str = "X-Redmine-API-Key";
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Authenticated Redmine search client.
#[derive(Debug, Clone)]
pub struct RedmineSearch {
    client: reqwest::Client,
    base_url: String,
    config: TrackerConfig,
}

impl RedmineSearch {
    pub fn new(config: TrackerConfig) -> TrackerResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key).map_err(|_| TrackerError::Config {
                message: "API key is not a valid header value".to_string(),
            })?;
            default_headers.insert(API_KEY_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| TrackerError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base_url = config.url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn search_url(&self) -> String {
        match self.config.project.as_deref() {
            Some(project) => format!("{}/projects/{}/search.json", self.base_url, project),
            None => format!("{}/search.json", self.base_url),
        }
    }

    async fn search_with_retry(&self, query: &str, limit: usize) -> TrackerResult<SearchResponse> {
        use rand::Rng;

        let mut retries = 0;
        loop {
            match self.search_once(query, limit).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    let backoff = match &e {
                        TrackerError::RateLimited {
                            retry_after: Some(after),
                        } => (*after).min(MAX_BACKOFF),
                        _ => {
                            let base = backoff_base(retries);
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };
                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying tracker search"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn search_once(&self, query: &str, limit: usize) -> TrackerResult<SearchResponse> {
        let url = self.search_url();
        let limit = limit.to_string();
        let mut request = self.client.get(&url).query(&[
            ("q", query),
            ("issues", "1"),
            ("all_words", "1"),
            ("titles_only", "0"),
            ("open_issues", "1"),
            ("limit", limit.as_str()),
        ]);
        if self.config.api_key.is_none() {
            if let Some(user) = self.config.username.as_deref() {
                request = request.basic_auth(user, self.config.password.as_deref());
            }
        }

        let response = request.send().await?;
        match response.status() {
            s if s.is_success() => {
                response
                    .json()
                    .await
                    .map_err(|e| TrackerError::InvalidResponse {
                        message: format!("failed to parse search response: {}", e),
                    })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TrackerError::Unauthorized {
                message: "tracker rejected credentials".to_string(),
            }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(TrackerError::RateLimited { retry_after })
            }
            s if s.is_server_error() => Err(TrackerError::Network {
                message: format!("server error: {}", s),
            }),
            s => Err(TrackerError::InvalidResponse {
                message: format!("unexpected status: {}", s),
            }),
        }
    }
}

#[async_trait]
impl IssueSearch for RedmineSearch {
    async fn search(&self, query: &str, limit: usize) -> TrackerResult<Vec<IssueCandidate>> {
        debug!(url = %self.search_url(), query, limit, "searching tracker");
        let resp = self.search_with_retry(query, limit).await?;
        let hits: Vec<IssueCandidate> = resp
            .results
            .into_iter()
            .filter(|h| h.kind.as_deref().map_or(true, |k| k.starts_with("issue")))
            .map(|h| IssueCandidate {
                id: h.id,
                title: h.title,
                description: h.description.filter(|d| !d.trim().is_empty()),
            })
            .take(limit)
            .collect();
        debug!(hits = hits.len(), "tracker search finished");
        Ok(hits)
    }
}

/// Exponential base delay for retry `retries` (1-based), capped at 30s.
fn backoff_base(retries: u32) -> Duration {
    Duration::from_millis(250u64 << retries.min(16)).min(MAX_BACKOFF)
}
