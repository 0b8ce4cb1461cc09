//! Issue tracker matching.
//!
//! Maps a canonical reason to the closest open tracker issue, remembering
//! every answer (including "nothing found") in a JSON cache so repeated
//! reports do not hit the tracker again.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod cache;
pub mod config;
pub mod error;
pub mod redmine;
pub mod score;
pub mod search;

pub use cache::TrackerCache;
pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use redmine::RedmineSearch;
pub use search::{IssueCandidate, IssueSearch};

use crate::model::TrackerMatch;

pub struct TrackerMatcher {
    search: Option<Arc<dyn IssueSearch>>,
    cache: Mutex<TrackerCache>,
    config: TrackerConfig,
}

impl TrackerMatcher {
    pub fn new(config: TrackerConfig, search: Arc<dyn IssueSearch>) -> Self {
        let cache = TrackerCache::load(&config.cache_path);
        Self {
            search: Some(search),
            cache: Mutex::new(cache),
            config,
        }
    }

    /// Cache-only matcher; misses resolve to `{}` without being cached.
    pub fn disabled(config: TrackerConfig) -> Self {
        let cache = TrackerCache::load(&config.cache_path);
        Self {
            search: None,
            cache: Mutex::new(cache),
            config,
        }
    }

    /// Redmine-backed matcher, or a cache-only one when `enabled` is false.
    pub fn from_config(config: TrackerConfig) -> TrackerResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled(config));
        }
        let search = RedmineSearch::new(config.clone())?;
        Ok(Self::new(config, Arc::new(search)))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Resolve `reason` to `{issue_id, link}` or `{}`. Never fails: tracker
    /// errors are logged and cached as "no match".
    pub async fn resolve(&self, reason: &str) -> TrackerMatch {
        let key = score::strip_noise(reason);
        if key.is_empty() {
            return TrackerMatch::none();
        }

        // Held across the search so concurrent callers never query the same key twice.
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache.get(&key) {
            debug!(reason = %key, "tracker cache hit");
            return hit.clone();
        }

        let Some(search) = self.search.as_ref() else {
            return TrackerMatch::none();
        };

        let query = score::normalize_for_search(&key);
        if query.is_empty() {
            return TrackerMatch::none();
        }

        let result = match search.search(&query, self.config.result_limit).await {
            Ok(candidates) if candidates.is_empty() => {
                info!(reason = %key, "no tracker issues found");
                TrackerMatch::none()
            }
            Ok(candidates) => match score::pick_best(&query, &candidates) {
                Some(best) => {
                    debug!(issue_id = best.issue_id, score = best.score, "selected tracker issue");
                    TrackerMatch::found(best.issue_id, self.config.issue_link(best.issue_id))
                }
                None => TrackerMatch::none(),
            },
            Err(e) => {
                warn!(reason = %key, error = %e, "tracker search failed, treating as no match");
                TrackerMatch::none()
            }
        };

        if let Err(e) = cache.insert(key, result.clone()) {
            warn!(error = %e, "could not persist tracker cache");
        }
        result
    }
}

impl std::fmt::Debug for TrackerMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerMatcher")
            .field("online", &self.search.is_some())
            .field("cache_path", &self.config.cache_path)
            .finish()
    }
}
