use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Issue tracker connection and cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker base URL.
    #[serde(default = "default_tracker_url")]
    pub url: String,

    /// Restrict search to one project (identifier or numeric id).
    #[serde(default)]
    pub project: Option<String>,

    /// API key, sent as `X-Redmine-API-Key`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Basic auth user, used when no API key is set.
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound on search results per query.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// JSON cache of resolved reasons.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// When false, only the cache is consulted.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_tracker_url() -> String {
    "https://tracker.ceph.com".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_result_limit() -> usize {
    50
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("tracker_cache.json")
}

fn default_enabled() -> bool {
    true
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: default_tracker_url(),
            project: None,
            api_key: None,
            username: None,
            password: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            result_limit: default_result_limit(),
            cache_path: default_cache_path(),
            enabled: default_enabled(),
        }
    }
}

impl TrackerConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `FAILWATCH_TRACKER_URL` | Tracker base URL |
    /// | `FAILWATCH_TRACKER_PROJECT` | Project to search in |
    /// | `FAILWATCH_TRACKER_API_KEY` | API key |
    /// | `FAILWATCH_TRACKER_USERNAME` | Basic auth user |
    /// | `FAILWATCH_TRACKER_PASSWORD` | Basic auth password |
    /// | `FAILWATCH_TRACKER_TIMEOUT` | Request timeout in seconds |
    /// | `FAILWATCH_TRACKER_CACHE` | Cache file path |
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Overlay any `FAILWATCH_TRACKER_*` variables on top of `self`.
    pub fn merge_env(mut self) -> Self {
        if let Ok(url) = std::env::var("FAILWATCH_TRACKER_URL") {
            self.url = url;
        }
        if let Ok(project) = std::env::var("FAILWATCH_TRACKER_PROJECT") {
            self.project = Some(project);
        }
        if let Ok(key) = std::env::var("FAILWATCH_TRACKER_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(user) = std::env::var("FAILWATCH_TRACKER_USERNAME") {
            self.username = Some(user);
        }
        if let Ok(pass) = std::env::var("FAILWATCH_TRACKER_PASSWORD") {
            self.password = Some(pass);
        }
        if let Some(timeout) = std::env::var("FAILWATCH_TRACKER_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.timeout_secs = timeout;
        }
        if let Ok(cache) = std::env::var("FAILWATCH_TRACKER_CACHE") {
            self.cache_path = PathBuf::from(cache);
        }
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Link for an issue id.
    pub fn issue_link(&self, issue_id: u64) -> String {
        format!("{}/issues/{}", self.url.trim_end_matches('/'), issue_id)
    }
}
