use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::TrackerResult;

/// One issue returned by a tracker search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCandidate {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Keyword search over open issues.
#[async_trait]
pub trait IssueSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> TrackerResult<Vec<IssueCandidate>>;
}
