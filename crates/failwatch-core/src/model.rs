use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Job id used when a record has no numeric job identifier.
pub const UNKNOWN: &str = "unknown";

/// One observed failure instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub directory: String,
    /// `YYYY-MM-DD`, or `unknown` when the log path carries no date.
    pub date: String,
    pub reason: String,
    pub job_id: String,
    pub version: String,
    pub flavor: String,
}

/// Version/flavor pair a record is counted under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunScope {
    pub version: String,
    pub flavor: String,
}

impl RunScope {
    pub fn new(version: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            flavor: flavor.into(),
        }
    }
}

impl std::fmt::Display for RunScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.version, self.flavor)
    }
}

/// A run directory accepted by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMatch {
    pub path: PathBuf,
    pub date: NaiveDate,
    pub user: String,
    pub suite: String,
    pub version: String,
    pub flavor: String,
}

/// Tracker cache value: `{issue_id, link}`, or `{}` when a search found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TrackerMatch {
    pub fn found(issue_id: u64, link: impl Into<String>) -> Self {
        Self {
            issue_id: Some(issue_id),
            link: Some(link.into()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.issue_id.is_none()
    }
}
