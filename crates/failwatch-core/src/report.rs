//! Structured failure report and its plain-text rendering.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::TrackerMatch;

/// How the directories of a report were selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    SingleDirectory,
    Tree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedReason {
    /// 1-based position in the top list.
    pub rank: usize,
    pub reason: String,
    pub count: u64,
    #[serde(default)]
    pub issue: TrackerMatch,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeReport {
    pub version: String,
    pub flavor: String,
    pub directories: Vec<String>,
    pub top: Vec<RankedReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub subject: String,
    pub mode: ReportMode,
    pub user: String,
    pub suite: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub scopes: Vec<ScopeReport>,
}

impl FailureReport {
    pub fn new(
        mode: ReportMode,
        user: impl Into<String>,
        suite: impl Into<String>,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Self {
        let suite = suite.into();
        let subject = format!(
            "Top failures for {} ({} to {})",
            suite,
            window_start.format("%Y-%m-%d"),
            window_end.format("%Y-%m-%d")
        );
        Self {
            subject,
            mode,
            user: user.into(),
            suite,
            window_start,
            window_end,
            scopes: Vec::new(),
        }
    }

    pub fn total_failures(&self) -> u64 {
        self.scopes
            .iter()
            .flat_map(|s| s.top.iter())
            .map(|r| r.count)
            .sum()
    }

    /// Plain-text body for the report consumer.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Report for {} (suite: {})", self.user, self.suite);
        let _ = writeln!(
            out,
            "Date range: {} to {}",
            self.window_start.format("%Y-%m-%d"),
            self.window_end.format("%Y-%m-%d")
        );

        let mut current_version: Option<&str> = None;
        for scope in &self.scopes {
            if current_version != Some(scope.version.as_str()) {
                let _ = writeln!(out);
                let _ = writeln!(out, "=== Version: {} ===", scope.version);
                current_version = Some(scope.version.as_str());
            }
            let _ = writeln!(out, "-- Flavor: {}", scope.flavor);
            self.render_scope(&mut out, scope);
        }
        out
    }

    fn render_scope(&self, out: &mut String, scope: &ScopeReport) {
        if !scope.directories.is_empty() {
            let _ = writeln!(out, "Directories scanned:");
            for dir in &scope.directories {
                let _ = writeln!(out, "  {}", dir);
            }
        }
        if scope.top.is_empty() {
            let _ = writeln!(out, "(no failures found)");
            return;
        }
        let _ = writeln!(out, "Top failures:");
        for r in &scope.top {
            let _ = writeln!(out, "{:>3}. [{}] {}", r.rank, r.count, r.reason);
            if let Some(link) = r.issue.link.as_deref() {
                let _ = writeln!(out, "     tracker: {}", link);
            }
            if self.mode == ReportMode::SingleDirectory && !r.job_ids.is_empty() {
                let _ = writeln!(out, "     jobs: {}", r.job_ids.join(", "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn report(mode: ReportMode) -> FailureReport {
        let mut r = FailureReport::new(
            mode,
            "teuthology",
            "rados",
            day("2025-06-01"),
            day("2025-06-08"),
        );
        r.scopes.push(ScopeReport {
            version: "main".into(),
            flavor: "default".into(),
            directories: vec!["/a/teuthology-2025-06-07_01:00:00-rados-main-distro-default-smithi".into()],
            top: vec![RankedReason {
                rank: 1,
                reason: "max job timeout".into(),
                count: 3,
                issue: TrackerMatch::found(42, "https://tracker.example/issues/42"),
                job_ids: vec!["7654321".into(), "7654322".into()],
            }],
        });
        r.scopes.push(ScopeReport {
            version: "main".into(),
            flavor: "crimson".into(),
            directories: vec![],
            top: vec![],
        });
        r
    }

    #[test]
    fn tree_report_groups_flavors_under_version() {
        let text = report(ReportMode::Tree).render_text();
        assert!(text.starts_with("Report for teuthology (suite: rados)\nDate range: 2025-06-01 to 2025-06-08\n"));
        assert_eq!(text.matches("=== Version: main ===").count(), 1);
        assert!(text.contains("-- Flavor: default"));
        assert!(text.contains("  1. [3] max job timeout"));
        assert!(text.contains("tracker: https://tracker.example/issues/42"));
        assert!(text.contains("-- Flavor: crimson\n(no failures found)"));
        assert!(!text.contains("jobs:"));
    }

    #[test]
    fn single_directory_report_lists_jobs() {
        let text = report(ReportMode::SingleDirectory).render_text();
        assert!(text.contains("jobs: 7654321, 7654322"));
    }

    #[test]
    fn subject_and_totals() {
        let r = report(ReportMode::Tree);
        assert_eq!(r.subject, "Top failures for rados (2025-06-01 to 2025-06-08)");
        assert_eq!(r.total_failures(), 3);
    }

    #[test]
    fn json_omits_empty_fields() {
        let json = serde_json::to_value(report(ReportMode::Tree)).unwrap();
        assert_eq!(json["mode"], "tree");
        assert_eq!(json["scopes"][0]["top"][0]["issue"]["issue_id"], 42);
        assert!(json["scopes"][1]["top"].as_array().unwrap().is_empty());
    }
}
