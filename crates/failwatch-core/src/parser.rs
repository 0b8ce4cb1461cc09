//! Line-oriented scrape log parser.
//!
//! A log announces a reason (`Failure:`, `Timeout`, `Dead:`) and then lists
//! the affected job ids on a following line. The parser keeps the pending
//! reason until the first line that carries job ids consumes it.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::WatchError;
use crate::model::{FailureRecord, RunScope, UNKNOWN};
use crate::normalize::ReasonNormalizer;

/// Token that flags a backtrace anywhere in the log.
pub const BACKTRACE_MARKER: &str = "MAX_BACKTRACE_LINES";
/// Reason recorded for every backtrace marker.
pub const BACKTRACE_REASON: &str = "BACKTRACE";

struct Patterns {
    failure: Regex,
    dead: Regex,
    job: Regex,
    date: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        failure: Regex::new(r"^(Failure:|Timeout:?)\s*(.*)").expect("failure pattern"),
        dead: Regex::new(r"Dead: (.+)").expect("dead pattern"),
        job: Regex::new(r"[0-9]{7,}").expect("job pattern"),
        date: Regex::new(r"([0-9]{4}-[0-9]{2}-[0-9]{2})_").expect("date pattern"),
    })
}

/// What a single line means to the parser.
#[derive(Debug, PartialEq, Eq)]
enum LineEvent<'a> {
    Backtrace,
    Reason(String),
    JobIds(Vec<&'a str>),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct LogParser {
    normalizer: ReasonNormalizer,
}

impl LogParser {
    pub fn new(normalizer: ReasonNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &ReasonNormalizer {
        &self.normalizer
    }

    /// Read and parse one log file.
    pub fn parse_file(
        &self,
        log_path: &Path,
        scope: &RunScope,
    ) -> Result<Vec<FailureRecord>, WatchError> {
        let text = std::fs::read_to_string(log_path).map_err(|source| WatchError::Io {
            path: log_path.to_path_buf(),
            source,
        })?;
        Ok(self.parse_text(log_path, &text, scope))
    }

    /// Parse already-loaded log text. `log_path` supplies directory and date.
    pub fn parse_text(&self, log_path: &Path, text: &str, scope: &RunScope) -> Vec<FailureRecord> {
        let directory = log_path
            .parent()
            .unwrap_or(log_path)
            .to_string_lossy()
            .into_owned();
        let date = extract_date(log_path);
        let record = |reason: &str, job_id: &str| FailureRecord {
            directory: directory.clone(),
            date: date.clone(),
            reason: reason.to_string(),
            job_id: job_id.to_string(),
            version: scope.version.clone(),
            flavor: scope.flavor.clone(),
        };

        let mut out = Vec::new();
        let mut current_reason: Option<String> = None;

        for line in text.lines() {
            let pending = current_reason.is_some();
            match self.classify(line, pending) {
                LineEvent::Backtrace => out.push(record(BACKTRACE_REASON, UNKNOWN)),
                LineEvent::Reason(reason) => {
                    debug!(reason = %reason, "detected failure reason");
                    current_reason = Some(reason);
                }
                LineEvent::JobIds(jobs) => {
                    if let Some(reason) = current_reason.take() {
                        out.extend(jobs.into_iter().map(|job| record(&reason, job)));
                    }
                }
                LineEvent::Ignored => {}
            }
        }

        debug!(path = %log_path.display(), records = out.len(), "parsed log");
        out
    }

    /// A header whose message normalizes to nothing sets no reason.
    fn reason_event<'a>(&self, raw: &str) -> LineEvent<'a> {
        let reason = self.normalizer.canonical(raw);
        if reason.trim().is_empty() {
            LineEvent::Ignored
        } else {
            LineEvent::Reason(reason)
        }
    }

    fn classify<'a>(&self, line: &'a str, reason_pending: bool) -> LineEvent<'a> {
        let p = patterns();

        if line.contains(BACKTRACE_MARKER) {
            return LineEvent::Backtrace;
        }

        if let Some(caps) = p.failure.captures(line) {
            let message = caps.get(2).map_or("", |m| m.as_str());
            let raw = if caps[1].starts_with("Timeout") {
                format!("Timeout {}", message)
            } else {
                message.to_string()
            };
            return self.reason_event(&raw);
        }

        if let Some(caps) = p.dead.captures(line) {
            return self.reason_event(&caps[1]);
        }

        if reason_pending {
            let jobs: Vec<&str> = p.job.find_iter(line).map(|m| m.as_str()).collect();
            if !jobs.is_empty() {
                return LineEvent::JobIds(jobs);
            }
        }

        LineEvent::Ignored
    }
}

/// First `YYYY-MM-DD_` in the path, or `unknown`.
pub fn extract_date(path: &Path) -> String {
    let s = path.to_string_lossy();
    patterns()
        .date
        .captures(&s)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ReasonTable;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn parser() -> LogParser {
        let mut entries = HashMap::new();
        entries.insert(
            "OSD bench result of 123 IOPS".to_string(),
            "OSD bench IOPS out of threshold".to_string(),
        );
        LogParser::new(ReasonNormalizer::new(Arc::new(ReasonTable::new(entries))))
    }

    fn log_path() -> PathBuf {
        PathBuf::from(
            "/a/teuthology-2025-05-20_21:00:02-rados-main-distro-default-smithi/scrape.log",
        )
    }

    fn scope() -> RunScope {
        RunScope::new("main", "default")
    }

    #[test]
    fn failure_then_job_line_emits_one_record() {
        let text = "Failure: OSD bench result of 123 IOPS\n1 jobs: ['7654321']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].reason, "OSD bench IOPS out of threshold");
        assert_eq!(recs[0].job_id, "7654321");
        assert_eq!(recs[0].date, "2025-05-20");
        assert_eq!(
            recs[0].directory,
            "/a/teuthology-2025-05-20_21:00:02-rados-main-distro-default-smithi"
        );
        assert_eq!(recs[0].version, "main");
        assert_eq!(recs[0].flavor, "default");
    }

    #[test]
    fn every_job_id_on_the_line_is_counted() {
        let text = "Failure: boom\n3 jobs: ['8000001', '8000002', '8000003']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        let ids: Vec<_> = recs.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["8000001", "8000002", "8000003"]);
        assert!(recs.iter().all(|r| r.reason == "boom"));
    }

    #[test]
    fn reason_is_consumed_by_first_job_line() {
        let text = "Failure: boom\n['8000001']\n['8000002']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].job_id, "8000001");
    }

    #[test]
    fn lines_without_job_ids_keep_reason_pending() {
        let text = "Failure: boom\nsome context line\n['8000001']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].reason, "boom");
    }

    #[test]
    fn reason_without_job_line_emits_nothing() {
        let recs = parser().parse_text(&log_path(), "Failure: lonely\n", &scope());
        assert!(recs.is_empty());
    }

    #[test]
    fn bare_failure_header_sets_no_reason() {
        let recs = parser().parse_text(&log_path(), "Failure:\n['8000001']\n", &scope());
        assert!(recs.is_empty());

        let text = "Failure: real\nDead:   \n['8000002']\nFailure:\n['8000003']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].reason, "real");
        assert_eq!(recs[0].job_id, "8000002");
    }

    #[test]
    fn job_ids_without_reason_are_ignored() {
        let recs = parser().parse_text(&log_path(), "['8000001']\n", &scope());
        assert!(recs.is_empty());
    }

    #[test]
    fn short_numbers_are_not_job_ids() {
        let text = "Failure: boom\nstatus 123456\n['8000001']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].job_id, "8000001");
    }

    #[test]
    fn timeout_keeps_its_keyword() {
        let text = "Timeout: 3h running workunit\n['8000001']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs[0].reason, "Timeout 3h running workunit");

        let text = "Timeout 3h running workunit\n['8000001']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs[0].reason, "Timeout 3h running workunit");
    }

    #[test]
    fn dead_lines_announce_a_reason() {
        let text = "Dead: SSH connection to smithi101 was lost\n['8000001']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs[0].reason, "SSH connection to smithi000 was lost");
    }

    #[test]
    fn backtrace_is_counted_without_touching_pending_reason() {
        let text = "Failure: boom\nMAX_BACKTRACE_LINES reached\n['8000001']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].reason, BACKTRACE_REASON);
        assert_eq!(recs[0].job_id, UNKNOWN);
        assert_eq!(recs[1].reason, "boom");
        assert_eq!(recs[1].job_id, "8000001");
    }

    #[test]
    fn host_variants_share_one_reason() {
        let text = "Failure: Command failed on smithi012 with status 1\n['8000001']\n\
                    Failure: Command failed on smithi177 with status 1\n['8000002']\n";
        let recs = parser().parse_text(&log_path(), text, &scope());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].reason, recs[1].reason);
    }

    #[test]
    fn date_is_unknown_without_pattern() {
        assert_eq!(extract_date(Path::new("/tmp/run/scrape.log")), UNKNOWN);
        let text = "Failure: boom\n['8000001']\n";
        let recs = parser().parse_text(Path::new("/tmp/run/scrape.log"), text, &scope());
        assert_eq!(recs[0].date, UNKNOWN);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = parser()
            .parse_file(Path::new("/nonexistent/dir/scrape.log"), &scope())
            .unwrap_err();
        assert!(matches!(err, WatchError::Io { .. }));
    }
}
