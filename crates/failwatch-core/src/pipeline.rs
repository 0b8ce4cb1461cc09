//! Scan → parse → store → aggregate → resolve.
//!
//! A single-directory run and a bot-mode tree run share every stage; they
//! differ only in how run directories are selected and how statistics are
//! scoped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::error::{WatchError, WatchResult};
use crate::model::{FailureRecord, RunScope};
use crate::normalize::ReasonNormalizer;
use crate::parser::LogParser;
use crate::report::{FailureReport, RankedReason, ReportMode, ScopeReport};
use crate::scanner::DirectoryScanner;
use crate::storage::{FailureStore, StatsFilter};
use crate::tracker::TrackerMatcher;

/// Where run directories come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// One run directory, stamped with the configured version and flavor.
    SingleDirectory(PathBuf),
    /// Every matching directory under a root, for each version x flavor.
    Tree(PathBuf),
}

impl RunMode {
    pub fn from_config(config: &WatchConfig) -> Self {
        if config.bot {
            Self::Tree(config.log_directory.clone())
        } else {
            Self::SingleDirectory(config.log_directory.clone())
        }
    }

    fn report_mode(&self) -> ReportMode {
        match self {
            Self::SingleDirectory(_) => ReportMode::SingleDirectory,
            Self::Tree(_) => ReportMode::Tree,
        }
    }
}

/// Directories selected for one scope.
#[derive(Debug)]
struct ScopePlan {
    scope: RunScope,
    directories: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct Pipeline {
    config: WatchConfig,
    parser: Arc<LogParser>,
    scanner: DirectoryScanner,
    store: FailureStore,
    matcher: Arc<TrackerMatcher>,
}

impl Pipeline {
    /// Build the parser and scanner from `config`; the store and matcher are injected.
    pub fn new(
        config: WatchConfig,
        store: FailureStore,
        matcher: Arc<TrackerMatcher>,
    ) -> WatchResult<Self> {
        config.validate()?;
        let table = Arc::new(config.load_reason_table()?);
        debug!(entries = table.len(), "loaded reason table");
        let normalizer = ReasonNormalizer::with_rules(table, &config.normalize);
        let scanner = DirectoryScanner::new(config.tree.known_versions.clone());
        Ok(Self {
            parser: Arc::new(LogParser::new(normalizer)),
            scanner,
            store,
            matcher,
            config,
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn store(&self) -> &FailureStore {
        &self.store
    }

    pub async fn run(&self, mode: &RunMode) -> WatchResult<FailureReport> {
        self.run_at(mode, Local::now().date_naive()).await
    }

    /// Run with an explicit "today" for the lookback window.
    pub async fn run_at(&self, mode: &RunMode, today: NaiveDate) -> WatchResult<FailureReport> {
        self.store.init_schema()?;

        let window_start = today - Duration::days(i64::from(self.config.lookback_days));
        let mut report = FailureReport::new(
            mode.report_mode(),
            &self.config.user_name,
            &self.config.suite_name,
            window_start,
            today,
        );

        for plan in self.plan(mode, today)? {
            info!(
                scope = %plan.scope,
                directories = plan.directories.len(),
                "processing scope"
            );
            let records = self.parse_directories(&plan.directories, &plan.scope).await;
            if let Err(e) = self.store.save(&records) {
                error!(scope = %plan.scope, error = %e, "failed to save records");
            }
            report.scopes.push(self.summarize(mode, plan, today).await);
        }

        info!(
            scopes = report.scopes.len(),
            failures = report.total_failures(),
            "report assembled"
        );
        Ok(report)
    }

    fn plan(&self, mode: &RunMode, today: NaiveDate) -> WatchResult<Vec<ScopePlan>> {
        match mode {
            RunMode::SingleDirectory(dir) => Ok(vec![ScopePlan {
                scope: RunScope::new(&self.config.version, &self.config.flavor),
                directories: vec![dir.clone()],
            }]),
            RunMode::Tree(root) => {
                let mut plans = Vec::new();
                for version in &self.config.tree.versions {
                    for flavor in &self.config.tree.flavors {
                        let criteria = self.config.criteria_for(version, flavor);
                        let mut directories: Vec<PathBuf> = self
                            .scanner
                            .scan_at(root, &criteria, today)?
                            .into_iter()
                            .map(|m| m.path)
                            .collect();
                        directories.sort();
                        plans.push(ScopePlan {
                            scope: RunScope::new(version, &flavor.name),
                            directories,
                        });
                    }
                }
                Ok(plans)
            }
        }
    }

    /// Parse each directory's log on a bounded worker pool. A failed unit is
    /// logged and skipped; its siblings keep running.
    async fn parse_directories(&self, dirs: &[PathBuf], scope: &RunScope) -> Vec<FailureRecord> {
        let sem = Arc::new(Semaphore::new(self.config.parallel.max(1)));
        let mut join_set = JoinSet::new();

        for dir in dirs {
            let permit = match sem.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let parser = self.parser.clone();
            let log_path = dir.join(&self.config.log_file_name);
            let scope = scope.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let text = tokio::fs::read_to_string(&log_path)
                    .await
                    .map_err(|source| WatchError::Io {
                        path: log_path.clone(),
                        source,
                    })?;
                let records = parser.parse_text(&log_path, &text, &scope);
                Ok::<_, WatchError>((log_path, records))
            });
        }

        let mut parsed = Vec::new();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(Ok(unit)) => parsed.push(unit),
                Ok(Err(e)) => warn!(error = %e, "skipping run directory"),
                Err(e) => error!(error = %e, "parse worker failed"),
            }
        }

        // Completion order is arbitrary; keep storage order stable.
        parsed.sort_by(|a, b| a.0.cmp(&b.0));
        parsed.into_iter().flat_map(|(_, records)| records).collect()
    }

    async fn summarize(
        &self,
        mode: &RunMode,
        plan: ScopePlan,
        today: NaiveDate,
    ) -> ScopeReport {
        let filter = self.stats_filter(mode, &plan.scope);
        let stats = match self
            .store
            .fetch_statistics_at(&filter, self.config.top_n, today)
        {
            Ok(stats) => stats,
            Err(e) => {
                error!(scope = %plan.scope, error = %e, "failed to aggregate failures");
                Vec::new()
            }
        };

        let mut top = Vec::with_capacity(stats.len());
        for (i, stat) in stats.into_iter().enumerate() {
            let issue = self.matcher.resolve(&stat.reason).await;
            let job_ids = match mode {
                RunMode::SingleDirectory(_) => {
                    match self.store.job_ids_for_at(&stat.reason, &filter, today) {
                        Ok(ids) => ids,
                        Err(e) => {
                            warn!(reason = %stat.reason, error = %e, "failed to list job ids");
                            Vec::new()
                        }
                    }
                }
                RunMode::Tree(_) => Vec::new(),
            };
            top.push(RankedReason {
                rank: i + 1,
                reason: stat.reason,
                count: stat.count,
                issue,
                job_ids,
            });
        }

        ScopeReport {
            version: plan.scope.version,
            flavor: plan.scope.flavor,
            directories: plan.directories.iter().map(|d| display(d)).collect(),
            top,
        }
    }

    /// Tree scopes are partitioned by version, flavor and the lookback
    /// window; a single-directory run aggregates the whole store.
    fn stats_filter(&self, mode: &RunMode, scope: &RunScope) -> StatsFilter {
        let filter = match mode {
            RunMode::SingleDirectory(_) => StatsFilter::default(),
            RunMode::Tree(_) => StatsFilter::scope(&scope.version, &scope.flavor)
                .with_since_days(self.config.lookback_days),
        };
        match self.config.reason_filter.as_deref().filter(|s| !s.is_empty()) {
            Some(needle) => filter.with_reason_substring(needle),
            None => filter,
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerConfig;

    fn pipeline(dir: &tempfile::TempDir, config: WatchConfig) -> Pipeline {
        let tracker =
            TrackerConfig::default().with_cache_path(dir.path().join("tracker_cache.json"));
        Pipeline::new(
            config,
            FailureStore::memory().unwrap(),
            Arc::new(TrackerMatcher::disabled(tracker)),
        )
        .unwrap()
    }

    #[test]
    fn run_mode_follows_bot_flag() {
        let cfg = WatchConfig {
            bot: true,
            log_directory: PathBuf::from("/runs"),
            ..WatchConfig::default()
        };
        assert_eq!(RunMode::from_config(&cfg), RunMode::Tree(PathBuf::from("/runs")));
    }

    #[test]
    fn single_mode_filter_is_unscoped() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            &dir,
            WatchConfig {
                reason_filter: Some("osd".into()),
                ..WatchConfig::default()
            },
        );
        let scope = RunScope::new("main", "default");
        let single = p.stats_filter(&RunMode::SingleDirectory(PathBuf::from("x")), &scope);
        assert_eq!(single.version, None);
        assert_eq!(single.reason_substring.as_deref(), Some("osd"));

        let tree = p.stats_filter(&RunMode::Tree(PathBuf::from("x")), &scope);
        assert_eq!(tree.version.as_deref(), Some("main"));
        assert_eq!(tree.since_days, Some(7));
    }

    #[tokio::test]
    async fn missing_log_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(&dir, WatchConfig::default());
        let report = p
            .run(&RunMode::SingleDirectory(dir.path().join("absent")))
            .await
            .unwrap();
        assert_eq!(report.scopes.len(), 1);
        assert!(report.scopes[0].top.is_empty());
    }

    #[tokio::test]
    async fn unreadable_store_yields_an_empty_scope() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("failures.db");
        let store = FailureStore::open(&db).unwrap();
        store.init_schema().unwrap();
        let tracker =
            TrackerConfig::default().with_cache_path(dir.path().join("tracker_cache.json"));
        let p = Pipeline::new(
            WatchConfig::default(),
            store,
            Arc::new(TrackerMatcher::disabled(tracker)),
        )
        .unwrap();

        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch("DROP TABLE failures")
            .unwrap();

        let plan = ScopePlan {
            scope: RunScope::new("main", "default"),
            directories: vec![dir.path().join("run")],
        };
        let today = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        let scope = p
            .summarize(&RunMode::SingleDirectory(dir.path().join("run")), plan, today)
            .await;
        assert_eq!(scope.version, "main");
        assert_eq!(scope.directories.len(), 1);
        assert!(scope.top.is_empty());
    }

    #[tokio::test]
    async fn parse_pool_collects_every_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut dirs = Vec::new();
        for i in 0..6 {
            let run = dir.path().join(format!("run{i}"));
            std::fs::create_dir(&run).unwrap();
            std::fs::write(
                run.join("scrape.log"),
                format!("Failure: reason {i}\n{}\n", 7000000 + i),
            )
            .unwrap();
            dirs.push(run);
        }
        let p = pipeline(
            &dir,
            WatchConfig {
                parallel: 2,
                ..WatchConfig::default()
            },
        );
        let records = p
            .parse_directories(&dirs, &RunScope::new("main", "default"))
            .await;
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].reason, "reason 0");
        assert_eq!(records[5].job_id, "7000005");
    }
}
