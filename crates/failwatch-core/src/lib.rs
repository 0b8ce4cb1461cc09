//! Failure classification and aggregation for CI run logs.
//!
//! This crate turns a tree of run directories into a ranked failure report:
//!
//! - Directory selection by user, suite, version, flavor and date window
//! - Log parsing into canonical failure reasons with job ids
//! - A SQLite failure store with scoped top-N aggregation
//! - Fuzzy matching of reasons against open tracker issues, with a JSON cache
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use failwatch_core::{FailureStore, Pipeline, RunMode, TrackerMatcher, WatchConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = WatchConfig::load("failwatch.yaml".as_ref())?;
//! let store = FailureStore::open(&config.db_path)?;
//! let matcher = Arc::new(TrackerMatcher::from_config(config.tracker.clone())?);
//! let mode = RunMode::from_config(&config);
//!
//! let report = Pipeline::new(config, store, matcher)?.run(&mode).await?;
//! println!("{}", report.render_text());
//! # Ok(())
//! # }
//! ```
//!
//! # Tracker configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `FAILWATCH_TRACKER_URL` | Tracker base URL (default: `https://tracker.ceph.com`) |
//! | `FAILWATCH_TRACKER_PROJECT` | Restrict searches to one project |
//! | `FAILWATCH_TRACKER_API_KEY` | Redmine API key |
//! | `FAILWATCH_TRACKER_USERNAME` / `FAILWATCH_TRACKER_PASSWORD` | Basic auth when no key is set |
//! | `FAILWATCH_TRACKER_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `FAILWATCH_TRACKER_CACHE` | Cache file path (default: `tracker_cache.json`) |

pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod storage;
pub mod tracker;

pub use config::{FlavorProfile, TreeConfig, WatchConfig};
pub use error::{ConfigError, StoreError, TrackerError, WatchError, WatchResult};
pub use model::{DirectoryMatch, FailureRecord, RunScope, TrackerMatch};
pub use normalize::{NormalizeRules, ReasonNormalizer, ReasonTable};
pub use parser::LogParser;
pub use pipeline::{Pipeline, RunMode};
pub use report::{FailureReport, RankedReason, ReportMode, ScopeReport};
pub use scanner::{DirectoryScanner, ScanCriteria, UserSelector};
pub use storage::{FailureStore, ReasonCount, SaveSummary, StatsFilter};
pub use tracker::{TrackerConfig, TrackerMatcher};
