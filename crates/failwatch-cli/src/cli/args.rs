use std::path::PathBuf;

use clap::Parser;
use failwatch_core::WatchConfig;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "failwatch",
    about = "Rank CI failure reasons across run directories and link them to tracker issues"
)]
pub struct Cli {
    /// YAML config file; flags below override its values
    #[arg(long, env = "FAILWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database for failure records
    #[arg(long, env = "FAILWATCH_DB")]
    pub db: Option<PathBuf>,

    /// Run directory (single mode) or root of run directories (--bot)
    #[arg(long, env = "FAILWATCH_LOG_DIRECTORY")]
    pub log_directory: Option<PathBuf>,

    /// Lookback window in days
    #[arg(long)]
    pub days: Option<u32>,

    #[arg(long)]
    pub user_name: Option<String>,

    #[arg(long)]
    pub suite_name: Option<String>,

    /// Release line stamped on records in single mode (not the program version)
    #[arg(long)]
    pub version: Option<String>,

    /// Only scan directories whose name carries this branch token
    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub flavor: Option<String>,

    /// Only report reasons containing this text
    #[arg(long)]
    pub error_message: Option<String>,

    #[arg(long)]
    pub top_n: Option<usize>,

    /// Log files parsed concurrently
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Keep the database after the report is produced
    #[arg(long)]
    pub keep_db: bool,

    /// Scan every configured version x flavor under --log-directory
    #[arg(long)]
    pub bot: bool,

    /// JSON `long -> short` reason table
    #[arg(long)]
    pub reason_table: Option<PathBuf>,

    /// Also write the report as JSON
    #[arg(long)]
    pub json_out: Option<PathBuf>,

    #[arg(long)]
    pub tracker_url: Option<String>,

    #[arg(long)]
    pub tracker_cache: Option<PathBuf>,

    /// Resolve reasons from the tracker cache only
    #[arg(long)]
    pub no_tracker: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlay explicitly given flags on `cfg`.
    pub fn apply(&self, cfg: &mut WatchConfig) {
        if let Some(v) = &self.db {
            cfg.db_path = v.clone();
        }
        if let Some(v) = &self.log_directory {
            cfg.log_directory = v.clone();
        }
        if let Some(v) = self.days {
            cfg.lookback_days = v;
        }
        if let Some(v) = &self.user_name {
            cfg.user_name = v.clone();
        }
        if let Some(v) = &self.suite_name {
            cfg.suite_name = v.clone();
        }
        if let Some(v) = &self.version {
            cfg.version = v.clone();
        }
        if let Some(v) = &self.branch {
            cfg.branch = Some(v.clone());
        }
        if let Some(v) = &self.flavor {
            cfg.flavor = v.clone();
        }
        if let Some(v) = &self.error_message {
            cfg.reason_filter = Some(v.clone());
        }
        if let Some(v) = self.top_n {
            cfg.top_n = v;
        }
        if let Some(v) = self.parallel {
            cfg.parallel = v;
        }
        if let Some(v) = &self.reason_table {
            cfg.reason_table = Some(v.clone());
        }
        if let Some(v) = &self.tracker_url {
            cfg.tracker.url = v.clone();
        }
        if let Some(v) = &self.tracker_cache {
            cfg.tracker.cache_path = v.clone();
        }
        cfg.keep_db |= self.keep_db;
        cfg.bot |= self.bot;
        if self.no_tracker {
            cfg.tracker.enabled = false;
        }
    }
}
