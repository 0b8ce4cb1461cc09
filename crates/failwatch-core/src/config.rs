//! Run configuration.
//!
//! Every path is an explicit value; nothing is resolved relative to the
//! binary or the source tree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::normalize::{NormalizeRules, ReasonTable};
use crate::scanner::{ScanCriteria, UserSelector};
use crate::tracker::TrackerConfig;

/// Build variant scanned in bot mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorProfile {
    pub name: String,
    /// Prepended to the suite name, e.g. `crimson-` for `crimson-rados`.
    #[serde(default)]
    pub suite_prefix: Option<String>,
    /// Accept runs from any user instead of the bot users.
    #[serde(default)]
    pub any_user: bool,
}

impl FlavorProfile {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suite_prefix: None,
            any_user: false,
        }
    }
}

/// The version x flavor matrix walked in bot mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub versions: Vec<String>,
    pub flavors: Vec<FlavorProfile>,
    pub bot_users: Vec<String>,
    /// Release tokens that disqualify a `main` candidate.
    pub known_versions: Vec<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            versions: owned(&["main", "reef", "squid", "tentacle"]),
            flavors: vec![
                FlavorProfile::plain("default"),
                FlavorProfile {
                    name: "crimson".to_string(),
                    suite_prefix: Some("crimson-".to_string()),
                    any_user: true,
                },
            ],
            bot_users: owned(&["teuthology", "bharath", "yuriw", "skanta"]),
            known_versions: owned(&["quincy", "reef", "squid", "tentacle"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub db_path: PathBuf,
    /// Root of the run directories (bot mode) or one run directory.
    pub log_directory: PathBuf,
    pub lookback_days: u32,
    pub user_name: String,
    pub suite_name: String,
    /// Version stamped on records in single-directory mode.
    pub version: String,
    pub branch: Option<String>,
    pub flavor: String,
    /// Only report reasons containing this text.
    pub reason_filter: Option<String>,
    pub top_n: usize,
    /// Size of the parse worker pool.
    pub parallel: usize,
    pub keep_db: bool,
    pub bot: bool,
    pub log_file_name: String,
    /// JSON `long -> short` table; the built-in table when unset.
    pub reason_table: Option<PathBuf>,
    pub normalize: NormalizeRules,
    pub tree: TreeConfig,
    pub tracker: TrackerConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("failures.db"),
            log_directory: PathBuf::from("."),
            lookback_days: 7,
            user_name: "teuthology".to_string(),
            suite_name: "rados".to_string(),
            version: "main".to_string(),
            branch: None,
            flavor: "default".to_string(),
            reason_filter: None,
            top_n: 10,
            parallel: 4,
            keep_db: false,
            bot: false,
            log_file_name: "scrape.log".to_string(),
            reason_table: None,
            normalize: NormalizeRules::default(),
            tree: TreeConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl WatchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };
        if self.suite_name.trim().is_empty() {
            return invalid("suite_name must not be empty");
        }
        if self.log_file_name.trim().is_empty() {
            return invalid("log_file_name must not be empty");
        }
        if self.parallel == 0 {
            return invalid("parallel must be at least 1");
        }
        if self.bot && (self.tree.versions.is_empty() || self.tree.flavors.is_empty()) {
            return invalid("bot mode needs at least one version and one flavor");
        }
        Ok(())
    }

    /// The reason table to inject into the normalizer.
    pub fn load_reason_table(&self) -> Result<ReasonTable, ConfigError> {
        match &self.reason_table {
            Some(path) => ReasonTable::load(path),
            None => Ok(ReasonTable::builtin()),
        }
    }

    /// Scanner criteria for one cell of the bot-mode matrix.
    pub fn criteria_for(&self, version: &str, flavor: &FlavorProfile) -> ScanCriteria {
        let suite = match &flavor.suite_prefix {
            Some(prefix) => format!("{}{}", prefix, self.suite_name),
            None => self.suite_name.clone(),
        };
        let users = if flavor.any_user {
            UserSelector::Any
        } else {
            match self.tree.bot_users.as_slice() {
                [] => UserSelector::Any,
                [one] => UserSelector::Single(one.clone()),
                many => UserSelector::AnyOf(many.to_vec()),
            }
        };
        ScanCriteria {
            users,
            suite,
            version: version.to_string(),
            branch: self.branch.clone(),
            flavor: flavor.name.clone(),
            lookback_days: self.lookback_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        WatchConfig::default().validate().unwrap();
    }

    #[test]
    fn yaml_overrides_selected_fields() {
        let cfg: WatchConfig = serde_yaml::from_str(
            r#"
lookback_days: 14
bot: true
tree:
  versions: [main]
  flavors:
    - name: default
tracker:
  url: https://tracker.example
  enabled: false
"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.lookback_days, 14);
        assert_eq!(cfg.tree.versions, vec!["main"]);
        assert_eq!(cfg.tree.flavors, vec![FlavorProfile::plain("default")]);
        assert_eq!(cfg.tree.bot_users.len(), 4);
        assert_eq!(cfg.tracker.url, "https://tracker.example");
        assert!(!cfg.tracker.enabled);
        assert_eq!(cfg.log_file_name, "scrape.log");
    }

    #[test]
    fn crimson_scans_prefixed_suite_for_any_user() {
        let cfg = WatchConfig::default();
        let crimson = cfg
            .tree
            .flavors
            .iter()
            .find(|f| f.name == "crimson")
            .unwrap();
        let c = cfg.criteria_for("main", crimson);
        assert_eq!(c.suite, "crimson-rados");
        assert_eq!(c.users, UserSelector::Any);

        let c = cfg.criteria_for("reef", &FlavorProfile::plain("default"));
        assert_eq!(c.suite, "rados");
        assert!(matches!(c.users, UserSelector::AnyOf(ref u) if u.len() == 4));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let cfg = WatchConfig {
            parallel: 0,
            ..WatchConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = WatchConfig::load(Path::new("/nonexistent/failwatch.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
