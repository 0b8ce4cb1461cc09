//! Run directory discovery.
//!
//! Run directories are named
//! `<user>-<YYYY-MM-DD>_<HH:MM:SS>-<suite>[-...]<version-segment>-distro-<flavor>-smithi`.
//! The `main` line carries no version token, so a `main` candidate is
//! rejected when its name mentions any other known release.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Duration, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::ConfigError;
use crate::model::DirectoryMatch;

const DATE_FMT: &str = "%Y-%m-%d";

/// Release line with its own naming grammar.
pub const MAIN_VERSION: &str = "main";

/// Which directory owners are in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSelector {
    Single(String),
    AnyOf(Vec<String>),
    Any,
}

impl UserSelector {
    /// Regex fragment matching the user part of a directory name.
    pub fn pattern(&self) -> String {
        match self {
            Self::Single(name) => regex::escape(name),
            Self::AnyOf(names) if names.iter().any(|n| n == "*") => Self::Any.pattern(),
            Self::AnyOf(names) => {
                let alts: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
                format!("(?:{})", alts.join("|"))
            }
            Self::Any => "[^-]+".to_string(),
        }
    }
}

impl FromStr for UserSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::Any);
        }
        let names: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        match names.len() {
            0 => Err(ConfigError::Invalid {
                message: "user selector must name at least one user or '*'".to_string(),
            }),
            1 if names[0] == "*" => Ok(Self::Any),
            1 => Ok(Self::Single(names.into_iter().next().unwrap_or_default())),
            _ => Ok(Self::AnyOf(names)),
        }
    }
}

impl std::fmt::Display for UserSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(name) => f.write_str(name),
            Self::AnyOf(names) => f.write_str(&names.join(",")),
            Self::Any => f.write_str("*"),
        }
    }
}

/// Selection criteria for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCriteria {
    pub users: UserSelector,
    pub suite: String,
    pub version: String,
    /// When set, `-<branch>` must appear among the extra tokens.
    pub branch: Option<String>,
    pub flavor: String,
    pub lookback_days: u32,
}

/// Compiled form of [`ScanCriteria`].
#[derive(Debug)]
struct NameGrammar {
    regex: Regex,
    is_main: bool,
}

impl NameGrammar {
    fn compile(criteria: &ScanCriteria) -> Result<Self, ConfigError> {
        let users = criteria.users.pattern();
        let suite = regex::escape(&criteria.suite);
        let flavor = regex::escape(&criteria.flavor);
        let is_main = criteria.version == MAIN_VERSION;

        let version_segment = if is_main {
            String::new()
        } else {
            format!("-{}", regex::escape(&criteria.version))
        };

        let pattern = format!(
            r"^(?P<user>{users})-(?P<date>[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}})_[0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}-(?P<suite>{suite})(?P<extra>(?:-[^-]+)*){version_segment}(?:-release)?-distro-{flavor}-smithi$"
        );
        debug!(pattern = %pattern, "compiled directory grammar");

        let regex = Regex::new(&pattern).map_err(|e| ConfigError::Invalid {
            message: format!("directory pattern: {e}"),
        })?;
        Ok(Self { regex, is_main })
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    known_versions: Vec<String>,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new(
            ["quincy", "reef", "squid", "tentacle"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

impl DirectoryScanner {
    /// `known_versions` are the release tokens that disqualify a `main` candidate.
    pub fn new(known_versions: Vec<String>) -> Self {
        Self { known_versions }
    }

    pub fn scan(
        &self,
        root: &Path,
        criteria: &ScanCriteria,
    ) -> Result<Vec<DirectoryMatch>, ConfigError> {
        self.scan_at(root, criteria, Local::now().date_naive())
    }

    /// Scan `root` with an explicit "today" for the lookback cutoff.
    pub fn scan_at(
        &self,
        root: &Path,
        criteria: &ScanCriteria,
        today: NaiveDate,
    ) -> Result<Vec<DirectoryMatch>, ConfigError> {
        let grammar = NameGrammar::compile(criteria)?;
        let cutoff = today - Duration::days(i64::from(criteria.lookback_days));

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                error!(root = %root.display(), error = %e, "log directory not readable");
                return Ok(Vec::new());
            }
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(found) = self.match_name(&name, &grammar, criteria, cutoff) {
                out.push(DirectoryMatch {
                    path: entry.path(),
                    ..found
                });
            }
        }
        Ok(out)
    }

    /// Apply grammar, disambiguation and the date cutoff to one name.
    fn match_name(
        &self,
        name: &str,
        grammar: &NameGrammar,
        criteria: &ScanCriteria,
        cutoff: NaiveDate,
    ) -> Option<DirectoryMatch> {
        let Some(caps) = grammar.regex.captures(name) else {
            debug!(name, "skipping: name does not match grammar");
            return None;
        };

        if grammar.is_main && self.mentions_other_version(name) {
            debug!(name, "skipping: names another release (main mode)");
            return None;
        }

        if let Some(branch) = criteria.branch.as_deref() {
            let extra = format!("{}-", caps.name("extra").map_or("", |m| m.as_str()));
            if !extra.contains(&format!("-{branch}-")) {
                debug!(name, branch, "skipping: branch token absent");
                return None;
            }
        }

        let date_str = &caps["date"];
        let date = match NaiveDate::parse_from_str(date_str, DATE_FMT) {
            Ok(d) => d,
            Err(_) => {
                debug!(name, date = date_str, "skipping: bad date");
                return None;
            }
        };
        if date < cutoff {
            return None;
        }

        debug!(name, "accepting directory");
        Some(DirectoryMatch {
            path: PathBuf::from(name),
            date,
            user: caps["user"].to_string(),
            suite: caps["suite"].to_string(),
            version: criteria.version.clone(),
            flavor: criteria.flavor.clone(),
        })
    }

    fn mentions_other_version(&self, name: &str) -> bool {
        let before_distro = name.split("-distro-").next().unwrap_or(name);
        before_distro.split('-').any(|tok| {
            tok != MAIN_VERSION && self.known_versions.iter().any(|v| v == tok)
        })
    }
}
