//! Reason canonicalization.
//!
//! Raw failure text carries incidental identifiers (test node names, build
//! refs) that would otherwise split one failure into many aggregation
//! buckets. [`ReasonNormalizer::normalize`] erases them and
//! [`ReasonNormalizer::convert`] maps known long messages to short labels.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const BUILTIN_TABLE: &str = include_str!("../resources/reason_table.json");

/// Immutable `long message -> short label` lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonTable {
    entries: HashMap<String, String>,
}

impl ReasonTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Table embedded in the crate.
    pub fn builtin() -> Self {
        // The embedded resource is checked by `builtin_table_parses`.
        serde_json::from_str(BUILTIN_TABLE).unwrap_or_default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn get(&self, long: &str) -> Option<&str> {
        self.entries.get(long).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Token shapes erased by [`ReasonNormalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeRules {
    /// Host identifiers are `<host_prefix><digits>`.
    pub host_prefix: String,
    /// Content-addressed refs are `<ref_key>=<hex>`.
    pub ref_key: String,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self {
            host_prefix: "smithi".to_string(),
            ref_key: "CEPH_REF".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReasonNormalizer {
    table: Arc<ReasonTable>,
    host_re: Regex,
    host_placeholder: String,
    ref_re: Regex,
    ref_placeholder: String,
}

impl ReasonNormalizer {
    pub fn new(table: Arc<ReasonTable>) -> Self {
        Self::with_rules(table, &NormalizeRules::default())
    }

    pub fn with_rules(table: Arc<ReasonTable>, rules: &NormalizeRules) -> Self {
        let host = regex::escape(&rules.host_prefix);
        let key = regex::escape(&rules.ref_key);
        Self {
            table,
            // Escaped literals followed by fixed classes always compile.
            host_re: Regex::new(&format!("{host}[0-9]+")).expect("host pattern"),
            host_placeholder: format!("{}000", rules.host_prefix),
            ref_re: Regex::new(&format!("{key}=[a-f0-9]+")).expect("ref pattern"),
            ref_placeholder: format!("{}=XXXXXXXXXXXXXXXXXX", rules.ref_key),
        }
    }

    /// Replace host identifiers and content refs with fixed placeholders.
    pub fn normalize(&self, raw: &str) -> String {
        let s = self
            .host_re
            .replace_all(raw, regex::NoExpand(&self.host_placeholder));
        self.ref_re
            .replace_all(&s, regex::NoExpand(&self.ref_placeholder))
            .into_owned()
    }

    /// Map a normalized message to its short label; unknown text passes through.
    pub fn convert(&self, normalized: &str) -> String {
        match self.table.get(normalized) {
            Some(short) => short.to_string(),
            None => normalized.to_string(),
        }
    }

    /// `convert(normalize(raw))`.
    pub fn canonical(&self, raw: &str) -> String {
        self.convert(&self.normalize(raw))
    }

    pub fn table(&self) -> &ReasonTable {
        &self.table
    }
}
