//! Aggregate query building.

use chrono::{Duration, NaiveDate};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::model::UNKNOWN;

/// Predicates for [`super::FailureStore::fetch_statistics`]; all set fields are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsFilter {
    pub version: Option<String>,
    pub flavor: Option<String>,
    pub since_days: Option<u32>,
    pub reason_substring: Option<String>,
}

impl StatsFilter {
    pub fn scope(version: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            flavor: Some(flavor.into()),
            ..Self::default()
        }
    }

    pub fn with_since_days(mut self, days: u32) -> Self {
        self.since_days = Some(days);
        self
    }

    pub fn with_reason_substring(mut self, needle: impl Into<String>) -> Self {
        self.reason_substring = Some(needle.into());
        self
    }
}

/// One row of an aggregate: reason and its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: u64,
}

/// `WHERE` clause and its positional parameters.
pub(crate) fn where_clause(filter: &StatsFilter, today: NaiveDate) -> (String, Vec<Value>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(v) = filter.version.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("version = ?");
        params.push(Value::Text(v.to_string()));
    }
    if let Some(f) = filter.flavor.as_deref().filter(|f| !f.is_empty()) {
        clauses.push("flavor = ?");
        params.push(Value::Text(f.to_string()));
    }
    if let Some(days) = filter.since_days {
        let cutoff = today - Duration::days(i64::from(days));
        // ISO dates order lexicographically; `unknown` never falls inside a window.
        clauses.push("date != ? AND date >= ?");
        params.push(Value::Text(UNKNOWN.to_string()));
        params.push(Value::Text(cutoff.format("%Y-%m-%d").to_string()));
    }
    if let Some(needle) = filter.reason_substring.as_deref().filter(|n| !n.is_empty()) {
        clauses.push("instr(reason, ?) > 0");
        params.push(Value::Text(needle.to_string()));
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_no_where() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 25).unwrap();
        let (sql, params) = where_clause(&StatsFilter::default(), today);
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn predicates_are_anded_in_order() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 25).unwrap();
        let filter = StatsFilter::scope("main", "default")
            .with_since_days(7)
            .with_reason_substring("osd");
        let (sql, params) = where_clause(&filter, today);
        assert_eq!(
            sql,
            "WHERE version = ? AND flavor = ? AND date != ? AND date >= ? AND instr(reason, ?) > 0"
        );
        assert_eq!(params.len(), 5);
        assert_eq!(params[3], Value::Text("2025-05-18".to_string()));
    }
}
