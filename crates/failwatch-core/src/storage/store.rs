use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use tracing::{debug, warn};

use super::schema;
use super::stats::{where_clause, ReasonCount, StatsFilter};
use crate::error::{StoreError, StoreResult};
use crate::model::FailureRecord;

/// Outcome of [`FailureStore::save`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub dropped: usize,
}

/// Append-only failure table over a single SQLite connection.
///
/// Writers from several workers share one connection through the mutex.
/// Ingestion is not idempotent: saving the same records twice counts them twice.
#[derive(Clone)]
pub struct FailureStore {
    conn: Arc<Mutex<Connection>>,
    ready: Arc<AtomicBool>,
}

impl FailureStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "opened failure store");
        Ok(Self::from_connection(conn))
    }

    pub fn memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the table if needed and mark the store ready.
    pub fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock();
        schema::init_impl(&conn)?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Append every record. A failing insert is logged and only that record is dropped.
    pub fn save(&self, records: &[FailureRecord]) -> StoreResult<SaveSummary> {
        self.ensure_ready()?;
        let mut conn = self.lock();
        let mut tx = conn.transaction()?;
        let mut summary = SaveSummary::default();

        for rec in records {
            let sp = tx.savepoint()?;
            let res = sp.execute(
                "INSERT INTO failures (directory, version, flavor, date, reason, job_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    rec.directory,
                    rec.version,
                    rec.flavor,
                    rec.date,
                    rec.reason,
                    rec.job_id
                ],
            );
            match res {
                Ok(_) => {
                    sp.commit()?;
                    summary.inserted += 1;
                }
                Err(e) => {
                    // dropping the savepoint rolls back this record only
                    warn!(
                        error = %e,
                        directory = %rec.directory,
                        job_id = %rec.job_id,
                        "dropping failure record"
                    );
                    summary.dropped += 1;
                }
            }
        }

        tx.commit()?;
        debug!(
            inserted = summary.inserted,
            dropped = summary.dropped,
            "saved failure records"
        );
        Ok(summary)
    }

    /// Top reasons by count, descending; ties ordered by reason.
    pub fn fetch_statistics(
        &self,
        filter: &StatsFilter,
        top_n: usize,
    ) -> StoreResult<Vec<ReasonCount>> {
        self.fetch_statistics_at(filter, top_n, Local::now().date_naive())
    }

    /// As [`Self::fetch_statistics`], evaluating `since_days` against `today`.
    pub fn fetch_statistics_at(
        &self,
        filter: &StatsFilter,
        top_n: usize,
        today: NaiveDate,
    ) -> StoreResult<Vec<ReasonCount>> {
        self.ensure_ready()?;
        let (where_sql, mut params) = where_clause(filter, today);
        let sql = format!(
            "SELECT reason, COUNT(*) AS n FROM failures {where_sql} \
             GROUP BY reason ORDER BY n DESC, reason ASC LIMIT ?"
        );
        params.push(Value::Integer(i64::try_from(top_n).unwrap_or(i64::MAX)));
        debug!(query = %sql, "fetching statistics");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            Ok(ReasonCount {
                reason: row.get(0)?,
                count: row.get::<_, i64>(1)?.max(0) as u64,
            })
        })?;
        let out = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(out)
    }

    /// Job ids recorded for `reason`, in insertion order.
    pub fn job_ids_for(&self, reason: &str, filter: &StatsFilter) -> StoreResult<Vec<String>> {
        self.job_ids_for_at(reason, filter, Local::now().date_naive())
    }

    /// As [`Self::job_ids_for`], evaluating `since_days` against `today`.
    pub fn job_ids_for_at(
        &self,
        reason: &str,
        filter: &StatsFilter,
        today: NaiveDate,
    ) -> StoreResult<Vec<String>> {
        self.ensure_ready()?;
        let (where_sql, mut params) = where_clause(filter, today);
        let where_sql = if where_sql.is_empty() {
            "WHERE reason = ?".to_string()
        } else {
            format!("{where_sql} AND reason = ?")
        };
        params.push(Value::Text(reason.to_string()));

        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT job_id FROM failures {where_sql} ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get(0))?;
        let out = rows.collect::<Result<Vec<String>, _>>()?;
        Ok(out)
    }

    pub fn record_count(&self) -> StoreResult<u64> {
        self.ensure_ready()?;
        let conn = self.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM failures", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    fn ensure_ready(&self) -> StoreResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FailureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureStore")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(reason: &str, job: &str) -> FailureRecord {
        FailureRecord {
            directory: "/logs/run".to_string(),
            date: "2025-05-20".to_string(),
            reason: reason.to_string(),
            job_id: job.to_string(),
            version: "main".to_string(),
            flavor: "default".to_string(),
        }
    }

    #[test]
    fn save_before_init_is_an_error() {
        let store = FailureStore::memory().unwrap();
        assert!(matches!(
            store.save(&[rec("a", "1")]),
            Err(StoreError::NotInitialized)
        ));
        assert!(matches!(
            store.fetch_statistics(&StatsFilter::default(), 10),
            Err(StoreError::NotInitialized)
        ));
    }

    #[test]
    fn bad_record_does_not_block_the_rest() {
        let store = FailureStore::memory().unwrap();
        store.init_schema().unwrap();

        // empty reason violates the CHECK constraint
        let summary = store
            .save(&[rec("a", "1"), rec("", "2"), rec("b", "3")])
            .unwrap();
        assert_eq!(summary, SaveSummary { inserted: 2, dropped: 1 });
        assert_eq!(store.record_count().unwrap(), 2);
    }

    #[test]
    fn zero_top_n_returns_nothing() {
        let store = FailureStore::memory().unwrap();
        store.init_schema().unwrap();
        store.save(&[rec("a", "1")]).unwrap();
        assert!(store
            .fetch_statistics(&StatsFilter::default(), 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn job_ids_follow_insertion_order() {
        let store = FailureStore::memory().unwrap();
        store.init_schema().unwrap();
        store
            .save(&[rec("a", "9000002"), rec("b", "9000003"), rec("a", "9000001")])
            .unwrap();
        let ids = store.job_ids_for("a", &StatsFilter::default()).unwrap();
        assert_eq!(ids, vec!["9000002", "9000001"]);
    }

    #[test]
    fn job_ids_window_uses_the_given_day() {
        let store = FailureStore::memory().unwrap();
        store.init_schema().unwrap();
        let mut old = rec("a", "9000001");
        old.date = "2025-05-01".to_string();
        let mut recent = rec("a", "9000002");
        recent.date = "2025-05-09".to_string();
        store.save(&[old, recent]).unwrap();

        let filter = StatsFilter::default().with_since_days(7);
        let day = |d| NaiveDate::from_ymd_opt(2025, 5, d).unwrap();
        assert_eq!(
            store.job_ids_for_at("a", &filter, day(10)).unwrap(),
            vec!["9000002"]
        );
        assert_eq!(
            store.job_ids_for_at("a", &filter, day(8)).unwrap(),
            vec!["9000001", "9000002"]
        );
    }
}
