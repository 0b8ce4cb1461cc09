//! Schema for the failure store.

use rusqlite::Connection;

pub(crate) const DDL: &str = "
CREATE TABLE IF NOT EXISTS failures (
    id        INTEGER PRIMARY KEY,
    directory TEXT NOT NULL,
    version   TEXT NOT NULL,
    flavor    TEXT NOT NULL,
    date      TEXT NOT NULL,
    reason    TEXT NOT NULL CHECK (length(reason) > 0),
    job_id    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_failures_scope ON failures(version, flavor);
CREATE INDEX IF NOT EXISTS idx_failures_reason ON failures(reason);
";

pub(crate) fn init_impl(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DDL)
}
