pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use queries::StatusUpdate;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Like [`with_conn`](Self::with_conn) but hands out a mutable
    /// connection so the closure can open a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// Fixed-width RFC 3339 so that text order equals time order in SQL.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime() yields "YYYY-MM-DD HH:MM:SS" without a zone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| anyhow::anyhow!("invalid timestamp '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert!(format_timestamp(&a) < format_timestamp(&b));
        assert_eq!(parse_timestamp(&format_timestamp(&b)).unwrap(), b);
    }

    #[test]
    fn parses_sqlite_datetime() {
        let ts = parse_timestamp("2026-03-04 05:06:07").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap());
    }
}
