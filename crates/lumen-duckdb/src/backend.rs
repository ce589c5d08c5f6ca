use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use lumen_core::filters::ParamValue;

use crate::schema::INIT_SQL;

/// Storage-layer failures, classified once at the boundary so callers can
/// match on error kinds instead of message text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. For session creation this
    /// means a concurrent request already inserted the same deterministic ID.
    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Db(duckdb::Error),
}

impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        let msg = e.to_string();
        let lowered = msg.to_lowercase();
        if lowered.contains("violates primary key constraint")
            || lowered.contains("violates unique constraint")
            || lowered.contains("duplicate key")
        {
            StoreError::UniqueViolation(msg)
        } else {
            StoreError::Db(e)
        }
    }
}

/// The primary store.
///
/// DuckDB is single-writer: the connection lives behind `Arc<Mutex<_>>` so
/// the async runtime serialises access while handlers share the backend
/// cheaply. Session-creation races are resolved by the `session_id` primary
/// key, not by application locking.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) the database file at `path` and run schema bootstrap.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(INIT_SQL)?;
        info!(path, "duckdb opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Intended for tests — data is discarded
    /// when the backend is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(INIT_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Direct connection access for test fixtures.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Convert structured parameter values into DuckDB bindings.
pub(crate) fn to_sql_params(values: &[ParamValue]) -> Vec<Box<dyn duckdb::types::ToSql>> {
    values
        .iter()
        .map(|v| -> Box<dyn duckdb::types::ToSql> {
            match v {
                ParamValue::Text(s) => Box::new(s.clone()),
                ParamValue::Int(i) => Box::new(*i),
                ParamValue::Float(f) => Box::new(*f),
                ParamValue::Timestamp(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

/// Timestamp wire format used for every TIMESTAMP bind and read.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().map(parse_ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 10, 30, 0).unwrap();
        assert_eq!(parse_ts(&format_ts(dt)), dt);
    }

    #[test]
    fn parses_without_fraction() {
        let dt = parse_ts("2024-01-02 10:30:00");
        assert_eq!(format_ts(dt), "2024-01-02 10:30:00");
    }
}
