//! Session repository.
//!
//! Session rows are created once per identity tuple per salt window and are
//! never updated. A concurrent create of the same deterministic ID loses to
//! the primary key, which [`get_or_create_session`] treats as success.

use anyhow::Result;
use chrono::{DateTime, Utc};

use lumen_core::cache::{session_key, CacheStore};
use lumen_core::model::Session;

use crate::backend::{format_ts, parse_ts, DuckDbBackend, StoreError};

const SESSION_COLUMNS: &str = "session_id, website_id, hostname, browser, os, device, screen, \
     language, country, subdivision1, subdivision2, city, CAST(created_at AS VARCHAR)";

#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub website_id: String,
    pub hostname: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub screen: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    /// Raw region code; composited with the country at insert time.
    pub subdivision1: Option<String>,
    pub subdivision2: Option<String>,
    pub city: Option<String>,
}

fn map_session(row: &duckdb::Row<'_>) -> duckdb::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        website_id: row.get(1)?,
        hostname: row.get(2)?,
        browser: row.get(3)?,
        os: row.get(4)?,
        device: row.get(5)?,
        screen: row.get(6)?,
        language: row.get(7)?,
        country: row.get(8)?,
        subdivision1: row.get(9)?,
        subdivision2: row.get(10)?,
        city: row.get(11)?,
        created_at: parse_ts(&row.get::<_, String>(12)?),
    })
}

pub async fn get_session(db: &DuckDbBackend, id: &str) -> Result<Option<Session>> {
    let conn = db.conn.lock().await;
    let result = conn
        .prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE session_id = ?1"
        ))?
        .query_row(duckdb::params![id], map_session);
    match result {
        Ok(session) => Ok(Some(session)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Cache-aside session lookup.
pub async fn load_session(
    db: &DuckDbBackend,
    cache: &CacheStore,
    id: &str,
) -> Result<Option<Session>> {
    cache.fetch(&session_key(id), || get_session(db, id)).await
}

/// Insert a session row. `subdivision1` is stored as `"{country}-{region}"`
/// when both are known, so region codes cannot collide across countries.
pub async fn create_session(db: &DuckDbBackend, data: &NewSession) -> Result<Session, StoreError> {
    let subdivision1 = match (&data.country, &data.subdivision1) {
        (Some(country), Some(region)) => Some(format!("{country}-{region}")),
        _ => None,
    };
    let session = Session {
        id: data.id.clone(),
        website_id: data.website_id.clone(),
        hostname: data.hostname.clone(),
        browser: data.browser.clone(),
        os: data.os.clone(),
        device: data.device.clone(),
        screen: data.screen.clone(),
        language: data.language.clone(),
        country: data.country.clone(),
        subdivision1,
        subdivision2: data.subdivision2.clone(),
        city: data.city.clone(),
        created_at: Utc::now(),
    };

    let conn = db.conn.lock().await;
    conn.execute(
        "INSERT INTO session (session_id, website_id, hostname, browser, os, device, screen, \
         language, country, subdivision1, subdivision2, city, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        duckdb::params![
            session.id,
            session.website_id,
            session.hostname,
            session.browser,
            session.os,
            session.device,
            session.screen,
            session.language,
            session.country,
            session.subdivision1,
            session.subdivision2,
            session.city,
            format_ts(session.created_at),
        ],
    )?;
    Ok(session)
}

/// Return the session for `data.id`, creating it if absent.
///
/// Idempotent: repeat beacons with the same identity tuple within one salt
/// window resolve to the same stored row. If creation races and another
/// request wins the uniqueness constraint, that specific failure is swallowed
/// and the winner's row is returned; any other creation error propagates.
pub async fn get_or_create_session(
    db: &DuckDbBackend,
    cache: &CacheStore,
    data: &NewSession,
) -> Result<Session> {
    if let Some(existing) = load_session(db, cache, &data.id).await? {
        return Ok(existing);
    }

    match create_session(db, data).await {
        Ok(session) => Ok(session),
        Err(StoreError::UniqueViolation(_)) => {
            // Another concurrent beacon inserted the row first.
            get_session(db, &data.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("session {} vanished after duplicate create", data.id))
        }
        Err(e) => Err(e.into()),
    }
}

/// Sessions created at or after `cutoff` (inclusive), for the realtime feed.
pub async fn sessions_since(
    db: &DuckDbBackend,
    website_id: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Session>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM session \
         WHERE website_id = ?1 AND created_at >= ?2 \
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(duckdb::params![website_id, format_ts(cutoff)], map_session)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
