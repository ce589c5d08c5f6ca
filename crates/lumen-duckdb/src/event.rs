//! Append-only event persistence.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use lumen_core::flatten::{flatten, DataKind};
use lumen_core::model::{
    truncate_chars, EventKind, WebsiteEvent, EVENT_NAME_LENGTH, PAGE_TITLE_LENGTH, URL_LENGTH,
};

use crate::backend::{format_ts, parse_ts, DuckDbBackend};

#[derive(Debug, Clone)]
pub struct SaveEvent {
    pub website_id: String,
    pub session_id: String,
    pub url_path: String,
    pub url_query: Option<String>,
    pub referrer_path: Option<String>,
    pub referrer_query: Option<String>,
    pub referrer_domain: Option<String>,
    pub page_title: Option<String>,
    pub event_name: Option<String>,
    /// Arbitrary-shaped payload of a custom event; flattened into typed
    /// `event_data` rows.
    pub event_data: Option<Value>,
    /// Overridable for backfill and tests; defaults to now.
    pub created_at: Option<DateTime<Utc>>,
}

/// Persist one event and, when present, its flattened payload rows — a
/// single transaction, so a malformed payload leaves no partial write.
///
/// String fields are silently truncated to their storage lengths, never
/// rejected.
pub async fn save_event(db: &DuckDbBackend, data: SaveEvent) -> Result<WebsiteEvent> {
    let kind = if data.event_name.is_some() {
        EventKind::CustomEvent
    } else {
        EventKind::Pageview
    };
    let event = WebsiteEvent {
        id: Uuid::new_v4().to_string(),
        website_id: data.website_id,
        session_id: data.session_id,
        url_path: truncate_chars(&data.url_path, URL_LENGTH),
        url_query: data.url_query.as_deref().map(|s| truncate_chars(s, URL_LENGTH)),
        referrer_path: data
            .referrer_path
            .as_deref()
            .map(|s| truncate_chars(s, URL_LENGTH)),
        referrer_query: data
            .referrer_query
            .as_deref()
            .map(|s| truncate_chars(s, URL_LENGTH)),
        referrer_domain: data
            .referrer_domain
            .as_deref()
            .map(|s| truncate_chars(s, URL_LENGTH)),
        page_title: data
            .page_title
            .as_deref()
            .map(|s| truncate_chars(s, PAGE_TITLE_LENGTH)),
        event_type: kind.code(),
        event_name: data
            .event_name
            .as_deref()
            .map(|s| truncate_chars(s, EVENT_NAME_LENGTH)),
        created_at: data.created_at.unwrap_or_else(Utc::now),
    };

    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO website_event (event_id, website_id, session_id, url_path, url_query, \
         referrer_path, referrer_query, referrer_domain, page_title, event_type, event_name, \
         created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        duckdb::params![
            event.id,
            event.website_id,
            event.session_id,
            event.url_path,
            event.url_query,
            event.referrer_path,
            event.referrer_query,
            event.referrer_domain,
            event.page_title,
            event.event_type,
            event.event_name,
            format_ts(event.created_at),
        ],
    )?;

    if let Some(payload) = &data.event_data {
        for field in flatten(payload) {
            let string_value = match field.kind {
                DataKind::String | DataKind::Boolean | DataKind::Array => {
                    Some(field.value.clone())
                }
                _ => None,
            };
            tx.execute(
                "INSERT INTO event_data (event_data_id, website_event_id, website_id, event_key, \
                 event_data_type, event_string_value, event_numeric_value, event_date_value) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                duckdb::params![
                    Uuid::new_v4().to_string(),
                    event.id,
                    event.website_id,
                    field.key,
                    field.kind.code(),
                    string_value,
                    field.numeric,
                    field.date.map(format_ts),
                ],
            )?;
        }
    }

    tx.commit()?;
    Ok(event)
}

fn map_event(row: &duckdb::Row<'_>) -> duckdb::Result<WebsiteEvent> {
    Ok(WebsiteEvent {
        id: row.get(0)?,
        website_id: row.get(1)?,
        session_id: row.get(2)?,
        url_path: row.get(3)?,
        url_query: row.get(4)?,
        referrer_path: row.get(5)?,
        referrer_query: row.get(6)?,
        referrer_domain: row.get(7)?,
        page_title: row.get(8)?,
        event_type: row.get(9)?,
        event_name: row.get(10)?,
        created_at: parse_ts(&row.get::<_, String>(11)?),
    })
}

/// Events of one kind created at or after `cutoff` (inclusive), newest first.
pub async fn events_since(
    db: &DuckDbBackend,
    website_id: &str,
    kind: EventKind,
    cutoff: DateTime<Utc>,
) -> Result<Vec<WebsiteEvent>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(
        "SELECT event_id, website_id, session_id, url_path, url_query, referrer_path, \
         referrer_query, referrer_domain, page_title, event_type, event_name, \
         CAST(created_at AS VARCHAR) \
         FROM website_event \
         WHERE website_id = ?1 AND event_type = ?2 AND created_at >= ?3 \
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(
        duckdb::params![website_id, kind.code(), format_ts(cutoff)],
        map_event,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
