//! Live activity feed: recent pageviews, sessions, and custom events.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use lumen_core::identity::digest;
use lumen_core::model::{EventKind, Session, WebsiteEvent};

use crate::backend::{format_ts, DuckDbBackend};
use crate::event::events_since;
use crate::session::sessions_since;

/// How far back the realtime feed reaches, in minutes.
pub const REALTIME_RANGE_MINUTES: i64 = 30;

/// A feed record wrapped with a stable dedup ID and millisecond timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeItem<T> {
    #[serde(rename = "__id")]
    pub id: String,
    #[serde(rename = "__type")]
    pub item_type: &'static str,
    pub timestamp: i64,
    #[serde(flatten)]
    pub record: T,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSnapshot {
    pub pageviews: Vec<RealtimeItem<WebsiteEvent>>,
    pub sessions: Vec<RealtimeItem<Session>>,
    pub events: Vec<RealtimeItem<WebsiteEvent>>,
    /// Server time of the snapshot, for the client's next incremental poll.
    pub timestamp: i64,
}

/// Clamp a client-supplied `at` cursor to the feed's maximum reach.
///
/// The cutoff itself is inclusive: a record created exactly at the boundary
/// is part of the feed.
pub fn realtime_cutoff(now: DateTime<Utc>, at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let floor = now - Duration::minutes(REALTIME_RANGE_MINUTES);
    match at {
        Some(at) if at > floor => at,
        _ => floor,
    }
}

fn decorate<T>(
    kind: &'static str,
    record_id: &str,
    created_at: DateTime<Utc>,
    record: T,
) -> RealtimeItem<T> {
    RealtimeItem {
        id: digest(&[kind, record_id, &format_ts(created_at)]),
        item_type: kind,
        timestamp: created_at.timestamp_millis(),
        record,
    }
}

/// Activity since `at` (clamped to the last 30 minutes), newest first.
pub async fn get_realtime_snapshot(
    db: &DuckDbBackend,
    website_id: &str,
    at: Option<DateTime<Utc>>,
) -> Result<RealtimeSnapshot> {
    let now = Utc::now();
    let cutoff = realtime_cutoff(now, at);

    let (pageviews, sessions, events) = tokio::try_join!(
        events_since(db, website_id, EventKind::Pageview, cutoff),
        sessions_since(db, website_id, cutoff),
        events_since(db, website_id, EventKind::CustomEvent, cutoff),
    )?;

    Ok(RealtimeSnapshot {
        pageviews: pageviews
            .into_iter()
            .map(|e| decorate("pageview", &e.id.clone(), e.created_at, e))
            .collect(),
        sessions: sessions
            .into_iter()
            .map(|s| decorate("session", &s.id.clone(), s.created_at, s))
            .collect(),
        events: events
            .into_iter()
            .map(|e| decorate("event", &e.id.clone(), e.created_at, e))
            .collect(),
        timestamp: now.timestamp_millis(),
    })
}
