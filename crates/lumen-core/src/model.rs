//! Domain records shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum stored length (in characters) of URL-ish event fields.
pub const URL_LENGTH: usize = 500;
/// Maximum stored length of a page title.
pub const PAGE_TITLE_LENGTH: usize = 500;
/// Maximum stored length of a custom event name.
pub const EVENT_NAME_LENGTH: usize = 50;

/// Event type codes stored in `website_event.event_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Pageview = 1,
    CustomEvent = 2,
}

impl EventKind {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Website {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub domain: String,
    pub share_id: Option<String>,
    /// Lower bound for all stats queries; lets an owner reset historical
    /// analytics without deleting rows. Defaults to `created_at`.
    pub reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Website {
    /// The effective stats lower bound.
    pub fn reset_date(&self) -> DateTime<Utc> {
        self.reset_at.unwrap_or(self.created_at)
    }
}

/// A visitor session. `id` is deterministic — see `identity::derive_id` —
/// so the record is created once per identity tuple per salt window and
/// never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub website_id: String,
    pub hostname: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub screen: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    /// Stored as `"{country}-{region}"` when both are known, so region codes
    /// cannot collide across countries.
    pub subdivision1: Option<String>,
    pub subdivision2: Option<String>,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteEvent {
    pub id: String,
    pub website_id: String,
    pub session_id: String,
    pub url_path: String,
    pub url_query: Option<String>,
    pub referrer_path: Option<String>,
    pub referrer_query: Option<String>,
    pub referrer_domain: Option<String>,
    pub page_title: Option<String>,
    pub event_type: i32,
    pub event_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 hash; omitted from reads unless explicitly requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
