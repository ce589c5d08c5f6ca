//! `POST /api/send` — the tracking beacon.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use lumen_duckdb::event::{save_event, SaveEvent};

use crate::client_info::{extract_ip, ClientAddr};
use crate::error::AppError;
use crate::resolve::{resolve_session, BeaconContext};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendBody {
    /// Beacon kind; only `"event"` is recognised.
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: SendPayload,
}

#[derive(Debug, Deserialize)]
pub struct SendPayload {
    /// Target website ID.
    pub website: String,
    pub hostname: Option<String>,
    pub screen: Option<String>,
    pub language: Option<String>,
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub title: Option<String>,
    /// Present for custom events; absent for pageviews.
    pub name: Option<String>,
    pub data: Option<Value>,
}

/// Ingest one beacon.
///
/// Blocked traffic (bots, denylisted IPs/hostnames) gets an empty 200 with
/// no side effects — the response must be indistinguishable from success.
/// Everything else resolves a session, persists the event, and returns the
/// signed cache token for the client's next beacon.
pub async fn send(
    State(state): State<Arc<AppState>>,
    ClientAddr(peer): ClientAddr,
    headers: HeaderMap,
    Json(body): Json<SendBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.kind != "event" {
        return Err(AppError::BadRequest(format!(
            "unknown beacon type: {}",
            body.kind
        )));
    }
    let payload = body.payload;

    let peer_ip = peer.map(|addr| addr.ip());
    let ip = extract_ip(&headers, peer_ip, state.config.client_ip_header.as_deref());
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if state
        .denylist
        .should_block(ip, payload.hostname.as_deref(), user_agent)
    {
        debug!(website = %payload.website, "beacon dropped by traffic filter");
        return Ok(Json(json!({})).into_response());
    }

    let resolved = resolve_session(
        &state,
        &BeaconContext {
            website_id: &payload.website,
            hostname: payload.hostname.as_deref(),
            screen: payload.screen.as_deref(),
            language: payload.language.as_deref(),
            headers: &headers,
            peer: peer_ip,
        },
    )
    .await?;

    let (url_path, url_query) = split_url(
        payload.url.as_deref().unwrap_or("/"),
        state.config.remove_trailing_slash,
    );
    let referrer = payload.referrer.as_deref().map(split_referrer);

    save_event(
        &state.db,
        SaveEvent {
            website_id: resolved.website_id,
            session_id: resolved.session_id,
            url_path,
            url_query,
            referrer_path: referrer.as_ref().map(|r| r.path.clone()),
            referrer_query: referrer.as_ref().and_then(|r| r.query.clone()),
            referrer_domain: referrer.as_ref().and_then(|r| r.domain.clone()),
            page_title: payload.title,
            event_name: payload.name,
            event_data: payload.data,
            created_at: None,
        },
    )
    .await?;

    Ok(Json(json!({ "cache": resolved.token })).into_response())
}

/// Split a beacon URL into path and query. Accepts both absolute URLs and
/// bare paths.
fn split_url(raw: &str, remove_trailing_slash: bool) -> (String, Option<String>) {
    let (path, query) = match Url::parse(raw) {
        Ok(url) => (
            url.path().to_string(),
            url.query().map(str::to_string),
        ),
        Err(_) => match raw.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (raw.to_string(), None),
        },
    };
    let path = if remove_trailing_slash && path.len() > 1 && path.ends_with('/') {
        path.trim_end_matches('/').to_string()
    } else {
        path
    };
    let path = if path.is_empty() { "/".to_string() } else { path };
    (path, query.filter(|q| !q.is_empty()))
}

struct Referrer {
    path: String,
    query: Option<String>,
    domain: Option<String>,
}

/// Split a referrer URL. The domain drops any `www.` prefix so breakdowns
/// aggregate per site rather than per subdomain spelling.
fn split_referrer(raw: &str) -> Referrer {
    match Url::parse(raw) {
        Ok(url) => Referrer {
            path: url.path().to_string(),
            query: url.query().map(str::to_string).filter(|q| !q.is_empty()),
            domain: url
                .host_str()
                .map(|h| h.trim_start_matches("www.").to_string()),
        },
        Err(_) => {
            let (path, query) = split_url(raw, false);
            Referrer {
                path,
                query,
                domain: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_urls_split_into_path_and_query() {
        let (path, query) = split_url("https://example.com/docs/guide?ref=nav", false);
        assert_eq!(path, "/docs/guide");
        assert_eq!(query.as_deref(), Some("ref=nav"));
    }

    #[test]
    fn bare_paths_are_accepted() {
        let (path, query) = split_url("/pricing?plan=pro", false);
        assert_eq!(path, "/pricing");
        assert_eq!(query.as_deref(), Some("plan=pro"));
        assert_eq!(split_url("/pricing", false), ("/pricing".to_string(), None));
    }

    #[test]
    fn trailing_slash_removal_preserves_the_root() {
        assert_eq!(split_url("/docs/", true).0, "/docs");
        assert_eq!(split_url("/", true).0, "/");
        assert_eq!(split_url("/docs/", false).0, "/docs/");
    }

    #[test]
    fn referrer_domains_drop_www() {
        let referrer = split_referrer("https://www.google.com/search?q=lumen");
        assert_eq!(referrer.domain.as_deref(), Some("google.com"));
        assert_eq!(referrer.path, "/search");
        assert_eq!(referrer.query.as_deref(), Some("q=lumen"));
    }
}
