//! Beacon-to-session resolution.
//!
//! Each beacon resolves to a deterministic session. The happy path is a
//! signed cache token from a previous response; without one, the identity
//! tuple `(website_id, hostname, ip, user_agent)` is hashed with the
//! monthly salt and the session row is created on first sight.

use axum::http::HeaderMap;
use chrono::Utc;
use std::net::IpAddr;
use uuid::Uuid;

use lumen_core::error::CoreError;
use lumen_core::identity::derive_id;
use lumen_duckdb::session::{get_or_create_session, NewSession};
use lumen_duckdb::website::load_website;

use crate::client_info::{resolve_client, ClientInfo};
use crate::error::AppError;
use crate::state::AppState;
use crate::token::{self, CacheClaims, CACHE_TOKEN_HEADER};

/// Beacon fields the resolver needs, borrowed from the request.
pub struct BeaconContext<'a> {
    pub website_id: &'a str,
    pub hostname: Option<&'a str>,
    pub screen: Option<&'a str>,
    pub language: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub peer: Option<IpAddr>,
}

pub struct ResolvedSession {
    pub website_id: String,
    pub session_id: String,
    /// Signed token the client echoes back to skip resolution next time.
    pub token: String,
}

/// Resolve the beacon to a session, creating the session row when the
/// identity is new this salt window.
///
/// A valid cache token for the same website short-circuits everything,
/// including the website lookup. Invalid or mismatched tokens fall through
/// silently to full resolution.
pub async fn resolve_session(
    state: &AppState,
    ctx: &BeaconContext<'_>,
) -> Result<ResolvedSession, AppError> {
    if let Some(raw) = ctx
        .headers
        .get(CACHE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(claims) = token::verify(&state.secret, raw) {
            if claims.website_id == ctx.website_id {
                return Ok(ResolvedSession {
                    website_id: claims.website_id,
                    session_id: claims.session_id,
                    token: raw.to_string(),
                });
            }
        }
    }

    if Uuid::parse_str(ctx.website_id).is_err() {
        return Err(CoreError::InvalidWebsiteId(ctx.website_id.to_string()).into());
    }
    if load_website(&state.db, &state.cache, ctx.website_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "website not found: {}",
            ctx.website_id
        )));
    }

    let client = resolve_client(
        ctx.headers,
        ctx.peer,
        state.config.client_ip_header.as_deref(),
        state.geoip.as_deref(),
        ctx.screen,
    );
    let session_id = derive_session_id(&state.secret, ctx, &client);

    let session = get_or_create_session(
        &state.db,
        &state.cache,
        &NewSession {
            id: session_id,
            website_id: ctx.website_id.to_string(),
            hostname: ctx.hostname.map(Into::into),
            browser: client.browser.clone(),
            os: client.os.clone(),
            device: client.device.clone(),
            screen: ctx.screen.map(Into::into),
            language: ctx.language.map(Into::into),
            country: client.country.clone(),
            subdivision1: client.subdivision1.clone(),
            subdivision2: client.subdivision2.clone(),
            city: client.city.clone(),
        },
    )
    .await?;

    let claims = CacheClaims {
        website_id: session.website_id.clone(),
        session_id: session.id.clone(),
    };
    let signed = token::sign(&state.secret, &claims)?;
    Ok(ResolvedSession {
        website_id: claims.website_id,
        session_id: claims.session_id,
        token: signed,
    })
}

fn derive_session_id(secret: &str, ctx: &BeaconContext<'_>, client: &ClientInfo) -> String {
    let ip = client.ip.map(|ip| ip.to_string()).unwrap_or_default();
    derive_id(
        secret,
        Utc::now(),
        &[
            ctx.website_id,
            ctx.hostname.unwrap_or(""),
            &ip,
            &client.user_agent,
        ],
    )
    .to_string()
}
