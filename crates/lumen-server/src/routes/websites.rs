//! Website provisioning and dashboard query routes.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use lumen_core::error::CoreError;
use lumen_core::filters::{FilterKey, MetricFilters};
use lumen_duckdb::queries::event_data::get_event_data_stats;
use lumen_duckdb::queries::metrics::get_website_metrics;
use lumen_duckdb::queries::pageviews::{get_pageview_series, TimeUnit};
use lumen_duckdb::queries::realtime::get_realtime_snapshot;
use lumen_duckdb::queries::stats::{get_website_stats, StatsCriteria};
use lumen_duckdb::website::{
    create_website, delete_website, get_website_by_owner_and_name, list_websites, load_website,
    reset_website, NewWebsite,
};

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the acting user's ID. Provisioning routes trust the
/// deployment's front proxy to authenticate it.
pub const USER_HEADER: &str = "x-lumen-user";

fn acting_user(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(format!("missing {USER_HEADER} header")))
}

fn ms_timestamp(ms: i64, name: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::BadRequest(format!("invalid {name} timestamp")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    start_at: i64,
    end_at: i64,
    /// Breakdown dimension for the metrics endpoint.
    #[serde(rename = "type")]
    kind: Option<String>,
    unit: Option<String>,
    timezone: Option<String>,
    /// Payload field restriction for the event-data endpoint.
    key: Option<String>,
    value: Option<String>,
    url: Option<String>,
    referrer: Option<String>,
    title: Option<String>,
    query: Option<String>,
    event: Option<String>,
    os: Option<String>,
    browser: Option<String>,
    device: Option<String>,
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
    language: Option<String>,
}

impl DashboardQuery {
    fn criteria(&self) -> Result<StatsCriteria, AppError> {
        let mut filters = MetricFilters::new();
        let pairs = [
            (FilterKey::Url, &self.url),
            (FilterKey::Referrer, &self.referrer),
            (FilterKey::Title, &self.title),
            (FilterKey::Query, &self.query),
            (FilterKey::Event, &self.event),
            (FilterKey::Os, &self.os),
            (FilterKey::Browser, &self.browser),
            (FilterKey::Device, &self.device),
            (FilterKey::Country, &self.country),
            (FilterKey::Region, &self.region),
            (FilterKey::City, &self.city),
            (FilterKey::Language, &self.language),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                filters.insert(key, value.clone());
            }
        }
        Ok(StatsCriteria {
            start: ms_timestamp(self.start_at, "startAt")?,
            end: ms_timestamp(self.end_at, "endAt")?,
            filters,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebsite {
    pub id: Option<String>,
    pub name: String,
    pub domain: String,
    pub share_id: Option<String>,
}

/// `POST /api/websites` — idempotent on `(owner, name)`: re-posting an
/// existing name returns the existing record unchanged.
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateWebsite>,
) -> Result<impl IntoResponse, AppError> {
    let owner = acting_user(&headers)?;
    if body.name.trim().is_empty() || body.domain.trim().is_empty() {
        return Err(AppError::BadRequest("name and domain are required".into()));
    }
    if let Some(existing) = get_website_by_owner_and_name(&state.db, &owner, &body.name).await? {
        return Ok((StatusCode::OK, Json(existing)));
    }
    let website = create_website(
        &state.db,
        &state.cache,
        NewWebsite {
            id: body.id,
            owner_id: owner,
            name: body.name,
            domain: body.domain,
            share_id: body.share_id,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(website)))
}

/// `GET /api/websites` — the acting user's live websites.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let owner = acting_user(&headers)?;
    let websites = list_websites(&state.db, &owner).await?;
    Ok(Json(websites))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let website = load_website(&state.db, &state.cache, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("website not found: {id}")))?;
    Ok(Json(website))
}

/// `DELETE /api/websites/{id}` — soft or hard per deployment mode.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if load_website(&state.db, &state.cache, &id).await?.is_none() {
        return Err(AppError::NotFound(format!("website not found: {id}")));
    }
    let soft = state.config.deploy_mode.soft_delete();
    delete_website(&state.db, &state.cache, &id, soft).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/websites/{id}/reset` — move the stats lower bound to now.
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if load_website(&state.db, &state.cache, &id).await?.is_none() {
        return Err(AppError::NotFound(format!("website not found: {id}")));
    }
    let website = reset_website(&state.db, &state.cache, &id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("website not found: {id}")))?;
    Ok(Json(website))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let criteria = query.criteria()?;
    let stats = get_website_stats(&state.db, &state.cache, &id, &criteria)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("website not found: {id}")))?;
    Ok(Json(stats))
}

pub async fn metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let dimension = query
        .kind
        .as_deref()
        .and_then(FilterKey::parse)
        .ok_or_else(|| AppError::BadRequest("unknown metrics type".into()))?;
    let criteria = query.criteria()?;
    let rows = get_website_metrics(&state.db, &state.cache, &id, dimension, &criteria)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("website not found: {id}")))?;
    Ok(Json(rows))
}

pub async fn pageviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let raw_unit = query.unit.as_deref().unwrap_or("day");
    let unit = TimeUnit::parse(raw_unit)
        .ok_or_else(|| CoreError::UnsupportedTimeUnit(raw_unit.to_string()))?;
    let timezone = query.timezone.clone().unwrap_or_else(|| "UTC".to_string());
    let criteria = query.criteria()?;
    let series = get_pageview_series(&state.db, &state.cache, &id, &criteria, unit, &timezone)
        .await
        .map_err(|e| match e.downcast::<CoreError>() {
            Ok(core) => AppError::from(core),
            Err(e) => AppError::Internal(e),
        })?
        .ok_or_else(|| AppError::NotFound(format!("website not found: {id}")))?;
    Ok(Json(series))
}

/// `GET /api/websites/{id}/events` — payload field breakdown, optionally
/// narrowed to one `(key, value)` pair.
pub async fn event_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let criteria = query.criteria()?;
    let value: Option<Value> = query
        .value
        .as_ref()
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())));
    let field = match (query.key.as_deref(), value.as_ref()) {
        (Some(key), Some(value)) => Some((key, value)),
        _ => None,
    };
    let rows = get_event_data_stats(&state.db, &state.cache, &id, &criteria, field)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("website not found: {id}")))?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    /// Millisecond cursor of the client's previous poll.
    at: Option<i64>,
}

pub async fn realtime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RealtimeQuery>,
) -> Result<impl IntoResponse, AppError> {
    if load_website(&state.db, &state.cache, &id).await?.is_none() {
        return Err(AppError::NotFound(format!("website not found: {id}")));
    }
    let at = match query.at {
        Some(ms) => Some(ms_timestamp(ms, "at")?),
        None => None,
    };
    let snapshot = get_realtime_snapshot(&state.db, &id, at).await?;
    Ok(Json(snapshot))
}
