//! Single-dimension breakdowns (top pages, referrers, countries, ...).

use anyhow::Result;
use serde::Serialize;

use lumen_core::cache::CacheStore;
use lumen_core::filters::{parse_filters, FilterKey, ParamValue};

use crate::backend::{format_ts, to_sql_params, DuckDbBackend};
use crate::queries::stats::StatsCriteria;
use crate::queries::{base_params, FILTERS_START};
use crate::website::load_website;

const METRICS_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct MetricRow {
    pub x: String,
    pub y: i64,
}

/// Top values of one dimension within the window, ordered by count
/// descending, capped at 100 rows.
///
/// Any filter on the dimension being broken down is dropped, so the
/// breakdown always shows the full spread. Referrer breakdowns exclude
/// self-referrals from the website's own domain, and language breakdowns
/// merge regional variants into their primary subtag.
pub async fn get_website_metrics(
    db: &DuckDbBackend,
    cache: &CacheStore,
    website_id: &str,
    dimension: FilterKey,
    criteria: &StatsCriteria,
) -> Result<Option<Vec<MetricRow>>> {
    let Some(website) = load_website(db, cache, website_id).await? else {
        return Ok(None);
    };
    let reset = website.reset_date();

    let mut filters = criteria.filters.clone();
    filters.remove(dimension);
    let parsed = parse_filters(&filters);

    let rows = if dimension.is_session_attribute() {
        let sql = format!(
            "select session.{column} as x, cast(count(*) as bigint) as y \
             from session \
             where session.{column} is not null \
               and session.session_id in ( \
                   select website_event.session_id \
                   from website_event \
                   {join} \
                   where website_event.website_id = ?1 \
                     and website_event.created_at >= ?2 \
                     and website_event.created_at between ?3 and ?4 \
                     {filters} \
               ) \
             group by 1 \
             order by 2 desc \
             limit {limit}",
            column = dimension.column(),
            join = parsed.join_clause(),
            filters = parsed.fragment.render(FILTERS_START),
            limit = METRICS_LIMIT,
        );
        let params = base_params(website_id, reset, criteria.start, criteria.end, &parsed.fragment);
        run_metric_query(db, &sql, &params).await?
    } else {
        // Breaking down by event name looks at custom events; every other
        // event-table dimension describes pageviews.
        let event_type: i64 = if dimension == FilterKey::Event { 2 } else { 1 };
        let exclude_self_referrals = dimension == FilterKey::Referrer;

        let mut params = vec![
            ParamValue::Text(website_id.to_string()),
            ParamValue::Timestamp(format_ts(reset)),
            ParamValue::Timestamp(format_ts(criteria.start)),
            ParamValue::Timestamp(format_ts(criteria.end)),
            ParamValue::Int(event_type),
        ];
        let mut extra = String::new();
        if exclude_self_referrals {
            extra = format!("and website_event.referrer_domain != ?{} ", params.len() + 1);
            params.push(ParamValue::Text(website.domain.clone()));
        }
        let filters_start = params.len() + 1;
        params.extend(parsed.fragment.params().to_vec());

        let sql = format!(
            "select website_event.{column} as x, cast(count(*) as bigint) as y \
             from website_event \
             {join} \
             where website_event.website_id = ?1 \
               and website_event.created_at >= ?2 \
               and website_event.created_at between ?3 and ?4 \
               and website_event.event_type = ?5 \
               {extra}\
               and website_event.{column} is not null \
               {filters} \
             group by 1 \
             order by 2 desc \
             limit {limit}",
            column = dimension.column(),
            join = parsed.join_clause(),
            filters = parsed.fragment.render(filters_start),
            limit = METRICS_LIMIT,
        );
        run_metric_query(db, &sql, &params).await?
    };

    let rows = if dimension == FilterKey::Language {
        merge_languages(rows)
    } else {
        rows
    };
    Ok(Some(rows))
}

async fn run_metric_query(
    db: &DuckDbBackend,
    sql: &str,
    params: &[ParamValue],
) -> Result<Vec<MetricRow>> {
    let conn = db.conn.lock().await;
    let boxed = to_sql_params(params);
    let refs: Vec<&dyn duckdb::types::ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(refs.as_slice(), |row| {
        Ok(MetricRow {
            x: row.get(0)?,
            y: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Collapse `en-US`, `en-GB`, ... into `en`, summing counts and re-sorting.
fn merge_languages(rows: Vec<MetricRow>) -> Vec<MetricRow> {
    let mut merged: Vec<MetricRow> = Vec::new();
    for row in rows {
        let primary = row
            .x
            .split('-')
            .next()
            .unwrap_or(&row.x)
            .to_lowercase();
        match merged.iter_mut().find(|m| m.x == primary) {
            Some(existing) => existing.y += row.y,
            None => merged.push(MetricRow { x: primary, y: row.y }),
        }
    }
    merged.sort_by(|a, b| b.y.cmp(&a.y));
    merged.truncate(METRICS_LIMIT);
    merged
}
