//! Summary statistics with period comparison.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use lumen_core::cache::CacheStore;
use lumen_core::filters::{parse_filters, MetricFilters, ParsedFilters};

use crate::backend::{to_sql_params, DuckDbBackend};
use crate::queries::{base_params, FILTERS_START};
use crate::website::load_website;

#[derive(Debug, Clone)]
pub struct StatsCriteria {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub filters: MetricFilters,
}

/// A stat and its delta against the previous window of equal length.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatValue {
    pub value: i64,
    pub change: i64,
}

impl StatValue {
    fn delta(current: i64, previous: i64) -> Self {
        Self {
            value: current,
            change: current - previous,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebsiteStats {
    pub pageviews: StatValue,
    pub uniques: StatValue,
    pub bounces: StatValue,
    pub totaltime: StatValue,
}

struct PeriodStats {
    pageviews: i64,
    uniques: i64,
    bounces: i64,
    totaltime: i64,
}

/// Pageview count, distinct sessions, bounces, and engaged time for the
/// window, each paired with the change against the immediately preceding
/// window of equal length.
///
/// A bounce is a session contributing exactly one pageview within a single
/// hourly bucket; engaged time sums the first-to-last spread of each
/// session's hourly buckets.
pub async fn get_website_stats(
    db: &DuckDbBackend,
    cache: &CacheStore,
    website_id: &str,
    criteria: &StatsCriteria,
) -> Result<Option<WebsiteStats>> {
    let Some(website) = load_website(db, cache, website_id).await? else {
        return Ok(None);
    };
    let reset = website.reset_date();
    let parsed = parse_filters(&criteria.filters);

    let span = criteria.end - criteria.start;
    let current = query_period(db, website_id, reset, criteria.start, criteria.end, &parsed).await?;
    let previous = query_period(
        db,
        website_id,
        reset,
        criteria.start - span,
        criteria.end - span,
        &parsed,
    )
    .await?;

    Ok(Some(WebsiteStats {
        pageviews: StatValue::delta(current.pageviews, previous.pageviews),
        uniques: StatValue::delta(current.uniques, previous.uniques),
        bounces: StatValue::delta(current.bounces, previous.bounces),
        totaltime: StatValue::delta(current.totaltime, previous.totaltime),
    }))
}

async fn query_period(
    db: &DuckDbBackend,
    website_id: &str,
    reset: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    parsed: &ParsedFilters,
) -> Result<PeriodStats> {
    let sql = format!(
        "select cast(coalesce(sum(t.c), 0) as bigint) as pageviews, \
                cast(count(distinct t.session_id) as bigint) as uniques, \
                cast(coalesce(sum(case when t.c = 1 then 1 else 0 end), 0) as bigint) as bounces, \
                cast(coalesce(sum(t.elapsed), 0) as bigint) as totaltime \
         from ( \
             select website_event.session_id, \
                    date_trunc('hour', website_event.created_at) as hour_bucket, \
                    count(*) as c, \
                    date_diff('second', min(website_event.created_at), max(website_event.created_at)) as elapsed \
             from website_event \
             {join} \
             where website_event.website_id = ?1 \
               and website_event.event_type = 1 \
               and website_event.created_at >= ?2 \
               and website_event.created_at between ?3 and ?4 \
               {filters} \
             group by 1, 2 \
         ) t",
        join = parsed.join_clause(),
        filters = parsed.fragment.render(FILTERS_START),
    );

    let params = base_params(website_id, reset, start, end, &parsed.fragment);
    let conn = db.conn.lock().await;
    let boxed = to_sql_params(&params);
    let refs: Vec<&dyn duckdb::types::ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

    let stats = conn.prepare(&sql)?.query_row(refs.as_slice(), |row| {
        Ok(PeriodStats {
            pageviews: row.get(0)?,
            uniques: row.get(1)?,
            bounces: row.get(2)?,
            totaltime: row.get(3)?,
        })
    })?;
    Ok(stats)
}
