//! Time-bucketed pageview and visitor series.

use anyhow::Result;
use chrono::{Offset, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;

use lumen_core::cache::CacheStore;
use lumen_core::error::CoreError;
use lumen_core::filters::parse_filters;

use crate::backend::{to_sql_params, DuckDbBackend};
use crate::queries::stats::StatsCriteria;
use crate::queries::{base_params, FILTERS_START};
use crate::website::load_website;

/// Bucket granularity for time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl TimeUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    fn trunc(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Bucket label format. Truncated components stay fixed so labels from
    /// different rows in the same unit always align.
    fn label_format(self) -> &'static str {
        match self {
            Self::Minute => "%Y-%m-%d %H:%M:00",
            Self::Hour => "%Y-%m-%d %H:00:00",
            Self::Day => "%Y-%m-%d",
            Self::Month => "%Y-%m-01",
            Self::Year => "%Y-01-01",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimePoint {
    pub t: String,
    pub y: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageviewSeries {
    pub pageviews: Vec<TimePoint>,
    pub sessions: Vec<TimePoint>,
}

/// Pageview and distinct-visitor counts bucketed by `unit`, with buckets
/// labelled in the requested timezone.
///
/// Bucket boundaries use the zone's UTC offset at the start of the window;
/// a DST transition inside the window shifts by whole buckets at worst,
/// which the dashboard granularity absorbs.
pub async fn get_pageview_series(
    db: &DuckDbBackend,
    cache: &CacheStore,
    website_id: &str,
    criteria: &StatsCriteria,
    unit: TimeUnit,
    timezone: &str,
) -> Result<Option<PageviewSeries>> {
    let Some(website) = load_website(db, cache, website_id).await? else {
        return Ok(None);
    };
    let tz: Tz = timezone
        .parse()
        .map_err(|_| CoreError::UnsupportedTimezone(timezone.to_string()))?;
    let offset_minutes = tz
        .offset_from_utc_datetime(&criteria.start.naive_utc())
        .fix()
        .local_minus_utc()
        / 60;

    let reset = website.reset_date();
    let parsed = parse_filters(&criteria.filters);
    let params = base_params(website_id, reset, criteria.start, criteria.end, &parsed.fragment);

    // Offset and formats are server-derived constants, never client text.
    let bucket = format!(
        "strftime(date_trunc('{trunc}', website_event.created_at + to_minutes(CAST({offset} AS BIGINT))), '{fmt}')",
        trunc = unit.trunc(),
        offset = offset_minutes,
        fmt = unit.label_format(),
    );
    let body = format!(
        "from website_event \
         {join} \
         where website_event.website_id = ?1 \
           and website_event.event_type = 1 \
           and website_event.created_at >= ?2 \
           and website_event.created_at between ?3 and ?4 \
           {filters} \
         group by 1 \
         order by 1",
        join = parsed.join_clause(),
        filters = parsed.fragment.render(FILTERS_START),
    );
    let pageviews_sql = format!("select {bucket} as t, cast(count(*) as bigint) as y {body}");
    let sessions_sql = format!(
        "select {bucket} as t, cast(count(distinct website_event.session_id) as bigint) as y {body}"
    );

    let (pageviews, sessions) = tokio::try_join!(
        run_series_query(db, &pageviews_sql, &params),
        run_series_query(db, &sessions_sql, &params),
    )?;
    Ok(Some(PageviewSeries {
        pageviews,
        sessions,
    }))
}

async fn run_series_query(
    db: &DuckDbBackend,
    sql: &str,
    params: &[lumen_core::filters::ParamValue],
) -> Result<Vec<TimePoint>> {
    let conn = db.conn.lock().await;
    let boxed = to_sql_params(params);
    let refs: Vec<&dyn duckdb::types::ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(refs.as_slice(), |row| {
        Ok(TimePoint {
            t: row.get(0)?,
            y: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parsing_rejects_unknown_units() {
        assert_eq!(TimeUnit::parse("hour"), Some(TimeUnit::Hour));
        assert_eq!(TimeUnit::parse("fortnight"), None);
    }
}
