//! Breakdowns over flattened custom-event payload fields.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use lumen_core::cache::CacheStore;
use lumen_core::filters::{event_data_filter, SqlFragment};

use crate::backend::{to_sql_params, DuckDbBackend};
use crate::queries::stats::StatsCriteria;
use crate::queries::{base_params, FILTERS_START};
use crate::website::load_website;

#[derive(Debug, Clone, Serialize)]
pub struct EventDataRow {
    /// Flattened payload key, e.g. `cart.items[0].sku`.
    pub x: String,
    /// Stored type code of the field.
    pub t: i32,
    pub y: i64,
}

/// Count occurrences of each payload field key within the window, most
/// frequent first, capped at 100.
///
/// An optional `(key, value)` pair restricts the count to payload rows
/// matching that exact field; the value's inferred type selects the typed
/// column compared, mirroring how the rows were written.
pub async fn get_event_data_stats(
    db: &DuckDbBackend,
    cache: &CacheStore,
    website_id: &str,
    criteria: &StatsCriteria,
    field: Option<(&str, &Value)>,
) -> Result<Option<Vec<EventDataRow>>> {
    let Some(website) = load_website(db, cache, website_id).await? else {
        return Ok(None);
    };
    let reset = website.reset_date();

    let fragment = match field {
        Some((key, value)) => event_data_filter(key, value),
        None => SqlFragment::new(),
    };

    let sql = format!(
        "select event_data.event_key as x, \
                event_data.event_data_type as t, \
                cast(count(*) as bigint) as y \
         from event_data \
         join website_event on event_data.website_event_id = website_event.event_id \
         where event_data.website_id = ?1 \
           and website_event.created_at >= ?2 \
           and website_event.created_at between ?3 and ?4 \
           {filter} \
         group by 1, 2 \
         order by 3 desc \
         limit 100",
        filter = fragment.render(FILTERS_START),
    );

    let params = base_params(website_id, reset, criteria.start, criteria.end, &fragment);
    let conn = db.conn.lock().await;
    let boxed = to_sql_params(&params);
    let refs: Vec<&dyn duckdb::types::ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), |row| {
        Ok(EventDataRow {
            x: row.get(0)?,
            t: row.get(1)?,
            y: row.get(2)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(Some(out))
}
