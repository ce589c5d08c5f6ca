//! Website repository with cache-aside fronting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lumen_core::cache::{website_key, CacheStore};
use lumen_core::model::Website;

use crate::backend::{format_ts, parse_opt_ts, parse_ts, DuckDbBackend};

const WEBSITE_COLUMNS: &str = "website_id, owner_id, name, domain, share_id, \
     CAST(reset_at AS VARCHAR), CAST(created_at AS VARCHAR), CAST(deleted_at AS VARCHAR)";

#[derive(Debug, Clone)]
pub struct NewWebsite {
    /// Provisioning may supply an external ID; otherwise a random one is
    /// generated.
    pub id: Option<String>,
    pub owner_id: String,
    pub name: String,
    pub domain: String,
    pub share_id: Option<String>,
}

fn map_website(row: &duckdb::Row<'_>) -> duckdb::Result<Website> {
    Ok(Website {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        domain: row.get(3)?,
        share_id: row.get(4)?,
        reset_at: parse_opt_ts(row.get(5)?),
        created_at: parse_ts(&row.get::<_, String>(6)?),
        deleted_at: parse_opt_ts(row.get(7)?),
    })
}

/// Insert a website and write it through to the cache.
pub async fn create_website(
    db: &DuckDbBackend,
    cache: &CacheStore,
    data: NewWebsite,
) -> Result<Website> {
    let website = Website {
        id: data.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        owner_id: data.owner_id,
        name: data.name,
        domain: data.domain,
        share_id: data.share_id,
        reset_at: None,
        created_at: Utc::now(),
        deleted_at: None,
    };

    {
        let conn = db.conn.lock().await;
        conn.execute(
            "INSERT INTO website (website_id, owner_id, name, domain, share_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            duckdb::params![
                website.id,
                website.owner_id,
                website.name,
                website.domain,
                website.share_id,
                format_ts(website.created_at),
            ],
        )?;
    }

    cache.store(&website_key(&website.id), &website).await;
    Ok(website)
}

/// Raw primary-store lookup, including soft-deleted rows.
pub async fn get_website(db: &DuckDbBackend, id: &str) -> Result<Option<Website>> {
    let conn = db.conn.lock().await;
    let result = conn
        .prepare(&format!(
            "SELECT {WEBSITE_COLUMNS} FROM website WHERE website_id = ?1"
        ))?
        .query_row(duckdb::params![id], map_website);
    match result {
        Ok(website) => Ok(Some(website)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_website_by_owner_and_name(
    db: &DuckDbBackend,
    owner_id: &str,
    name: &str,
) -> Result<Option<Website>> {
    let conn = db.conn.lock().await;
    let result = conn
        .prepare(&format!(
            "SELECT {WEBSITE_COLUMNS} FROM website \
             WHERE owner_id = ?1 AND name = ?2 AND deleted_at IS NULL \
             LIMIT 1"
        ))?
        .query_row(duckdb::params![owner_id, name], map_website);
    match result {
        Ok(website) => Ok(Some(website)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All live websites owned by `owner_id`, alphabetical.
pub async fn list_websites(db: &DuckDbBackend, owner_id: &str) -> Result<Vec<Website>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {WEBSITE_COLUMNS} FROM website \
         WHERE owner_id = ?1 AND deleted_at IS NULL \
         ORDER BY name ASC"
    ))?;
    let rows = stmt.query_map(duckdb::params![owner_id], map_website)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Cache-aside lookup. Soft-deleted and unknown websites both resolve to
/// `None`.
pub async fn load_website(
    db: &DuckDbBackend,
    cache: &CacheStore,
    id: &str,
) -> Result<Option<Website>> {
    let website = cache
        .fetch(&website_key(id), || get_website(db, id))
        .await?;
    Ok(website.filter(|w| w.deleted_at.is_none()))
}

/// Move the stats lower bound forward, hiding all rows before `at` from
/// every aggregate without deleting them.
pub async fn reset_website(
    db: &DuckDbBackend,
    cache: &CacheStore,
    id: &str,
    at: DateTime<Utc>,
) -> Result<Option<Website>> {
    {
        let conn = db.conn.lock().await;
        conn.execute(
            "UPDATE website SET reset_at = ?1 WHERE website_id = ?2",
            duckdb::params![format_ts(at), id],
        )?;
    }
    // Refresh the cached copy so stats pick up the new bound immediately.
    let website = get_website(db, id).await?;
    if let Some(w) = &website {
        cache.store(&website_key(id), w).await;
    }
    Ok(website)
}

/// Delete a website. Soft deletion tombstones both the row and the cache
/// entry; hard deletion cascades over the analytics tables.
pub async fn delete_website(
    db: &DuckDbBackend,
    cache: &CacheStore,
    id: &str,
    soft: bool,
) -> Result<()> {
    {
        let mut conn = db.conn.lock().await;
        if soft {
            conn.execute(
                "UPDATE website SET deleted_at = ?1 WHERE website_id = ?2",
                duckdb::params![format_ts(Utc::now()), id],
            )?;
        } else {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM event_data WHERE website_id = ?1",
                duckdb::params![id],
            )?;
            tx.execute(
                "DELETE FROM website_event WHERE website_id = ?1",
                duckdb::params![id],
            )?;
            tx.execute(
                "DELETE FROM session WHERE website_id = ?1",
                duckdb::params![id],
            )?;
            tx.execute(
                "DELETE FROM website WHERE website_id = ?1",
                duckdb::params![id],
            )?;
            tx.commit()?;
        }
    }
    cache.delete(&website_key(id), soft).await;
    Ok(())
}
