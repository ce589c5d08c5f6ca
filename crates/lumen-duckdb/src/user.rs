//! User (account) repository.
//!
//! Deletion cascades over everything the user owns in one transaction.
//! A missing user is an explicit `None` result — never a silent success.

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use lumen_core::cache::{website_key, CacheStore};
use lumen_core::model::User;

use crate::backend::{format_ts, parse_opt_ts, parse_ts, DuckDbBackend, StoreError};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Option<String>,
    pub username: String,
    /// Already hashed by the caller; this layer never sees plaintext.
    pub password_hash: String,
    pub role: String,
}

fn map_user(row: &duckdb::Row<'_>) -> duckdb::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: row.get(3)?,
        created_at: parse_ts(&row.get::<_, String>(4)?),
        deleted_at: parse_opt_ts(row.get(5)?),
    })
}

fn user_columns(include_password: bool) -> String {
    let password = if include_password {
        "password"
    } else {
        "CAST(NULL AS VARCHAR)"
    };
    format!(
        "user_id, username, {password}, role, CAST(created_at AS VARCHAR), \
         CAST(deleted_at AS VARCHAR)"
    )
}

pub async fn create_user(db: &DuckDbBackend, data: NewUser) -> Result<User, StoreError> {
    let user = User {
        id: data.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        username: data.username,
        password: Some(data.password_hash),
        role: data.role,
        created_at: Utc::now(),
        deleted_at: None,
    };
    let conn = db.conn.lock().await;
    conn.execute(
        "INSERT INTO account (user_id, username, password, role, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        duckdb::params![
            user.id,
            user.username,
            user.password,
            user.role,
            format_ts(user.created_at),
        ],
    )?;
    Ok(User {
        password: None,
        ..user
    })
}

pub async fn get_user(
    db: &DuckDbBackend,
    id: &str,
    include_password: bool,
    show_deleted: bool,
) -> Result<Option<User>> {
    let deleted_clause = if show_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let conn = db.conn.lock().await;
    let result = conn
        .prepare(&format!(
            "SELECT {} FROM account WHERE user_id = ?1{deleted_clause}",
            user_columns(include_password)
        ))?
        .query_row(duckdb::params![id], map_user);
    match result {
        Ok(user) => Ok(Some(user)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_user_by_username(
    db: &DuckDbBackend,
    username: &str,
    include_password: bool,
) -> Result<Option<User>> {
    let conn = db.conn.lock().await;
    let result = conn
        .prepare(&format!(
            "SELECT {} FROM account WHERE username = ?1 AND deleted_at IS NULL",
            user_columns(include_password)
        ))?
        .query_row(duckdb::params![username], map_user);
    match result {
        Ok(user) => Ok(Some(user)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Live users, alphabetical, capped at 100. Password hashes are never read.
pub async fn list_users(db: &DuckDbBackend) -> Result<Vec<User>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM account WHERE deleted_at IS NULL ORDER BY username ASC LIMIT 100",
        user_columns(false)
    ))?;
    let rows = stmt.query_map([], map_user)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Delete a user and cascade over their websites' analytics data in a single
/// transaction: event_data → website_event → session → website → account.
///
/// `soft` tombstones the website and account rows instead of removing them
/// (analytics rows are removed either way). Returns `false` when no such
/// live user exists; the caller decides how to surface that.
pub async fn delete_user(
    db: &DuckDbBackend,
    cache: &CacheStore,
    id: &str,
    soft: bool,
) -> Result<bool> {
    if get_user(db, id, false, false).await?.is_none() {
        return Ok(false);
    }

    let website_ids: Vec<String> = {
        let conn = db.conn.lock().await;
        let mut stmt = conn.prepare("SELECT website_id FROM website WHERE owner_id = ?1")?;
        let rows = stmt.query_map(duckdb::params![id], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        ids
    };

    {
        let mut conn = db.conn.lock().await;
        let tx = conn.transaction()?;
        let now = format_ts(Utc::now());

        if !website_ids.is_empty() {
            let marks = placeholders(1, website_ids.len());
            let refs: Vec<&dyn duckdb::types::ToSql> = website_ids
                .iter()
                .map(|s| s as &dyn duckdb::types::ToSql)
                .collect();
            tx.execute(
                &format!("DELETE FROM event_data WHERE website_id IN ({marks})"),
                refs.as_slice(),
            )?;
            tx.execute(
                &format!("DELETE FROM website_event WHERE website_id IN ({marks})"),
                refs.as_slice(),
            )?;
            tx.execute(
                &format!("DELETE FROM session WHERE website_id IN ({marks})"),
                refs.as_slice(),
            )?;
            if soft {
                let marks_after_ts = placeholders(2, website_ids.len());
                let mut params: Vec<&dyn duckdb::types::ToSql> = vec![&now];
                params.extend(refs.iter());
                tx.execute(
                    &format!(
                        "UPDATE website SET deleted_at = ?1 WHERE website_id IN ({marks_after_ts})"
                    ),
                    params.as_slice(),
                )?;
            } else {
                tx.execute(
                    &format!("DELETE FROM website WHERE website_id IN ({marks})"),
                    refs.as_slice(),
                )?;
            }
        }

        if soft {
            tx.execute(
                "UPDATE account SET deleted_at = ?1 WHERE user_id = ?2",
                duckdb::params![now, id],
            )?;
        } else {
            tx.execute("DELETE FROM account WHERE user_id = ?1", duckdb::params![id])?;
        }
        tx.commit()?;
    }

    // Tombstone cached websites so reads stop resolving them immediately.
    for website_id in &website_ids {
        cache.delete(&website_key(website_id), soft).await;
    }
    Ok(true)
}
