use std::sync::Arc;

use chrono::{Duration, Utc};

use lumen_core::cache::{CacheStore, MemoryCache};
use lumen_duckdb::event::{save_event, SaveEvent};
use lumen_duckdb::session::{get_or_create_session, sessions_since, NewSession};
use lumen_duckdb::user::{create_user, delete_user, get_user, list_users, NewUser};
use lumen_duckdb::website::{
    create_website, delete_website, get_website, list_websites, load_website, NewWebsite,
};
use lumen_duckdb::{DuckDbBackend, StoreError};

async fn seed_website(db: &DuckDbBackend, cache: &CacheStore, owner: &str, name: &str) -> String {
    create_website(
        db,
        cache,
        NewWebsite {
            id: None,
            owner_id: owner.into(),
            name: name.into(),
            domain: format!("{name}.example.com"),
            share_id: None,
        },
    )
    .await
    .expect("create website")
    .id
}

async fn seed_activity(db: &DuckDbBackend, cache: &CacheStore, website_id: &str, session: &str) {
    get_or_create_session(
        db,
        cache,
        &NewSession {
            id: session.into(),
            website_id: website_id.into(),
            hostname: None,
            browser: None,
            os: None,
            device: None,
            screen: None,
            language: None,
            country: None,
            subdivision1: None,
            subdivision2: None,
            city: None,
        },
    )
    .await
    .expect("session");
    save_event(
        db,
        SaveEvent {
            website_id: website_id.into(),
            session_id: session.into(),
            url_path: "/".into(),
            url_query: None,
            referrer_path: None,
            referrer_query: None,
            referrer_domain: None,
            page_title: None,
            event_name: None,
            event_data: Some(serde_json::json!({ "k": "v" })),
            created_at: None,
        },
    )
    .await
    .expect("event");
}

#[tokio::test]
async fn soft_deleted_websites_stop_resolving_but_keep_their_row() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::new(Arc::new(MemoryCache::new()));
    let website_id = seed_website(&db, &cache, "owner-1", "blog").await;

    delete_website(&db, &cache, &website_id, true)
        .await
        .expect("delete");

    assert!(load_website(&db, &cache, &website_id)
        .await
        .expect("load")
        .is_none());
    // The raw row survives with its tombstone timestamp.
    let raw = get_website(&db, &website_id)
        .await
        .expect("get")
        .expect("row kept");
    assert!(raw.deleted_at.is_some());
    assert!(list_websites(&db, "owner-1").await.expect("list").is_empty());
}

#[tokio::test]
async fn hard_deleting_a_website_cascades_over_analytics_rows() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "owner-1", "blog").await;
    seed_activity(&db, &cache, &website_id, "sess-1").await;

    delete_website(&db, &cache, &website_id, false)
        .await
        .expect("delete");

    assert!(get_website(&db, &website_id).await.expect("get").is_none());
    assert!(sessions_since(&db, &website_id, Utc::now() - Duration::hours(1))
        .await
        .expect("sessions")
        .is_empty());
    let conn = db.conn_for_test().await;
    let orphans: i64 = conn
        .query_row(
            "SELECT count(*) FROM event_data WHERE website_id = ?1",
            duckdb::params![website_id],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn duplicate_usernames_surface_as_unique_violations() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let data = NewUser {
        id: None,
        username: "ada".into(),
        password_hash: "hash".into(),
        role: "admin".into(),
    };
    let created = create_user(&db, data.clone()).await.expect("create");
    // Creation never echoes the hash back.
    assert!(created.password.is_none());

    match create_user(&db, data).await {
        Err(StoreError::UniqueViolation(_)) => {}
        other => panic!("expected unique violation, got {other:?}"),
    }
}

#[tokio::test]
async fn deleting_a_user_removes_their_websites_and_data() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let user = create_user(
        &db,
        NewUser {
            id: None,
            username: "ada".into(),
            password_hash: "hash".into(),
            role: "admin".into(),
        },
    )
    .await
    .expect("user");
    let website_id = seed_website(&db, &cache, &user.id, "blog").await;
    seed_activity(&db, &cache, &website_id, "sess-1").await;

    let removed = delete_user(&db, &cache, &user.id, false)
        .await
        .expect("delete");
    assert!(removed);

    assert!(get_user(&db, &user.id, false, true)
        .await
        .expect("get")
        .is_none());
    assert!(get_website(&db, &website_id).await.expect("get").is_none());
    assert!(list_users(&db).await.expect("list").is_empty());

    // A second delete reports that nothing was there.
    let again = delete_user(&db, &cache, &user.id, false)
        .await
        .expect("delete again");
    assert!(!again);
}

#[tokio::test]
async fn soft_user_deletion_keeps_rows_but_hides_them() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let user = create_user(
        &db,
        NewUser {
            id: None,
            username: "ada".into(),
            password_hash: "hash".into(),
            role: "admin".into(),
        },
    )
    .await
    .expect("user");
    let website_id = seed_website(&db, &cache, &user.id, "blog").await;

    assert!(delete_user(&db, &cache, &user.id, true).await.expect("delete"));

    assert!(get_user(&db, &user.id, false, false)
        .await
        .expect("get")
        .is_none());
    let tombstoned = get_user(&db, &user.id, false, true)
        .await
        .expect("get")
        .expect("row kept");
    assert!(tombstoned.deleted_at.is_some());
    let site = get_website(&db, &website_id)
        .await
        .expect("get")
        .expect("row kept");
    assert!(site.deleted_at.is_some());
}
