use chrono::{DateTime, Duration, DurationRound, Utc};
use serde_json::json;

use lumen_core::cache::CacheStore;
use lumen_core::filters::{FilterKey, MetricFilters};
use lumen_duckdb::event::{save_event, SaveEvent};
use lumen_duckdb::queries::event_data::get_event_data_stats;
use lumen_duckdb::queries::metrics::get_website_metrics;
use lumen_duckdb::queries::pageviews::{get_pageview_series, TimeUnit};
use lumen_duckdb::queries::stats::{get_website_stats, StatsCriteria};
use lumen_duckdb::session::{create_session, NewSession};
use lumen_duckdb::website::{create_website, reset_website, NewWebsite};
use lumen_duckdb::DuckDbBackend;

/// Next full hour from now. Event timestamps in these tests sit after the
/// website's creation instant so the reset lower bound never hides them,
/// and on a fixed hour so bucket boundaries are predictable.
fn next_hour() -> DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::hours(1))
        .expect("trunc")
        + Duration::hours(1)
}

async fn seed_website(db: &DuckDbBackend, cache: &CacheStore, domain: &str) -> String {
    let website = create_website(
        db,
        cache,
        NewWebsite {
            id: None,
            owner_id: "owner-1".into(),
            name: domain.into(),
            domain: domain.into(),
            share_id: None,
        },
    )
    .await
    .expect("create website");
    website.id
}

async fn seed_session(
    db: &DuckDbBackend,
    website_id: &str,
    id: &str,
    country: Option<&str>,
    language: Option<&str>,
) {
    create_session(
        db,
        &NewSession {
            id: id.into(),
            website_id: website_id.into(),
            hostname: Some("example.com".into()),
            browser: Some("Chrome".into()),
            os: Some("macOS".into()),
            device: Some("desktop".into()),
            screen: Some("1920x1080".into()),
            language: language.map(Into::into),
            country: country.map(Into::into),
            subdivision1: None,
            subdivision2: None,
            city: None,
        },
    )
    .await
    .expect("create session");
}

fn pageview(website_id: &str, session_id: &str, path: &str, at: DateTime<Utc>) -> SaveEvent {
    SaveEvent {
        website_id: website_id.into(),
        session_id: session_id.into(),
        url_path: path.into(),
        url_query: None,
        referrer_path: None,
        referrer_query: None,
        referrer_domain: None,
        page_title: None,
        event_name: None,
        event_data: None,
        created_at: Some(at),
    }
}

fn criteria(start: DateTime<Utc>, end: DateTime<Utc>) -> StatsCriteria {
    StatsCriteria {
        start,
        end,
        filters: MetricFilters::new(),
    }
}

#[tokio::test]
async fn stats_count_pageviews_uniques_bounces_and_time() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-a", Some("US"), None).await;
    seed_session(&db, &website_id, "sess-b", Some("DE"), None).await;

    // Session A views two pages five minutes apart; session B bounces.
    save_event(&db, pageview(&website_id, "sess-a", "/", base + Duration::minutes(1)))
        .await
        .expect("event");
    save_event(&db, pageview(&website_id, "sess-a", "/docs", base + Duration::minutes(6)))
        .await
        .expect("event");
    save_event(&db, pageview(&website_id, "sess-b", "/", base + Duration::minutes(10)))
        .await
        .expect("event");
    // A custom event never counts toward pageview stats.
    save_event(
        &db,
        SaveEvent {
            event_name: Some("signup".into()),
            ..pageview(&website_id, "sess-a", "/", base + Duration::minutes(7))
        },
    )
    .await
    .expect("event");

    let stats = get_website_stats(
        &db,
        &cache,
        &website_id,
        &criteria(base, base + Duration::hours(2)),
    )
    .await
    .expect("stats")
    .expect("website exists");

    assert_eq!(stats.pageviews.value, 3);
    assert_eq!(stats.uniques.value, 2);
    assert_eq!(stats.bounces.value, 1);
    assert_eq!(stats.totaltime.value, 300);
    // The previous window is empty, so change equals value.
    assert_eq!(stats.pageviews.change, 3);
}

#[tokio::test]
async fn stats_honor_session_attribute_filters() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-us", Some("US"), None).await;
    seed_session(&db, &website_id, "sess-de", Some("DE"), None).await;
    save_event(&db, pageview(&website_id, "sess-us", "/", base + Duration::minutes(1)))
        .await
        .expect("event");
    save_event(&db, pageview(&website_id, "sess-de", "/", base + Duration::minutes(2)))
        .await
        .expect("event");

    let mut filters = MetricFilters::new();
    filters.insert(FilterKey::Country, "US");
    let stats = get_website_stats(
        &db,
        &cache,
        &website_id,
        &StatsCriteria {
            start: base,
            end: base + Duration::hours(1),
            filters,
        },
    )
    .await
    .expect("stats")
    .expect("website exists");

    assert_eq!(stats.pageviews.value, 1);
    assert_eq!(stats.uniques.value, 1);
}

#[tokio::test]
async fn stats_exclude_rows_before_the_reset_bound() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-a", None, None).await;
    save_event(&db, pageview(&website_id, "sess-a", "/old", base + Duration::minutes(1)))
        .await
        .expect("event");
    save_event(&db, pageview(&website_id, "sess-a", "/new", base + Duration::minutes(20)))
        .await
        .expect("event");

    reset_website(&db, &cache, &website_id, base + Duration::minutes(10))
        .await
        .expect("reset");

    let stats = get_website_stats(
        &db,
        &cache,
        &website_id,
        &criteria(base, base + Duration::hours(1)),
    )
    .await
    .expect("stats")
    .expect("website exists");
    assert_eq!(stats.pageviews.value, 1);
}

#[tokio::test]
async fn stats_return_none_for_unknown_website() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let base = next_hour();
    let got = get_website_stats(
        &db,
        &cache,
        "no-such-site",
        &criteria(base, base + Duration::hours(1)),
    )
    .await
    .expect("stats");
    assert!(got.is_none());
}

#[tokio::test]
async fn url_metrics_rank_pages_by_views() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-a", None, None).await;
    for (path, count) in [("/docs", 3i64), ("/", 2), ("/pricing", 1)] {
        for i in 0..count {
            save_event(
                &db,
                pageview(&website_id, "sess-a", path, base + Duration::minutes(i)),
            )
            .await
            .expect("event");
        }
    }

    let rows = get_website_metrics(
        &db,
        &cache,
        &website_id,
        FilterKey::Url,
        &criteria(base, base + Duration::hours(1)),
    )
    .await
    .expect("metrics")
    .expect("website exists");

    assert_eq!(rows.len(), 3);
    assert_eq!((rows[0].x.as_str(), rows[0].y), ("/docs", 3));
    assert_eq!((rows[1].x.as_str(), rows[1].y), ("/", 2));
}

#[tokio::test]
async fn referrer_metrics_exclude_the_websites_own_domain() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-a", None, None).await;
    for (referrer, minute) in [("google.com", 1i64), ("example.com", 2), ("google.com", 3)] {
        save_event(
            &db,
            SaveEvent {
                referrer_domain: Some(referrer.into()),
                ..pageview(&website_id, "sess-a", "/", base + Duration::minutes(minute))
            },
        )
        .await
        .expect("event");
    }

    let rows = get_website_metrics(
        &db,
        &cache,
        &website_id,
        FilterKey::Referrer,
        &criteria(base, base + Duration::hours(1)),
    )
    .await
    .expect("metrics")
    .expect("website exists");

    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].x.as_str(), rows[0].y), ("google.com", 2));
}

#[tokio::test]
async fn language_metrics_merge_regional_variants() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-us", None, Some("en-US")).await;
    seed_session(&db, &website_id, "sess-gb", None, Some("en-GB")).await;
    seed_session(&db, &website_id, "sess-fr", None, Some("fr")).await;
    for sess in ["sess-us", "sess-gb", "sess-fr"] {
        save_event(&db, pageview(&website_id, sess, "/", base + Duration::minutes(1)))
            .await
            .expect("event");
    }

    let rows = get_website_metrics(
        &db,
        &cache,
        &website_id,
        FilterKey::Language,
        &criteria(base, base + Duration::hours(1)),
    )
    .await
    .expect("metrics")
    .expect("website exists");

    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].x.as_str(), rows[0].y), ("en", 2));
    assert_eq!((rows[1].x.as_str(), rows[1].y), ("fr", 1));
}

#[tokio::test]
async fn event_metrics_count_custom_events_by_name() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-a", None, None).await;
    for (name, minute) in [("signup", 1i64), ("signup", 2), ("checkout", 3)] {
        save_event(
            &db,
            SaveEvent {
                event_name: Some(name.into()),
                ..pageview(&website_id, "sess-a", "/", base + Duration::minutes(minute))
            },
        )
        .await
        .expect("event");
    }
    // Plain pageviews never appear in the event breakdown.
    save_event(&db, pageview(&website_id, "sess-a", "/", base + Duration::minutes(4)))
        .await
        .expect("event");

    let rows = get_website_metrics(
        &db,
        &cache,
        &website_id,
        FilterKey::Event,
        &criteria(base, base + Duration::hours(1)),
    )
    .await
    .expect("metrics")
    .expect("website exists");

    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].x.as_str(), rows[0].y), ("signup", 2));
    assert_eq!((rows[1].x.as_str(), rows[1].y), ("checkout", 1));
}

#[tokio::test]
async fn pageview_series_buckets_by_hour() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-a", None, None).await;
    seed_session(&db, &website_id, "sess-b", None, None).await;
    save_event(&db, pageview(&website_id, "sess-a", "/", base + Duration::minutes(5)))
        .await
        .expect("event");
    save_event(&db, pageview(&website_id, "sess-b", "/", base + Duration::minutes(10)))
        .await
        .expect("event");
    save_event(
        &db,
        pageview(&website_id, "sess-a", "/", base + Duration::minutes(65)),
    )
    .await
    .expect("event");

    let series = get_pageview_series(
        &db,
        &cache,
        &website_id,
        &criteria(base, base + Duration::hours(2)),
        TimeUnit::Hour,
        "UTC",
    )
    .await
    .expect("series")
    .expect("website exists");

    assert_eq!(series.pageviews.len(), 2);
    assert_eq!(series.pageviews[0].t, base.format("%Y-%m-%d %H:00:00").to_string());
    assert_eq!(series.pageviews[0].y, 2);
    assert_eq!(series.pageviews[1].y, 1);
    // Distinct sessions per bucket.
    assert_eq!(series.sessions[0].y, 2);
    assert_eq!(series.sessions[1].y, 1);
}

#[tokio::test]
async fn pageview_series_rejects_unknown_timezones() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    let err = get_pageview_series(
        &db,
        &cache,
        &website_id,
        &criteria(base, base + Duration::hours(1)),
        TimeUnit::Hour,
        "Mars/Olympus_Mons",
    )
    .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn event_data_stats_count_flattened_keys() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let cache = CacheStore::disabled();
    let website_id = seed_website(&db, &cache, "example.com").await;
    let base = next_hour();

    seed_session(&db, &website_id, "sess-a", None, None).await;
    for (plan, minute) in [("pro", 1i64), ("free", 2)] {
        save_event(
            &db,
            SaveEvent {
                event_name: Some("signup".into()),
                event_data: Some(json!({ "plan": plan, "cart": { "total": 9.5 } })),
                ..pageview(&website_id, "sess-a", "/", base + Duration::minutes(minute))
            },
        )
        .await
        .expect("event");
    }

    let rows = get_event_data_stats(
        &db,
        &cache,
        &website_id,
        &criteria(base, base + Duration::hours(1)),
        None,
    )
    .await
    .expect("event data")
    .expect("website exists");

    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.y, 2);
    }
    assert!(rows.iter().any(|r| r.x == "plan"));
    assert!(rows.iter().any(|r| r.x == "cart.total"));

    // Restricting to a field value narrows the count.
    let filtered = get_event_data_stats(
        &db,
        &cache,
        &website_id,
        &criteria(base, base + Duration::hours(1)),
        Some(("plan", &json!("pro"))),
    )
    .await
    .expect("event data")
    .expect("website exists");
    assert_eq!(filtered.len(), 1);
    assert_eq!((filtered[0].x.as_str(), filtered[0].y), ("plan", 1));
}
