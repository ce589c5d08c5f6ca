//! DuckDB schema bootstrap.
//!
//! All statements are `IF NOT EXISTS` so re-running on every startup is safe.
//! `session.session_id` is a primary key: concurrent creates of the same
//! deterministic session surface as a constraint violation, which the
//! resolver treats as "another request won the race".

pub const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS website (
    website_id  VARCHAR PRIMARY KEY,
    owner_id    VARCHAR NOT NULL,
    name        VARCHAR NOT NULL,
    domain      VARCHAR NOT NULL,
    share_id    VARCHAR,
    reset_at    TIMESTAMP,
    created_at  TIMESTAMP NOT NULL,
    deleted_at  TIMESTAMP
);

CREATE TABLE IF NOT EXISTS session (
    session_id   VARCHAR PRIMARY KEY,
    website_id   VARCHAR NOT NULL,
    hostname     VARCHAR,
    browser      VARCHAR,
    os           VARCHAR,
    device       VARCHAR,
    screen       VARCHAR,
    language     VARCHAR,
    country      VARCHAR,
    subdivision1 VARCHAR,
    subdivision2 VARCHAR,
    city         VARCHAR,
    created_at   TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS website_event (
    event_id        VARCHAR PRIMARY KEY,
    website_id      VARCHAR NOT NULL,
    session_id      VARCHAR NOT NULL,
    url_path        VARCHAR NOT NULL,
    url_query       VARCHAR,
    referrer_path   VARCHAR,
    referrer_query  VARCHAR,
    referrer_domain VARCHAR,
    page_title      VARCHAR,
    event_type      INTEGER NOT NULL,
    event_name      VARCHAR,
    created_at      TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS event_data (
    event_data_id       VARCHAR PRIMARY KEY,
    website_event_id    VARCHAR NOT NULL,
    website_id          VARCHAR NOT NULL,
    event_key           VARCHAR NOT NULL,
    event_data_type     INTEGER NOT NULL,
    event_string_value  VARCHAR,
    event_numeric_value DOUBLE,
    event_date_value    TIMESTAMP
);

CREATE TABLE IF NOT EXISTS account (
    user_id    VARCHAR PRIMARY KEY,
    username   VARCHAR NOT NULL UNIQUE,
    password   VARCHAR NOT NULL,
    role       VARCHAR NOT NULL,
    created_at TIMESTAMP NOT NULL,
    deleted_at TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_website_event_site_created
    ON website_event (website_id, created_at);
CREATE INDEX IF NOT EXISTS idx_session_site_created
    ON session (website_id, created_at);
CREATE INDEX IF NOT EXISTS idx_event_data_site
    ON event_data (website_id);
"#;
