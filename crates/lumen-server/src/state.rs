use std::sync::Arc;

use tracing::warn;

use lumen_core::cache::{CacheStore, MemoryCache};
use lumen_core::config::{CacheMode, Config};
use lumen_core::identity::derive_secret;
use lumen_duckdb::DuckDbBackend;

use crate::block::Denylist;

/// Shared application state injected into every handler via
/// [`axum::extract::State`]. Heavy resources live behind `Arc`, so handler
/// clones are cheap.
pub struct AppState {
    pub db: Arc<DuckDbBackend>,
    pub config: Arc<Config>,
    pub cache: CacheStore,
    /// Derived once at startup; keys identity derivation and cache tokens.
    pub secret: String,
    pub geoip: Option<Arc<maxminddb::Reader<Vec<u8>>>>,
    pub denylist: Denylist,
}

impl AppState {
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let cache = match config.cache {
            CacheMode::Memory => CacheStore::new(Arc::new(MemoryCache::new())),
            CacheMode::Disabled => CacheStore::disabled(),
        };
        let secret = derive_secret(config.app_secret.as_deref(), &config.database_path());
        let geoip = match maxminddb::Reader::open_readfile(&config.geoip_path) {
            Ok(reader) => Some(Arc::new(reader)),
            Err(e) => {
                warn!(path = %config.geoip_path, error = %e,
                    "geo database unavailable, events stored without location");
                None
            }
        };
        let denylist = Denylist::from_config(&config);
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            cache,
            secret,
            geoip,
            denylist,
        }
    }
}
