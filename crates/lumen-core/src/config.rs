use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub geoip_path: String,
    /// Overrides the database-path fallback for secret derivation.
    pub app_secret: Option<String>,
    /// Enables the in-process cache in front of website/session lookups.
    pub cache: CacheMode,
    /// Extra header consulted first when extracting the client IP.
    pub client_ip_header: Option<String>,
    /// Comma-separated IPs and CIDR ranges whose beacons are dropped.
    pub ignore_ips: Vec<String>,
    /// Hostnames whose beacons are dropped.
    pub ignore_hostnames: Vec<String>,
    pub disable_bot_check: bool,
    pub remove_trailing_slash: bool,
    pub deploy_mode: DeployMode,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheMode {
    Disabled,
    Memory,
}

/// Hosted deployments tombstone deleted entities; self-hosted deployments
/// remove the rows outright.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployMode {
    SelfHosted,
    Hosted,
}

impl DeployMode {
    pub fn soft_delete(&self) -> bool {
        matches!(self, DeployMode::Hosted)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("LUMEN_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("LUMEN_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            geoip_path: std::env::var("LUMEN_GEOIP_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            app_secret: std::env::var("LUMEN_APP_SECRET").ok().filter(|s| !s.is_empty()),
            cache: match std::env::var("LUMEN_CACHE").as_deref() {
                Ok("memory") => CacheMode::Memory,
                _ => CacheMode::Disabled,
            },
            client_ip_header: std::env::var("LUMEN_CLIENT_IP_HEADER")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase()),
            ignore_ips: split_list(std::env::var("LUMEN_IGNORE_IP").ok()),
            ignore_hostnames: split_list(std::env::var("LUMEN_IGNORE_HOSTNAME").ok()),
            disable_bot_check: std::env::var("LUMEN_DISABLE_BOT_CHECK")
                .map(|v| v == "true")
                .unwrap_or(false),
            remove_trailing_slash: std::env::var("LUMEN_REMOVE_TRAILING_SLASH")
                .map(|v| v == "true")
                .unwrap_or(false),
            deploy_mode: match std::env::var("LUMEN_MODE").as_deref() {
                Ok("hosted") => DeployMode::Hosted,
                _ => DeployMode::SelfHosted,
            },
            cors_origins: split_list(std::env::var("LUMEN_CORS_ORIGINS").ok()),
        })
    }

    /// Path of the DuckDB database file. Doubles as the secret-derivation
    /// fallback when no app secret is configured.
    pub fn database_path(&self) -> String {
        format!("{}/lumen.db", self.data_dir)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(5)
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empties() {
        let items = split_list(Some(" 10.0.0.1, 192.168.0.0/16 ,,".to_string()));
        assert_eq!(items, vec!["10.0.0.1", "192.168.0.0/16"]);
        assert!(split_list(None).is_empty());
    }
}
