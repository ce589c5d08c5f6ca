//! Traffic blocking: bot user agents, IP denylists, hostname denylists.
//!
//! Blocked beacons are dropped silently with a 200 so the filter's
//! existence never leaks to scanners.

use std::net::IpAddr;

use ipnet::IpNet;
use tracing::warn;
use woothee::parser::Parser;

use lumen_core::config::Config;

/// Denylist parsed once at startup from configuration.
pub struct Denylist {
    networks: Vec<IpNet>,
    addrs: Vec<IpAddr>,
    hostnames: Vec<String>,
    bot_check: bool,
}

impl Denylist {
    pub fn from_config(config: &Config) -> Self {
        let mut networks = Vec::new();
        let mut addrs = Vec::new();
        for entry in &config.ignore_ips {
            if let Ok(net) = entry.parse::<IpNet>() {
                networks.push(net);
            } else if let Ok(addr) = entry.parse::<IpAddr>() {
                addrs.push(addr);
            } else {
                warn!(entry, "unparseable ignore-ip entry, skipping");
            }
        }
        Self {
            networks,
            addrs,
            hostnames: config
                .ignore_hostnames
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
            bot_check: !config.disable_bot_check,
        }
    }

    pub fn blocks_ip(&self, ip: IpAddr) -> bool {
        self.addrs.contains(&ip) || self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Matched against the hostname the beacon reports, case-insensitive.
    pub fn blocks_hostname(&self, hostname: Option<&str>) -> bool {
        match hostname {
            Some(h) => {
                let lowered = h.to_lowercase();
                self.hostnames.iter().any(|blocked| *blocked == lowered)
            }
            None => false,
        }
    }

    /// Crawler UA or missing UA. Disabled via `LUMEN_DISABLE_BOT_CHECK`.
    pub fn blocks_user_agent(&self, user_agent: &str) -> bool {
        if !self.bot_check {
            return false;
        }
        if user_agent.trim().is_empty() {
            return true;
        }
        match Parser::new().parse(user_agent) {
            Some(result) => result.category == "crawler",
            None => false,
        }
    }

    pub fn should_block(&self, ip: Option<IpAddr>, hostname: Option<&str>, user_agent: &str) -> bool {
        ip.is_some_and(|ip| self.blocks_ip(ip))
            || self.blocks_hostname(hostname)
            || self.blocks_user_agent(user_agent)
    }
}
