//! Deterministic identity derivation.
//!
//! Session IDs are a keyed hash of `(website_id, hostname, ip, user_agent)`
//! plus a salt that rotates on calendar-month boundaries. Repeat beacons from
//! the same visitor therefore collapse into one session without any stored
//! cookie, and identities cannot be linked across months.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

/// sha512 of the concatenated parts, hex encoded.
pub fn hash(parts: &[&str]) -> String {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Stable application secret: hash of the configured secret, or of the
/// database path when no secret is configured. Stable across restarts for a
/// fixed configuration.
pub fn derive_secret(app_secret: Option<&str>, database_path: &str) -> String {
    hash(&[app_secret.unwrap_or(database_path)])
}

/// The first instant of the calendar month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    // Day 1 of the current month always exists.
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Monthly rotating salt, a pure function of the injected clock.
///
/// `hash(secret, hash(start_of_month))` — the value changes once per calendar
/// month without any external storage.
pub fn rotating_salt(secret: &str, now: DateTime<Utc>) -> String {
    let month_hash = hash(&[&start_of_month(now).to_rfc2822()]);
    hash(&[secret, &month_hash])
}

/// Derive a namespaced deterministic identifier from `parts`.
///
/// With no parts, returns a fresh random v4 UUID. Otherwise hashes the parts
/// together with the current salt and derives a v5 UUID from that hash in the
/// DNS namespace. Calls with identical parts within one salt window yield the
/// same value; across a month boundary they differ.
pub fn derive_id(secret: &str, now: DateTime<Utc>, parts: &[&str]) -> Uuid {
    if parts.is_empty() {
        return Uuid::new_v4();
    }
    let salt = rotating_salt(secret, now);
    let mut keyed: Vec<&str> = parts.to_vec();
    keyed.push(&salt);
    let digest = hash(&keyed);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, digest.as_bytes())
}

/// Fast content hash for cache keys and realtime dedup IDs.
///
/// sha256 truncated to 8 bytes (16 hex chars) — collision-resistant enough
/// for de-duplication, not security sensitive.
pub fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    let out = hasher.finalize();
    hex::encode(&out[..8])
}
