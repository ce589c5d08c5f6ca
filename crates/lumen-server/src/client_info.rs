//! Client detail resolution: IP extraction, geolocation, UA parsing,
//! device classification.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use maxminddb::geoip2;
use woothee::parser::Parser;

use lumen_core::filters::percent_decode;

const DESKTOP_SCREEN_WIDTH: u32 = 1920;
const LAPTOP_SCREEN_WIDTH: u32 = 1024;
const MOBILE_SCREEN_WIDTH: u32 = 479;

/// Everything derived from the request itself rather than the beacon body.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub user_agent: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub country: Option<String>,
    pub subdivision1: Option<String>,
    pub subdivision2: Option<String>,
    pub city: Option<String>,
}

/// Socket peer address, when the server was started with connect info.
/// Absent under test harnesses that drive the router directly.
pub struct ClientAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Client IP in priority order: configured custom header, CDN header,
/// first `x-forwarded-for` hop, socket peer.
pub fn extract_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    custom_header: Option<&str>,
) -> Option<IpAddr> {
    if let Some(name) = custom_header {
        if let Some(ip) = header_str(headers, name).and_then(|v| v.parse().ok()) {
            return Some(ip);
        }
    }
    if let Some(ip) = header_str(headers, "cf-connecting-ip").and_then(|v| v.parse().ok()) {
        return Some(ip);
    }
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .and_then(|v| v.parse().ok())
        {
            return Some(ip);
        }
    }
    peer
}

/// Addresses that can never geolocate meaningfully.
fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub subdivision1: Option<String>,
    pub subdivision2: Option<String>,
    pub city: Option<String>,
}

/// Geolocate the client. Proxy-provided geo headers win over the local
/// database; private addresses resolve to nothing at all.
pub fn lookup_geo(
    reader: Option<&maxminddb::Reader<Vec<u8>>>,
    headers: &HeaderMap,
    ip: Option<IpAddr>,
) -> GeoLocation {
    if ip.is_some_and(is_private) {
        return GeoLocation::default();
    }

    if let Some(country) = header_str(headers, "x-vercel-ip-country") {
        return GeoLocation {
            country: Some(country.to_string()),
            subdivision1: header_str(headers, "x-vercel-ip-country-region").map(Into::into),
            subdivision2: None,
            city: header_str(headers, "x-vercel-ip-city").map(percent_decode),
        };
    }

    let (Some(reader), Some(ip)) = (reader, ip) else {
        return GeoLocation::default();
    };
    let Ok(Some(city)) = reader.lookup::<geoip2::City>(ip) else {
        return GeoLocation::default();
    };

    let mut subdivisions = city
        .subdivisions
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| s.iso_code.map(str::to_string));
    GeoLocation {
        country: city
            .country
            .and_then(|c| c.iso_code)
            .map(str::to_string),
        subdivision1: subdivisions.next(),
        subdivision2: subdivisions.next(),
        city: city
            .city
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").map(|n| n.to_string())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserAgentInfo {
    pub browser: Option<String>,
    pub os: Option<String>,
}

pub fn parse_user_agent(user_agent: &str) -> UserAgentInfo {
    let Some(result) = Parser::new().parse(user_agent) else {
        return UserAgentInfo::default();
    };
    let known = |s: &str| {
        if s.is_empty() || s == "UNKNOWN" {
            None
        } else {
            Some(s.to_string())
        }
    };
    UserAgentInfo {
        browser: known(result.name),
        os: known(result.os),
    }
}

fn is_desktop_os(os: &str) -> bool {
    let os = os.to_lowercase();
    os.contains("windows") && !os.contains("phone") && !os.contains("mobile")
        || os.contains("mac")
        || os.contains("linux")
        || os.contains("bsd")
        || os.contains("chrome os")
        || os.contains("chromeos")
}

fn is_mobile_os(os: &str) -> bool {
    let os = os.to_lowercase();
    os.contains("ios")
        || os.contains("iphone")
        || os.contains("ipad")
        || os.contains("android")
        || os.contains("blackberry")
        || os.contains("windows phone")
}

/// Classify the device from screen width and OS family.
///
/// The OS family decides which side of the width thresholds matters: a
/// desktop OS is at least a laptop, a mobile OS is at most a tablet.
pub fn detect_device(screen: Option<&str>, os: Option<&str>) -> Option<String> {
    let width: u32 = screen?.split(['x', 'X']).next()?.trim().parse().ok()?;
    let device = match os {
        Some(os) if is_desktop_os(os) => {
            if width < DESKTOP_SCREEN_WIDTH {
                "laptop"
            } else {
                "desktop"
            }
        }
        Some(os) if is_mobile_os(os) => {
            if width > MOBILE_SCREEN_WIDTH {
                "tablet"
            } else {
                "mobile"
            }
        }
        _ => {
            if width >= DESKTOP_SCREEN_WIDTH {
                "desktop"
            } else if width >= LAPTOP_SCREEN_WIDTH {
                "laptop"
            } else if width >= MOBILE_SCREEN_WIDTH {
                "tablet"
            } else {
                "mobile"
            }
        }
    };
    Some(device.to_string())
}

/// Resolve everything in one pass.
pub fn resolve_client(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    custom_ip_header: Option<&str>,
    geoip: Option<&maxminddb::Reader<Vec<u8>>>,
    screen: Option<&str>,
) -> ClientInfo {
    let user_agent = header_str(headers, "user-agent").unwrap_or("").to_string();
    let ip = extract_ip(headers, peer, custom_ip_header);
    let geo = lookup_geo(geoip, headers, ip);
    let ua = parse_user_agent(&user_agent);
    let device = detect_device(screen, ua.os.as_deref());
    ClientInfo {
        ip,
        user_agent,
        browser: ua.browser,
        os: ua.os,
        device,
        country: geo.country,
        subdivision1: geo.subdivision1,
        subdivision2: geo.subdivision2,
        city: geo.city,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn custom_header_wins_over_everything() {
        let map = headers(&[
            ("x-real-ip", "198.51.100.7"),
            ("cf-connecting-ip", "198.51.100.8"),
            ("x-forwarded-for", "198.51.100.9, 10.0.0.1"),
        ]);
        let peer = Some("192.0.2.1".parse().unwrap());
        assert_eq!(
            extract_ip(&map, peer, Some("x-real-ip")),
            Some("198.51.100.7".parse().unwrap())
        );
        assert_eq!(
            extract_ip(&map, peer, None),
            Some("198.51.100.8".parse().unwrap())
        );
    }

    #[test]
    fn forwarded_for_uses_the_first_hop() {
        let map = headers(&[("x-forwarded-for", " 198.51.100.9 , 10.0.0.1")]);
        assert_eq!(
            extract_ip(&map, None, None),
            Some("198.51.100.9".parse().unwrap())
        );
    }

    #[test]
    fn peer_is_the_last_resort() {
        let peer = Some("192.0.2.1".parse().unwrap());
        assert_eq!(extract_ip(&HeaderMap::new(), peer, None), peer);
        assert_eq!(extract_ip(&HeaderMap::new(), None, None), None);
    }

    #[test]
    fn private_addresses_never_geolocate() {
        let map = headers(&[("x-vercel-ip-country", "US")]);
        let geo = lookup_geo(None, &map, Some("127.0.0.1".parse().unwrap()));
        assert!(geo.country.is_none());
        let geo = lookup_geo(None, &map, Some("10.1.2.3".parse().unwrap()));
        assert!(geo.country.is_none());
    }

    #[test]
    fn proxy_geo_headers_are_used_when_present() {
        let map = headers(&[
            ("x-vercel-ip-country", "NL"),
            ("x-vercel-ip-country-region", "NH"),
            ("x-vercel-ip-city", "The%20Hague"),
        ]);
        let geo = lookup_geo(None, &map, Some("203.0.113.9".parse().unwrap()));
        assert_eq!(geo.country.as_deref(), Some("NL"));
        assert_eq!(geo.subdivision1.as_deref(), Some("NH"));
        assert_eq!(geo.city.as_deref(), Some("The Hague"));
    }

    #[test]
    fn device_classification_follows_os_family() {
        // Desktop OS below the desktop threshold is a laptop.
        assert_eq!(
            detect_device(Some("1440x900"), Some("Mac OSX")).as_deref(),
            Some("laptop")
        );
        assert_eq!(
            detect_device(Some("2560x1440"), Some("Windows 10")).as_deref(),
            Some("desktop")
        );
        // Mobile OS above the phone threshold is a tablet.
        assert_eq!(
            detect_device(Some("1024x1366"), Some("iOS")).as_deref(),
            Some("tablet")
        );
        assert_eq!(
            detect_device(Some("390x844"), Some("iOS")).as_deref(),
            Some("mobile")
        );
        // Unknown OS falls back to width thresholds alone.
        assert_eq!(
            detect_device(Some("800x600"), None).as_deref(),
            Some("tablet")
        );
        assert_eq!(detect_device(None, Some("iOS")), None);
        assert_eq!(detect_device(Some("bogus"), None), None);
    }

    #[test]
    fn user_agent_parsing_extracts_browser_and_os() {
        let ua = parse_user_agent(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(ua.browser.as_deref(), Some("Chrome"));
        assert!(ua.os.is_some());
    }
}
