use hyper::HeaderMap;
use std::net::{IpAddr, SocketAddr};

pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Pick the address the DNS record should point at.
///
/// Order: explicit `ip` parameter, `X-Real-IP`, first `X-Forwarded-For` hop,
/// then the peer address. Returns an empty string when nothing usable is found.
pub fn target_ip(explicit: Option<&str>, headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    if let Some(ip) = explicit.map(str::trim).filter(|ip| !ip.is_empty()) {
        return ip.to_string();
    }

    if let Some(ip) = header_str(headers, X_REAL_IP) {
        return ip.to_string();
    }

    if let Some(forwarded) = header_str(headers, X_FORWARDED_FOR) {
        let first_hop = forwarded.split(',').next().unwrap_or_default();
        let ip = strip_port(first_hop);
        if !ip.is_empty() {
            return ip;
        }
    }

    remote_addr.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Remove a trailing `:port` while leaving bare IPv6 addresses intact.
pub fn strip_port(value: &str) -> String {
    let value = value.trim();
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    if value.parse::<IpAddr>().is_ok() {
        return value.to_string();
    }
    match value.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            host.to_string()
        }
        _ => value.trim_start_matches('[').trim_end_matches(']').to_string(),
    }
}
