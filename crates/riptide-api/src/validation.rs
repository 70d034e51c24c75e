//! SSRF blocklist for embed URLs submitted to `/extract`.

use std::net::{IpAddr, Ipv4Addr};

use crate::errors::ApiError;

/// Validates that an embed URL is well-formed, uses an allowed scheme, and
/// does not resolve to a host the service should never fetch on the caller's
/// behalf.
pub fn validate_embed_url(raw: &str) -> Result<url::Url, ApiError> {
    let parsed = url::Url::parse(raw).map_err(|_| ApiError::Validation(format!("invalid embed URL: {raw}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ApiError::Validation(format!("unsupported scheme: {other}"))),
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| ApiError::Validation("embed URL has no host".to_string()))?;

    if host.eq_ignore_ascii_case("localhost") {
        return Err(ApiError::Validation("embed URL targets localhost".to_string()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(ApiError::Validation(format!("embed URL targets a blocked address: {host}")));
        }
    }

    Ok(parsed)
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    match a {
        127 | 10 | 0 => true,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        169 => b == 254,
        _ => false,
    }
}
