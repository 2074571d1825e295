//! Client IP extraction and normalization.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::http::HeaderMap;

use crate::ratelimit::constants::IPV6_PREFIX_SEGMENTS;

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?;
    // X-Forwarded-For is "client, proxy1, proxy2"; the client is first.
    value.split(',').next()?.trim().parse().ok()
}

/// Resolve the client IP for a request.
///
/// With `trust_proxy`, the first X-Forwarded-For hop wins, then X-Real-IP.
/// Otherwise (or if neither parses) the socket address, or 127.0.0.1.
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> IpAddr {
    let forwarded = trust_proxy
        .then(|| header_ip(headers, "x-forwarded-for").or_else(|| header_ip(headers, "x-real-ip")))
        .flatten();

    forwarded
        .or_else(|| peer.map(|p| p.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Normalize an IP address into a rate limit key.
///
/// IPv4 addresses are kept as-is. IPv6 addresses collapse to their /64
/// prefix, which is what a single subscriber is usually allocated.
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return v4.to_string();
            }
            let prefix: Vec<String> = v6.segments()[..IPV6_PREFIX_SEGMENTS]
                .iter()
                .map(|s| format!("{s:x}"))
                .collect();
            format!("{}::/64", prefix.join(":"))
        }
    }
}
