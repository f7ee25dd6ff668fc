use axum::{
    extract::{connect_info::ConnectInfo, Request},
    http::HeaderMap,
};
use std::net::{IpAddr, SocketAddr};

/// Extract client IP from proxy headers and optional transport metadata.
pub fn extract_ip_from_headers(headers: &HeaderMap, fallback: Option<IpAddr>) -> IpAddr {
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(first) = h.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    if let Some(h) = headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()) {
        if let Ok(ip) = h.trim().parse::<IpAddr>() {
            return ip;
        }
    }
    fallback.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// The rate limiter's notion of "client": proxy headers first, then the
/// peer address when the server was started with connect info.
pub fn client_ip(req: &Request) -> IpAddr {
    let remote = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    extract_ip_from_headers(req.headers(), remote)
}
