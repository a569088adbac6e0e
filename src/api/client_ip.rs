use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|ip| ip.trim().parse().ok())
        .collect()
}

/// Resolve the address a login attempt is charged to.
///
/// Forwarding headers are only honored when the socket peer is one of
/// `trusted_proxies`. The rightmost forwarded hop that is not itself a trusted
/// proxy wins, since anything left of it was supplied by the client.
pub fn resolve_client_ip(
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    trusted_proxies: &[IpAddr],
) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };
    let peer_ip = peer.ip();
    if !trusted_proxies.contains(&peer_ip) {
        return peer_ip.to_string();
    }

    if let Some(ip) = forwarded_chain(headers)
        .into_iter()
        .rev()
        .find(|ip| !trusted_proxies.contains(ip))
    {
        return ip.to_string();
    }
    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(val) = real_ip.to_str()
        && let Ok(ip) = val.trim().parse::<IpAddr>()
    {
        return ip.to_string();
    }
    peer_ip.to_string()
}
