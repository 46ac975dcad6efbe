//! Mapping an inbound connection to the identity the rate limiter keys on.

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderMap, HeaderName};
use spigot_core::ClientIdentity;

/// Resolves the client IP, honouring the real-IP header only from trusted
/// proxies. Any other peer is identified by its socket address, so a direct
/// client cannot pick its own identity by sending the header.
#[derive(Clone, Debug)]
pub struct IdentityResolver {
    header: HeaderName,
    trusted_proxies: Vec<IpAddr>,
}

impl IdentityResolver {
    pub fn new(header: HeaderName, trusted_proxies: Vec<IpAddr>) -> Self {
        Self {
            header,
            trusted_proxies: trusted_proxies.into_iter().map(|ip| ip.to_canonical()).collect(),
        }
    }

    pub fn resolve(&self, peer: SocketAddr, headers: &HeaderMap) -> ClientIdentity {
        let peer_ip = peer.ip().to_canonical();
        let ip = if self.trusted_proxies.contains(&peer_ip) {
            self.forwarded_ip(headers).unwrap_or(peer_ip)
        } else {
            peer_ip
        };
        ClientIdentity::new(ip.to_string())
    }

    /// First address in the header. `X-Forwarded-For` lists the client first.
    fn forwarded_ip(&self, headers: &HeaderMap) -> Option<IpAddr> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
            .map(|ip| ip.to_canonical())
    }
}
