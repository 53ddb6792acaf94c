use std::net::{IpAddr, SocketAddr};

/// A network address as reported by the daemon: either a bare IP or an
/// `ip:port` pair. Anything else is kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalAddr<'a> {
    Ip(IpAddr),
    Socket(SocketAddr),
    Raw(&'a str),
}

pub fn canonicalize(input: &str) -> CanonicalAddr<'_> {
    let trimmed = input.trim();
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return CanonicalAddr::Ip(ip);
    }
    if let Ok(sock) = trimmed.parse::<SocketAddr>() {
        return CanonicalAddr::Socket(sock);
    }
    CanonicalAddr::Raw(input)
}

/// Compares two textual addresses by value, so `::1` and
/// `0000:0000:0000:0000:0000:0000:0000:0001` are the same address.
pub fn same_address(a: &str, b: &str) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// Fully expanded textual form of an IP address (eight zero-padded groups for
/// IPv6, dotted quad for IPv4).
pub fn expanded(input: &str) -> Option<String> {
    let ip: IpAddr = input.trim().parse().ok()?;
    Some(match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => v6
            .segments()
            .iter()
            .map(|s| format!("{:04x}", s))
            .collect::<Vec<_>>()
            .join(":"),
    })
}

/// True for empty strings and the unspecified address (`::`, `0.0.0.0`).
pub fn is_unspecified(input: &str) -> bool {
    match canonicalize(input) {
        CanonicalAddr::Ip(ip) => ip.is_unspecified(),
        CanonicalAddr::Socket(sock) => sock.ip().is_unspecified(),
        CanonicalAddr::Raw(raw) => raw.trim().is_empty(),
    }
}
