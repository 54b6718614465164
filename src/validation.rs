//! Pre-submission URL validation
//!
//! Requests are rejected here synchronously, before a job record exists, so
//! a rejected submission never occupies an id or a worker slot. The checks
//! also refuse URLs pointing into private or otherwise non-routable address
//! space, since the fetcher runs server-side.

use crate::error::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// IPv4 networks the fetcher must never be pointed at, as (network, prefix length)
const BLOCKED_V4_NETS: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// Validate a media URL before accepting it as a job
///
/// Rules:
/// - scheme must be http or https
/// - a host component must be present
/// - hostnames may only contain letters, digits, dots, and hyphens
/// - IP-literal hosts must not fall into a blocked range
///
/// The error messages are surfaced to the client verbatim.
pub fn validate_url(raw: &str) -> Result<()> {
    let parsed = Url::parse(raw).map_err(|e| match e {
        url::ParseError::EmptyHost => Error::Validation("URL missing host component".to_string()),
        _ => Error::Validation("URL must start with http:// or https://".to_string()),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Validation(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    match parsed.host() {
        None => Err(Error::Validation(
            "URL missing host component".to_string(),
        )),
        Some(Host::Domain(domain)) => {
            if domain.is_empty() || !domain.chars().all(is_host_char) {
                return Err(Error::Validation("Invalid host format".to_string()));
            }
            Ok(())
        }
        Some(Host::Ipv4(addr)) => {
            if is_blocked_v4(addr) {
                return Err(disallowed_range());
            }
            Ok(())
        }
        Some(Host::Ipv6(addr)) => {
            if is_blocked_v6(addr) {
                return Err(disallowed_range());
            }
            Ok(())
        }
    }
}

/// Validate a user-supplied output filename
///
/// The filename becomes a path component under the download directory, so
/// separators and parent references are rejected outright.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Filename must not be empty".to_string()));
    }
    if name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(Error::Validation(
            "Filename must not contain path components".to_string(),
        ));
    }
    Ok(())
}

fn disallowed_range() -> Error {
    Error::Validation("URL points to a disallowed IP range".to_string())
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-'
}

fn is_blocked_v4(addr: Ipv4Addr) -> bool {
    BLOCKED_V4_NETS
        .iter()
        .any(|&(net, prefix)| in_v4_net(addr, net, prefix))
}

fn in_v4_net(addr: Ipv4Addr, net: Ipv4Addr, prefix: u8) -> bool {
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    (u32::from(addr) & mask) == (u32::from(net) & mask)
}

fn is_blocked_v6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() || addr.is_multicast() {
        return true;
    }
    let first = addr.segments()[0];
    // fc00::/7 unique local, fe80::/10 link local
    if (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80 {
        return true;
    }
    // v4-mapped addresses inherit the v4 block list
    addr.to_ipv4_mapped().is_some_and(is_blocked_v4)
}
