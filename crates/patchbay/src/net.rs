// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Small address helpers used when rebasing relay ports onto advertised
//! hosts.

use crate::error::Error;

/// Split a `host:port` string into its parts.
///
/// The host may be an IP literal or a DNS name; IPv6 literals use the
/// usual bracketed form.
pub fn split_host_port(addr: &str) -> Result<(String, u16), Error> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::Protocol(format!("invalid address: {}", addr)))?;

    let port: u16 = port
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid port in address: {}", addr)))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(Error::Protocol(format!("invalid address: {}", addr)));
    }

    Ok((host.to_string(), port))
}

/// The host part of a `host:port` string.
pub fn host_of(addr: &str) -> Result<String, Error> {
    split_host_port(addr).map(|(host, _)| host)
}

/// Rebase the port of `bound` onto the host of `advertised`.
///
/// Relay listeners bind ephemeral ports on their local interface; the
/// address handed to the next hop must carry the advertised host instead
/// of the bind host.
pub fn rebase_port(advertised: &str, bound: &str) -> Result<String, Error> {
    let (host, _) = split_host_port(advertised)?;
    let (_, port) = split_host_port(bound)?;

    if host.contains(':') {
        Ok(format!("[{}]:{}", host, port))
    } else {
        Ok(format!("{}:{}", host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("127.0.0.1:1337").unwrap(),
            ("127.0.0.1".to_string(), 1337)
        );
        assert_eq!(
            split_host_port("example.com:80").unwrap(),
            ("example.com".to_string(), 80)
        );
        assert_eq!(
            split_host_port("[::1]:9000").unwrap(),
            ("::1".to_string(), 9000)
        );
    }

    #[test]
    fn test_split_host_port_invalid() {
        assert!(split_host_port("no-port").is_err());
        assert!(split_host_port(":x").is_err());
        assert!(split_host_port(":80").is_err());
    }

    #[test]
    fn test_rebase_port() {
        assert_eq!(
            rebase_port("203.0.113.7:1340", "127.0.0.1:49152").unwrap(),
            "203.0.113.7:49152"
        );
        assert_eq!(
            rebase_port("[2001:db8::1]:1340", "127.0.0.1:49152").unwrap(),
            "[2001:db8::1]:49152"
        );
    }
}
