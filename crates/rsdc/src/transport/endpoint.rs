// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Minimal absolute-URL handling for XAddrs and NotifyTo addresses.

use super::TransportError;
use std::fmt;

/// URL scheme of an SDC transport address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A parsed `http(s)://host:port/path` transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    /// Parse an absolute HTTP(S) URL.
    ///
    /// # Errors
    ///
    /// `InvalidEndpoint` for other schemes, empty hosts, or bad ports.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidEndpoint(url.to_string());
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else {
            return Err(invalid());
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(invalid());
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port: u16 = p.parse().map_err(|_| invalid())?;
                (h, port)
            }
            None => (authority, scheme.default_port()),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// `host:port` for socket connection.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Key identifying the connection pool bucket of this endpoint.
    #[must_use]
    pub fn pool_key(&self) -> (Scheme, String, u16) {
        (self.scheme, self.host.clone(), self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_port_and_path() {
        let e = Endpoint::parse("http://192.168.0.5:8080/dev/abc").expect("valid URL");
        assert_eq!(e.scheme, Scheme::Http);
        assert_eq!(e.host, "192.168.0.5");
        assert_eq!(e.port, 8080);
        assert_eq!(e.path, "/dev/abc");
        assert_eq!(e.to_string(), "http://192.168.0.5:8080/dev/abc");
    }

    #[test]
    fn default_ports() {
        assert_eq!(Endpoint::parse("http://a").expect("valid").port, 80);
        assert_eq!(Endpoint::parse("https://a/x").expect("valid").port, 443);
    }

    #[test]
    fn rejects_other_schemes_and_empty_hosts() {
        assert!(Endpoint::parse("ftp://a/x").is_err());
        assert!(Endpoint::parse("http:///x").is_err());
        assert!(Endpoint::parse("http://a:notaport/").is_err());
    }
}
