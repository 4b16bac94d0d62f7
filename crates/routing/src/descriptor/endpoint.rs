use std::{fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};
use vendor::prelude::shorthands::millis_limit;

use crate::error::DescriptorError;

/// A single addressable service instance with its time-outs.
/// All time-outs are in milliseconds, `0` means no limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    id: String,
    address: String,
    total_timeout_ms: u64,
    connect_timeout_ms: u64,
    socket_timeout_ms: u64,
    crc: u32,
}

#[inline]
fn _invalid_address(id: &str, address: &str, reason: &str) -> DescriptorError {
    DescriptorError::invalid(
        id,
        address,
        format!("{reason}, require scheme://host[:port][/path] or host:port"),
    )
}

/// Check `address` is a locator, either "http://10.0.0.1:80/api" or
/// a bare "10.0.0.1:80".
fn validate_address(id: &str, address: &str) -> Result<(), DescriptorError> {
    let authority = match address.find("://") {
        Some(split) => {
            let scheme = &address[..split];
            let mut chars = scheme.chars();
            let scheme_ok = chars.next().map_or(false, |c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !scheme_ok {
                return Err(_invalid_address(id, address, "malformed scheme"));
            }
            let rest = &address[split + 3..];
            rest.split(|c| matches!(c, '/' | '?' | '#')).next().unwrap_or("")
        }
        None => {
            // without scheme only "host:port" is accepted
            match address.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && !port.is_empty() => {}
                _ => return Err(_invalid_address(id, address, "missing scheme or port")),
            }
            if address.contains('/') {
                return Err(_invalid_address(id, address, "path without scheme"));
            }
            address
        }
    };

    if authority.is_empty() || authority.chars().any(char::is_whitespace) {
        return Err(_invalid_address(id, address, "missing host"));
    }
    if let Some((host, port)) = authority.rsplit_once(':') {
        // "[::1]" has colons but no port
        if host.is_empty() && !port.ends_with(']') {
            return Err(_invalid_address(id, address, "missing host"));
        }
        if !port.ends_with(']') && !port.is_empty() && port.parse::<u16>().is_err() {
            return Err(_invalid_address(id, address, "malformed port"));
        }
    }
    Ok(())
}

impl Endpoint {
    /// Create an endpoint, time-outs are kept as given.
    pub fn new(
        id: &str,
        address: &str,
        total_timeout_ms: u64,
        connect_timeout_ms: u64,
        socket_timeout_ms: u64,
    ) -> Result<Self, DescriptorError> {
        validate_address(id, address)?;
        Ok(Self {
            id: id.to_owned(),
            address: address.to_owned(),
            total_timeout_ms,
            connect_timeout_ms,
            socket_timeout_ms,
            crc: crc32fast::hash(address.as_bytes()),
        })
    }

    /// Endpoint whose connect and socket time-outs equal the total one.
    #[inline]
    pub fn with_total(id: &str, address: &str, total_timeout_ms: u64) -> Result<Self, DescriptorError> {
        Self::new(id, address, total_timeout_ms, total_timeout_ms, total_timeout_ms)
    }

    /// Configuration key this endpoint was built from, unique in its tree.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// CRC-32 checksum of the address.
    #[inline]
    pub fn crc(&self) -> u32 {
        self.crc
    }

    #[inline]
    pub fn total_timeout_ms(&self) -> u64 {
        self.total_timeout_ms
    }

    #[inline]
    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_ms
    }

    #[inline]
    pub fn socket_timeout_ms(&self) -> u64 {
        self.socket_timeout_ms
    }

    #[inline]
    pub fn total_timeout(&self) -> Option<Duration> {
        millis_limit(self.total_timeout_ms)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Option<Duration> {
        millis_limit(self.connect_timeout_ms)
    }

    #[inline]
    pub fn socket_timeout(&self) -> Option<Duration> {
        millis_limit(self.socket_timeout_ms)
    }

    /// `timeout_ms` as it applies within the total time-out: when the
    /// total is limited, an unlimited or larger value becomes the total.
    #[inline]
    fn within_total(&self, timeout_ms: u64) -> Option<Duration> {
        if self.total_timeout_ms > 0 && (timeout_ms == 0 || timeout_ms > self.total_timeout_ms) {
            millis_limit(self.total_timeout_ms)
        } else {
            millis_limit(timeout_ms)
        }
    }

    /// Connect time-out a transport should apply, never beyond the total.
    pub fn effective_connect_timeout(&self) -> Option<Duration> {
        self.within_total(self.connect_timeout_ms)
    }

    /// Socket time-out a transport should apply, never beyond the total.
    pub fn effective_socket_timeout(&self) -> Option<Duration> {
        self.within_total(self.socket_timeout_ms)
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.id, self.address)
    }
}
