//! NFS connection options and native URL translation
//!
//! Native URLs follow RFC 2054 (`nfs://<host>:<port><url-path>`) with the
//! client's connection flags glued right after the port digits:
//!
//! - `v2` / `v3`: protocol version
//! - `t`: force TCP, do not fall back to UDP
//! - `u`: force UDP
//! - `m`: force the mount protocol instead of the public filehandle
//!
//! `m` is always set so that shares without a public filehandle resolve.
//! With it the version is no longer negotiated (so it is always spelled out)
//! and the path must carry an extra leading slash, otherwise it is taken as
//! relative to the public filehandle.
//!
//! Example: `nfs://server:123v2um//path` is port 123, NFSv2 over UDP, mount
//! protocol.

use serde::Deserialize;
use tracing::debug;

use crate::address::{default_port, FileAddress};
use crate::config::NfsConfig;

/// Property holding the NFS version
pub const VERSION_PROPERTY: &str = "version";

/// Property holding the transport preference
pub const TRANSPORT_PROPERTY: &str = "transport";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum NfsVersion {
    #[default]
    #[serde(rename = "v2")]
    V2,
    #[serde(rename = "v3")]
    V3,
}

impl NfsVersion {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "v2" => Some(Self::V2),
            "v3" => Some(Self::V3),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }
}

/// Transport preference. `Auto` tries TCP first then falls back to UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum NfsTransport {
    #[default]
    Auto,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl NfsTransport {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Auto" => Some(Self::Auto),
            "TCP" => Some(Self::Tcp),
            "UDP" => Some(Self::Udp),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }

    const fn flag(self) -> &'static str {
        match self {
            Self::Auto => "",
            Self::Tcp => "t",
            Self::Udp => "u",
        }
    }
}

/// Connection options of one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfsOptions {
    pub version: NfsVersion,
    pub transport: NfsTransport,
}

impl NfsOptions {
    /// Read options from the address properties, `defaults` filling the gaps
    pub fn from_address(address: &FileAddress, defaults: &NfsConfig) -> Self {
        let version = address
            .property(VERSION_PROPERTY)
            .and_then(|v| {
                let parsed = NfsVersion::parse(v);
                if parsed.is_none() {
                    debug!(value = %v, "unknown NFS version, using default");
                }
                parsed
            })
            .unwrap_or(defaults.version);

        let transport = address
            .property(TRANSPORT_PROPERTY)
            .and_then(|v| {
                let parsed = NfsTransport::parse(v);
                if parsed.is_none() {
                    debug!(value = %v, "unknown NFS transport, using default");
                }
                parsed
            })
            .unwrap_or(defaults.transport);

        Self { version, transport }
    }
}

/// Native URL for `address`, using `options` as connection flags
pub fn native_url(address: &FileAddress, options: NfsOptions) -> String {
    let port = address
        .port()
        .filter(|p| default_port("nfs") != Some(*p))
        .map(|p| p.to_string())
        .unwrap_or_default();

    format!(
        "nfs://{}:{}{}{}m/{}",
        address.host(),
        port,
        options.version.as_str(),
        options.transport.flag(),
        address.path()
    )
}
