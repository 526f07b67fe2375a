//! File addresses
//!
//! A [`FileAddress`] is the parsed form of `protocol://host[:port]/path`.
//! Protocol specific connection options (NFS version, transport, ...) live in
//! a string property bag rather than in the path, so the path always stays
//! the logical location of the file.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Result, VfsError};

/// Path separator used by every address, whatever the backend
pub const SEPARATOR: char = '/';

/// Well-known port of a protocol, if it has one
pub fn default_port(protocol: &str) -> Option<u16> {
    match protocol {
        "nfs" => Some(2049),
        "ftp" => Some(21),
        "sftp" => Some(22),
        "smb" => Some(445),
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Parsed, cloneable location of a file
#[derive(Debug, Clone)]
pub struct FileAddress {
    protocol: String,
    host: String,
    port: Option<u16>,
    path: String,
    properties: BTreeMap<String, String>,
}

impl FileAddress {
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        path: &str,
    ) -> Self {
        Self {
            protocol: protocol.into().to_ascii_lowercase(),
            host: host.into(),
            port,
            path: normalize_path(path),
            properties: BTreeMap::new(),
        }
    }

    /// Parse `protocol://host[:port]/path`
    pub fn parse(input: &str) -> Result<Self> {
        let (protocol, rest) = input
            .split_once("://")
            .ok_or_else(|| VfsError::invalid_address(input, "missing protocol separator"))?;

        if protocol.is_empty() {
            return Err(VfsError::invalid_address(input, "empty protocol"));
        }

        let slash_pos = rest.find(SEPARATOR).unwrap_or(rest.len());
        let authority = &rest[..slash_pos];
        let path = &rest[slash_pos..];

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, "")) => (host, None),
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| VfsError::invalid_address(input, "invalid port number"))?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        Ok(Self::new(protocol, host, port, path))
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, `None` when the protocol default applies
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn set_port(&mut self, port: Option<u16>) {
        self.port = port;
    }

    /// Canonical path: leading separator, no trailing separator, `/` for root
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: &str) {
        self.path = normalize_path(path);
    }

    /// Last path segment, empty for the root
    pub fn name(&self) -> &str {
        self.path.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Address of the enclosing directory, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.path.rfind(SEPARATOR)?;
        let mut parent = self.clone();
        parent.path = if idx == 0 {
            "/".to_string()
        } else {
            self.path[..idx].to_string()
        };
        Some(parent)
    }

    /// Address of `name` inside this directory, connection properties included
    pub fn child(&self, name: &str) -> Self {
        let mut base = self.path.clone();
        if !base.ends_with(SEPARATOR) {
            base.push(SEPARATOR);
        }
        base.push_str(name.trim_start_matches(SEPARATOR));

        let mut child = self.clone();
        child.set_path(&base);
        child
    }

    /// Port to print: hidden when unspecified or equal to the protocol default
    fn visible_port(&self) -> Option<u16> {
        self.port.filter(|p| default_port(&self.protocol) != Some(*p))
    }
}

/// Ensure a leading separator, collapse repeats and drop any trailing one
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    out
}

impl fmt::Display for FileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.host)?;
        if let Some(port) = self.visible_port() {
            write!(f, ":{port}")?;
        }
        if !self.is_root() {
            f.write_str(&self.path)?;
        }
        Ok(())
    }
}

impl PartialEq for FileAddress {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for FileAddress {}

impl Hash for FileAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl std::str::FromStr for FileAddress {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
