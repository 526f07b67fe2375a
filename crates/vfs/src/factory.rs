//! File factory - turns addresses into adapters
//!
//! Features:
//! - Backend registry keyed by protocol (register / swap / remove at runtime)
//! - Archive decoration of resolved files through registered codecs
//! - Adapters receive the factory itself so they can resolve their parents

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::debug;

use crate::address::FileAddress;
use crate::archive::{ArchiveCodec, ArchiveFile};
use crate::backend::FileAdapter;
use crate::error::{Result, VfsError};

/// Address resolution, as seen by adapters and callers
pub trait FileResolver: Send + Sync {
    /// Adapter for `address`, archive-decorated when applicable
    fn resolve(&self, address: &FileAddress) -> Result<Arc<dyn FileAdapter>>;

    /// Substitute `file` with an archive view if it looks like an archive
    fn wrap_archive(&self, file: Arc<dyn FileAdapter>) -> Arc<dyn FileAdapter>;
}

/// Builds the adapter of one protocol
pub type BackendConstructor =
    Box<dyn Fn(FileAddress, Arc<dyn FileResolver>) -> Result<Arc<dyn FileAdapter>> + Send + Sync>;

/// Protocol registry implementing [`FileResolver`]
pub struct FileFactory {
    /// Registered backends, keyed by lower-case protocol
    backends: RwLock<HashMap<String, BackendConstructor>>,
    /// Archive codecs, tried in registration order
    codecs: RwLock<Vec<Arc<dyn ArchiveCodec>>>,
    self_ref: Weak<FileFactory>,
}

impl FileFactory {
    /// Create an empty factory
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            backends: RwLock::new(HashMap::new()),
            codecs: RwLock::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Backend Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Register (or replace) the backend of a protocol
    pub fn register_backend(&self, protocol: &str, constructor: BackendConstructor) {
        let protocol = protocol.to_ascii_lowercase();
        debug!(protocol = %protocol, "registering backend");
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(protocol, constructor);
    }

    pub fn remove_backend(&self, protocol: &str) {
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&protocol.to_ascii_lowercase());
    }

    /// Registered protocols, sorted
    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn register_archive_codec(&self, codec: Arc<dyn ArchiveCodec>) {
        self.codecs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(codec);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Parse then resolve
    pub fn resolve_str(&self, address: &str) -> Result<Arc<dyn FileAdapter>> {
        self.resolve(&FileAddress::parse(address)?)
    }

    fn as_resolver(&self) -> Result<Arc<dyn FileResolver>> {
        let this = self
            .self_ref
            .upgrade()
            .ok_or_else(|| VfsError::io("file factory has been dropped"))?;
        Ok(this)
    }
}

impl FileResolver for FileFactory {
    fn resolve(&self, address: &FileAddress) -> Result<Arc<dyn FileAdapter>> {
        let resolver = self.as_resolver()?;
        let file = {
            let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
            let constructor = backends
                .get(address.protocol())
                .ok_or_else(|| VfsError::NotFound(address.to_string()))?;
            constructor(address.clone(), resolver)?
        };
        debug!(address = %address, "resolved file");
        Ok(self.wrap_archive(file))
    }

    fn wrap_archive(&self, file: Arc<dyn FileAdapter>) -> Arc<dyn FileAdapter> {
        if file.as_archive().is_some() {
            return file;
        }
        let codec = {
            let codecs = self.codecs.read().unwrap_or_else(PoisonError::into_inner);
            let name = file.name();
            codecs.iter().find(|c| c.accepts(&name)).cloned()
        };
        match codec {
            Some(codec) => Arc::new(ArchiveFile::new(file, codec)),
            None => file,
        }
    }
}
