//! NFS backend
//!
//! [`NfsFile`] gives access to files on an NFS/WebNFS server through a
//! native client library (see [`native`]). The host part of the address
//! designates the server; connection options travel as address properties:
//!
//! - `version`: `v2` (default) or `v3`
//! - `transport`: `Auto` (default), `TCP` or `UDP`
//!
//! Examples: `nfs://garfield/stuff/`, `nfs://192.168.1.1:2049/stuff/somefile`

pub mod memory;
pub mod native;
pub mod url;

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;

use crate::address::FileAddress;
use crate::backend::{
    BackendCapabilities, FileAdapter, FilenameFilter, RandomAccessRead, ReadHandle, WriteHandle,
};
use crate::config::NfsConfig;
use crate::error::{Result, VfsError};
use crate::factory::{FileFactory, FileResolver};
use crate::parent::{ParentCache, ParentState};
use crate::permissions::{AccessClass, PermissionBits, PermissionType};
use crate::streams::{BlockingReadHandle, BlockingWriteHandle, RandomAccessInput};
use crate::transfer;

pub use memory::MemoryNfs;
pub use native::{NfsClient, NfsHandle};
pub use url::{NfsOptions, NfsTransport, NfsVersion};

/// Protocol tag of NFS addresses
pub const PROTOCOL: &str = "nfs";

/// Register the NFS backend in a factory
pub fn register(factory: &FileFactory, client: Arc<dyn NfsClient>, config: NfsConfig) {
    factory.register_backend(
        PROTOCOL,
        Box::new(move |address, resolver| {
            let file: Arc<dyn FileAdapter> =
                NfsFile::with_config(address, client.clone(), resolver, &config);
            Ok(file)
        }),
    );
}

/// File on an NFS server
pub struct NfsFile {
    address: FileAddress,
    options: NfsOptions,
    handle: Box<dyn NfsHandle>,
    client: Arc<dyn NfsClient>,
    resolver: Arc<dyn FileResolver>,
    parent: ParentCache,
    self_ref: Weak<NfsFile>,
}

impl NfsFile {
    /// Create with the default connection options
    pub fn new(
        address: FileAddress,
        client: Arc<dyn NfsClient>,
        resolver: Arc<dyn FileResolver>,
    ) -> Arc<Self> {
        Self::with_config(address, client, resolver, &NfsConfig::default())
    }

    /// Create with `config` supplying options the address does not carry
    pub fn with_config(
        address: FileAddress,
        client: Arc<dyn NfsClient>,
        resolver: Arc<dyn FileResolver>,
        config: &NfsConfig,
    ) -> Arc<Self> {
        let options = NfsOptions::from_address(&address, config);
        let native_url = url::native_url(&address, options);
        debug!(address = %address, native_url = %native_url, "opening NFS file");
        let handle = client.open(&native_url);

        Arc::new_cyclic(|self_ref| Self {
            address,
            options,
            handle,
            client,
            resolver,
            parent: ParentCache::new(),
            self_ref: self_ref.clone(),
        })
    }

    pub const fn options(&self) -> NfsOptions {
        self.options
    }

    /// Native URL the underlying handle was opened with
    pub fn native_url(&self) -> &str {
        self.handle.native_url()
    }

    /// State of the parent cache, without resolving it
    pub fn parent_state(&self) -> ParentState {
        self.parent.state()
    }

    /// Child adapter sharing this file's client, resolver and options
    fn child(&self, name: &str) -> Arc<Self> {
        let address = self.address.child(name);
        let native_url = url::native_url(&address, self.options);
        let handle = self.client.open(&native_url);

        Arc::new_cyclic(|self_ref| Self {
            address,
            options: self.options,
            handle,
            client: self.client.clone(),
            resolver: self.resolver.clone(),
            parent: ParentCache::new(),
            self_ref: self_ref.clone(),
        })
    }
}

#[async_trait]
impl FileAdapter for NfsFile {
    fn address(&self) -> &FileAddress {
        &self.address
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::RANDOM_ACCESS
            | BackendCapabilities::APPEND
            | BackendCapabilities::NATIVE_RENAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn modified_time(&self) -> Result<Option<SystemTime>> {
        Ok(self.handle.last_modified())
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.handle.length())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.handle.exists())
    }

    async fn is_directory(&self) -> Result<bool> {
        Ok(self.handle.is_directory())
    }

    /// Always `false`: the native client cannot detect symbolic links
    async fn is_symlink(&self) -> Result<bool> {
        Ok(false)
    }

    async fn permission(&self, access: AccessClass, permission: PermissionType) -> Result<bool> {
        if access != AccessClass::Owner {
            return Ok(false);
        }
        Ok(match permission {
            PermissionType::Read => self.handle.can_read(),
            PermissionType::Write => self.handle.can_write(),
            PermissionType::Execute => false,
        })
    }

    fn can_get_permission(&self, access: AccessClass, permission: PermissionType) -> bool {
        access == AccessClass::Owner
            && matches!(permission, PermissionType::Read | PermissionType::Write)
    }

    fn can_set_permission(&self, _access: AccessClass, _permission: PermissionType) -> bool {
        false
    }

    fn permission_get_mask(&self) -> PermissionBits {
        PermissionBits::DEFAULT_GET_MASK
    }

    fn permission_set_mask(&self) -> PermissionBits {
        PermissionBits::DEFAULT_SET_MASK
    }

    async fn parent(&self) -> Result<Option<Arc<dyn FileAdapter>>> {
        self.parent.get_or_resolve(|| {
            self.address
                .parent()
                .map(|address| self.resolver.resolve(&address))
                .transpose()
        })
    }

    fn set_parent(&self, parent: Option<Arc<dyn FileAdapter>>) {
        self.parent.set(parent);
    }

    async fn list(&self, filter: Option<&dyn FilenameFilter>) -> Result<Vec<Arc<dyn FileAdapter>>> {
        let names = self
            .handle
            .list()
            .ok_or_else(|| VfsError::io(format!("cannot list {}", self.address)))?;

        let this: Option<Arc<dyn FileAdapter>> = self
            .self_ref
            .upgrade()
            .map(|this| this as Arc<dyn FileAdapter>);

        let children = names
            .iter()
            .filter(|name| filter.map_or(true, |f| f.accept(name)))
            .map(|name| {
                let child = self.child(name);
                child.set_parent(this.clone());
                self.resolver.wrap_archive(child)
            })
            .collect::<Vec<_>>();

        debug!(address = %self.address, count = children.len(), "listed NFS directory");
        Ok(children)
    }

    async fn create_directory(&self, name: &str) -> Result<()> {
        let address = self.address.child(name);
        let handle = self.client.open(&url::native_url(&address, self.options));
        if handle.mkdir() {
            Ok(())
        } else {
            Err(VfsError::io(format!("cannot create directory {address}")))
        }
    }

    async fn input_stream(&self) -> Result<Box<dyn ReadHandle>> {
        let reader = self
            .handle
            .open_read()
            .map_err(|_| VfsError::io(format!("cannot open {} for reading", self.address)))?;
        // The native length is 0 when unknown and can be stale: read to EOF
        Ok(Box::new(BlockingReadHandle::new(reader, None)))
    }

    async fn output_stream(&self, append: bool) -> Result<Box<dyn WriteHandle>> {
        let writer = self
            .handle
            .open_write(append)
            .map_err(|_| VfsError::io(format!("cannot open {} for writing", self.address)))?;
        Ok(Box::new(BlockingWriteHandle::new(writer)))
    }

    async fn random_access_input(&self) -> Result<Box<dyn RandomAccessRead>> {
        let file = self
            .handle
            .open_random_access()
            .map_err(|_| VfsError::io(format!("cannot open {} for random access", self.address)))?;
        Ok(Box::new(RandomAccessInput::new(file)))
    }

    async fn delete(&self) -> Result<()> {
        if self.handle.delete() {
            Ok(())
        } else {
            Err(VfsError::io(format!("cannot delete {}", self.address)))
        }
    }

    /// Rename natively when `dest` is an NFS file, copy then delete otherwise
    ///
    /// A failed native rename is reported by returning `false`; only the
    /// copy fallback raises.
    async fn move_to(&self, dest: Arc<dyn FileAdapter>) -> Result<bool> {
        if dest.address().protocol() != PROTOCOL {
            return transfer::move_by_copy(self, dest.as_ref()).await;
        }

        // An archive on NFS is still renamed through the file holding it
        let dest = match dest.as_archive() {
            Some(archive) => archive.proxied().clone(),
            None => dest,
        };

        match dest.as_any().downcast_ref::<Self>() {
            Some(target) => Ok(self.handle.rename_to(target.handle.as_ref())),
            None => transfer::move_by_copy(self, dest.as_ref()).await,
        }
    }
}

impl PartialEq for NfsFile {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(files: &[(&str, &[u8])]) -> (Arc<FileFactory>, MemoryNfs) {
        let export = MemoryNfs::with_files("garfield", files);
        let factory = FileFactory::new();
        register(&factory, Arc::new(export.clone()), NfsConfig::default());
        (factory, export)
    }

    #[tokio::test]
    async fn test_attributes() {
        let (factory, _export) = setup(&[("/stuff/a.txt", b"hello")]);
        let file = factory.resolve_str("nfs://garfield/stuff/a.txt").unwrap();

        assert!(file.exists().await.unwrap());
        assert!(!file.is_directory().await.unwrap());
        assert_eq!(file.size().await.unwrap(), 5);
        assert!(file.modified_time().await.unwrap().is_some());
        assert!(!file.is_symlink().await.unwrap());
        assert!(!file.change_modified_time(SystemTime::UNIX_EPOCH).await);
        assert_eq!(file.free_space().await, -1);
        assert_eq!(file.total_space().await, -1);
        assert_eq!(file.absolute_path(), "nfs://garfield/stuff/a.txt");
    }

    #[tokio::test]
    async fn test_permissions() {
        let (factory, export) = setup(&[("/a.txt", b"a")]);
        export.set_access("/a.txt", true, false);
        let file = factory.resolve_str("nfs://garfield/a.txt").unwrap();

        assert!(file.permission(AccessClass::Owner, PermissionType::Read).await.unwrap());
        assert!(!file.permission(AccessClass::Owner, PermissionType::Write).await.unwrap());
        assert!(!file.permission(AccessClass::Group, PermissionType::Read).await.unwrap());
        assert!(!file.permission(AccessClass::Owner, PermissionType::Execute).await.unwrap());
        assert_eq!(file.permissions().await.unwrap(), PermissionBits::OWNER_READ);

        assert!(file.can_get_permission(AccessClass::Owner, PermissionType::Write));
        assert!(!file.can_get_permission(AccessClass::Other, PermissionType::Read));
        assert!(!file.can_set_permission(AccessClass::Owner, PermissionType::Read));
        assert!(
            !file
                .set_permission(AccessClass::Owner, PermissionType::Write, true)
                .await
        );
        assert_eq!(file.permission_get_mask().bits(), 0o600);
        assert_eq!(file.permission_set_mask().bits(), 0);
    }

    #[tokio::test]
    async fn test_parent_is_resolved_once() {
        let (factory, export) = setup(&[("/stuff/a.txt", b"a")]);
        let file = NfsFile::new(
            FileAddress::parse("nfs://garfield/stuff/a.txt").unwrap(),
            Arc::new(export.clone()),
            factory.clone(),
        );
        assert!(matches!(file.parent_state(), ParentState::Unresolved));

        let parent = file.parent().await.unwrap().unwrap();
        assert_eq!(parent.absolute_path(), "nfs://garfield/stuff");
        assert!(matches!(file.parent_state(), ParentState::Present(_)));

        let opened = export.opened_urls().len();
        file.parent().await.unwrap();
        assert_eq!(export.opened_urls().len(), opened);

        let root = parent.parent().await.unwrap().unwrap();
        assert!(root.parent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let (factory, export) = setup(&[("/dir/a.txt", b"a")]);
        let dir = factory.resolve_str("nfs://garfield/dir").unwrap();

        dir.create_directory("sub").await.unwrap();
        assert!(export.contains("/dir/sub"));
        assert!(matches!(
            dir.create_directory("sub").await,
            Err(VfsError::Io(_))
        ));

        let file = factory.resolve_str("nfs://garfield/dir/a.txt").unwrap();
        file.delete().await.unwrap();
        assert!(!export.contains("/dir/a.txt"));
        assert!(matches!(file.delete().await, Err(VfsError::Io(_))));
    }

    #[tokio::test]
    async fn test_streams() {
        let (factory, export) = setup(&[("/a.txt", b"Hello, ")]);
        let file = factory.resolve_str("nfs://garfield/a.txt").unwrap();

        let mut writer = file.output_stream(true).await.unwrap();
        writer.write_chunk(b"World!").await.unwrap();
        writer.close().await.unwrap();
        assert_eq!(export.read_file("/a.txt").unwrap(), b"Hello, World!");

        let mut reader = file.input_stream().await.unwrap();
        assert_eq!(reader.size(), None);
        let chunk = reader.read_chunk().await.unwrap();
        assert_eq!(chunk.data, b"Hello, World!");
        assert!(!chunk.is_last);
        let end = reader.read_chunk().await.unwrap();
        assert!(end.data.is_empty());
        assert!(end.is_last);

        let missing = factory.resolve_str("nfs://garfield/missing.txt").unwrap();
        assert!(matches!(missing.input_stream().await, Err(VfsError::Io(_))));
    }

    #[tokio::test]
    async fn test_random_access() {
        let (factory, _export) = setup(&[("/data.bin", b"0123456789")]);
        let file = factory.resolve_str("nfs://garfield/data.bin").unwrap();

        let mut input = file.random_access_input().await.unwrap();
        assert_eq!(input.length().await.unwrap(), 10);
        assert_eq!(input.read_byte().await.unwrap(), Some(b'0'));

        input.seek(6).await.unwrap();
        let mut buf = [0u8; 8];
        let n = input.read(&mut buf[2..5]).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[2..5], b"678");
        assert_eq!(input.offset().await.unwrap(), 9);

        assert_eq!(input.read_byte().await.unwrap(), Some(b'9'));
        assert_eq!(input.read_byte().await.unwrap(), None);

        input.close().await.unwrap();
        assert!(input.read_byte().await.is_err());

        let missing = factory.resolve_str("nfs://garfield/nope").unwrap();
        assert!(matches!(missing.random_access_input().await, Err(VfsError::Io(_))));
    }

    #[tokio::test]
    async fn test_external_process_unsupported() {
        let (factory, _export) = setup(&[("/a.txt", b"a")]);
        let file = factory.resolve_str("nfs://garfield/a.txt").unwrap();
        assert!(!file.can_run_external_process());
        let err = file.run_external_process(&["ls".to_string()]).await.err().unwrap();
        assert!(err.is_unsupported());
    }
}
