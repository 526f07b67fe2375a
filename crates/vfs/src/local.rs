//! Local filesystem backend - maps `file:///...` addresses to `std::fs`
//!
//! Blocking calls run on Tokio's blocking pool. On Unix the whole
//! Owner/Group/Other matrix can be read and changed; elsewhere only the
//! owner read flag and the read-only attribute are available.

use std::any::Any;
use std::fs::{self, File, Metadata, OpenOptions, Permissions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;

use crate::address::FileAddress;
use crate::backend::{
    BackendCapabilities, FileAdapter, FilenameFilter, RandomAccessRead, ReadHandle, WriteHandle,
};
use crate::error::{Result, VfsError};
use crate::factory::{FileFactory, FileResolver};
use crate::parent::ParentCache;
use crate::permissions::{AccessClass, PermissionBits, PermissionType};
use crate::streams::{
    BlockingReadHandle, BlockingWriteHandle, NativeRandomAccess, RandomAccessInput, CHUNK_SIZE,
};
use crate::transfer;

/// Protocol tag of local addresses
pub const PROTOCOL: &str = "file";

#[cfg(unix)]
const GET_MASK: PermissionBits = PermissionBits::all();
#[cfg(unix)]
const SET_MASK: PermissionBits = PermissionBits::all();
#[cfg(not(unix))]
const GET_MASK: PermissionBits = PermissionBits::DEFAULT_GET_MASK;
#[cfg(not(unix))]
const SET_MASK: PermissionBits = PermissionBits::OWNER_WRITE;

/// Register the local backend in a factory
pub fn register(factory: &FileFactory) {
    factory.register_backend(
        PROTOCOL,
        Box::new(|address, resolver| {
            let file: Arc<dyn FileAdapter> = LocalFile::new(address, resolver);
            Ok(file)
        }),
    );
}

/// Address of a filesystem path, relative paths taken from the current directory
pub fn address_of(path: &Path) -> Result<FileAddress> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|_| VfsError::io("cannot read the current directory"))?
            .join(path)
    };
    let path = absolute.to_str().ok_or_else(|| {
        VfsError::invalid_address(&absolute.to_string_lossy(), "path is not valid UTF-8")
    })?;
    Ok(FileAddress::new(PROTOCOL, "", None, path))
}

/// Run a blocking filesystem call on the blocking pool
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))
}

/// File on the local filesystem
pub struct LocalFile {
    address: FileAddress,
    path: PathBuf,
    resolver: Arc<dyn FileResolver>,
    parent: ParentCache,
    self_ref: Weak<LocalFile>,
}

impl LocalFile {
    pub fn new(address: FileAddress, resolver: Arc<dyn FileResolver>) -> Arc<Self> {
        let path = PathBuf::from(address.path());
        Arc::new_cyclic(|self_ref| Self {
            address,
            path,
            resolver,
            parent: ParentCache::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Filesystem path of this file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn child(&self, name: &str) -> Arc<Self> {
        Self::new(self.address.child(name), self.resolver.clone())
    }

    /// Metadata following links, `None` when nothing exists at the path
    async fn metadata(&self) -> Result<Option<Metadata>> {
        let path = self.path.clone();
        blocking(move || match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        })
        .await
        .map_err(|_| VfsError::io(format!("cannot stat {}", self.address)))
    }
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> PermissionBits {
    use std::os::unix::fs::PermissionsExt;
    PermissionBits::from_bits_truncate(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> PermissionBits {
    if meta.permissions().readonly() {
        PermissionBits::OWNER_READ
    } else {
        PermissionBits::OWNER_READ | PermissionBits::OWNER_WRITE
    }
}

#[cfg(unix)]
fn apply_bit(perms: &mut Permissions, bit: PermissionBits, enabled: bool) {
    use std::os::unix::fs::PermissionsExt;
    let mut bits = PermissionBits::from_bits_truncate(perms.mode() & 0o777);
    bits.set(bit, enabled);
    perms.set_mode((perms.mode() & !0o777) | bits.bits());
}

#[cfg(not(unix))]
fn apply_bit(perms: &mut Permissions, bit: PermissionBits, enabled: bool) {
    if bit == PermissionBits::OWNER_WRITE {
        perms.set_readonly(!enabled);
    }
}

impl NativeRandomAccess for File {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

#[async_trait]
impl FileAdapter for LocalFile {
    fn address(&self) -> &FileAddress {
        &self.address
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::SYMLINKS
            | BackendCapabilities::CHANGE_MODIFIED_TIME
            | BackendCapabilities::RANDOM_ACCESS
            | BackendCapabilities::APPEND
            | BackendCapabilities::NATIVE_RENAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn modified_time(&self) -> Result<Option<SystemTime>> {
        Ok(self.metadata().await?.and_then(|m| m.modified().ok()))
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.metadata().await?.map_or(0, |m| m.len()))
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.metadata().await?.is_some())
    }

    async fn is_directory(&self) -> Result<bool> {
        Ok(self.metadata().await?.is_some_and(|m| m.is_dir()))
    }

    async fn is_symlink(&self) -> Result<bool> {
        let path = self.path.clone();
        let link = blocking(move || {
            Ok(fs::symlink_metadata(&path).is_ok_and(|m| m.file_type().is_symlink()))
        })
        .await
        .map_err(|_| VfsError::io(format!("cannot stat {}", self.address)))?;
        Ok(link)
    }

    async fn change_modified_time(&self, time: SystemTime) -> bool {
        let path = self.path.clone();
        blocking(move || File::open(&path)?.set_modified(time))
            .await
            .is_ok()
    }

    async fn permission(&self, access: AccessClass, permission: PermissionType) -> Result<bool> {
        if !self.can_get_permission(access, permission) {
            return Ok(false);
        }
        Ok(self
            .metadata()
            .await?
            .is_some_and(|m| mode_bits(&m).has(access, permission)))
    }

    async fn set_permission(
        &self,
        access: AccessClass,
        permission: PermissionType,
        enabled: bool,
    ) -> bool {
        if !self.can_set_permission(access, permission) {
            return false;
        }
        let path = self.path.clone();
        let bit = PermissionBits::bit(access, permission);
        blocking(move || {
            let mut perms = fs::metadata(&path)?.permissions();
            apply_bit(&mut perms, bit, enabled);
            fs::set_permissions(&path, perms)
        })
        .await
        .is_ok()
    }

    fn permission_get_mask(&self) -> PermissionBits {
        GET_MASK
    }

    fn permission_set_mask(&self) -> PermissionBits {
        SET_MASK
    }

    /// Single stat instead of one query per cell
    async fn permissions(&self) -> Result<PermissionBits> {
        Ok(self
            .metadata()
            .await?
            .map_or(PermissionBits::empty(), |m| mode_bits(&m) & GET_MASK))
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
        let path = self.path.clone();
        let mut names = blocking(move || {
            fs::read_dir(&path)?
                .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect::<io::Result<Vec<_>>>()
        })
        .await
        .map_err(|_| VfsError::io(format!("cannot list {}", self.address)))?;
        names.sort();

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

        debug!(address = %self.address, count = children.len(), "listed local directory");
        Ok(children)
    }

    async fn create_directory(&self, name: &str) -> Result<()> {
        let path = self.path.join(name);
        blocking(move || fs::create_dir(path)).await.map_err(|_| {
            VfsError::io(format!("cannot create directory {}", self.address.child(name)))
        })
    }

    async fn input_stream(&self) -> Result<Box<dyn ReadHandle>> {
        let path = self.path.clone();
        let (file, size) = blocking(move || {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            Ok((file, size))
        })
        .await
        .map_err(|_| VfsError::io(format!("cannot open {} for reading", self.address)))?;
        Ok(Box::new(BlockingReadHandle::new(file, Some(size))))
    }

    async fn output_stream(&self, append: bool) -> Result<Box<dyn WriteHandle>> {
        let path = self.path.clone();
        let file = blocking(move || {
            OpenOptions::new()
                .write(true)
                .create(true)
                .append(append)
                .truncate(!append)
                .open(&path)
        })
        .await
        .map_err(|_| VfsError::io(format!("cannot open {} for writing", self.address)))?;
        Ok(Box::new(BlockingWriteHandle::new(BufWriter::with_capacity(
            CHUNK_SIZE, file,
        ))))
    }

    async fn random_access_input(&self) -> Result<Box<dyn RandomAccessRead>> {
        let path = self.path.clone();
        let file = blocking(move || File::open(&path))
            .await
            .map_err(|_| VfsError::io(format!("cannot open {} for random access", self.address)))?;
        Ok(Box::new(RandomAccessInput::new(Box::new(file))))
    }

    async fn delete(&self) -> Result<()> {
        let path = self.path.clone();
        blocking(move || {
            if fs::symlink_metadata(&path)?.is_dir() {
                fs::remove_dir(&path)
            } else {
                fs::remove_file(&path)
            }
        })
        .await
        .map_err(|_| VfsError::io(format!("cannot delete {}", self.address)))
    }

    /// Rename when `dest` is a local file, copy then delete otherwise
    async fn move_to(&self, dest: Arc<dyn FileAdapter>) -> Result<bool> {
        let dest = match dest.as_archive() {
            Some(archive) => archive.proxied().clone(),
            None => dest,
        };
        let Some(target) = dest.as_any().downcast_ref::<Self>() else {
            return transfer::move_by_copy(self, dest.as_ref()).await;
        };

        let (from, to) = (self.path.clone(), target.path.clone());
        let renamed = blocking(move || fs::rename(from, to)).await.is_ok();
        debug!(from = %self.address, to = %target.address, renamed, "renamed local file");
        Ok(renamed)
    }
}

impl PartialEq for LocalFile {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
