use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bitflags::bitflags;

use crate::address::FileAddress;
use crate::archive::ArchiveFile;
use crate::error::{Result, VfsError};
use crate::permissions::{AccessClass, PermissionBits, PermissionType};
use crate::transfer;

/// Chunk of data from streaming read
#[derive(Debug)]
pub struct ReadChunk {
    pub data: Vec<u8>,
    pub offset: u64,
    pub is_last: bool,
}

/// Sequential read handle
///
/// Allows reading large files in chunks without loading entire file into memory.
#[async_trait]
pub trait ReadHandle: Send + Sync {
    /// Read next chunk (default chunk size is backend-dependent)
    async fn read_chunk(&mut self) -> Result<ReadChunk>;

    /// Get total file size (if known)
    fn size(&self) -> Option<u64>;

    /// Close the handle
    async fn close(&mut self) -> Result<()>;
}

/// Sequential write handle
#[async_trait]
pub trait WriteHandle: Send + Sync {
    /// Write a chunk of data
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()>;

    /// Flush and close the handle
    async fn close(&mut self) -> Result<()>;

    /// Get bytes written so far
    fn bytes_written(&self) -> u64;
}

/// Seekable, read-only stream
///
/// The native handle is released by [`close`](Self::close) or when the
/// stream is dropped, whichever happens first.
#[async_trait]
pub trait RandomAccessRead: Send + Sync {
    /// Next byte, `None` at end of data
    async fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Fill as much of `buf` as available, `0` at end of data.
    /// Pass a sub-slice to read into part of a larger buffer.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Current position from the start of the file
    async fn offset(&mut self) -> Result<u64>;

    /// Total length of the file
    async fn length(&mut self) -> Result<u64>;

    /// Move to an absolute position
    async fn seek(&mut self, pos: u64) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Process spawned on the machine hosting a file
#[async_trait]
pub trait ExternalProcess: Send {
    /// Wait for completion and return the exit code
    async fn wait(&mut self) -> Result<i32>;

    fn kill(&mut self) -> Result<()>;
}

/// Name filter applied by [`FileAdapter::list`] before children are built
pub trait FilenameFilter: Send + Sync {
    fn accept(&self, name: &str) -> bool;
}

impl<F> FilenameFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accept(&self, name: &str) -> bool {
        self(name)
    }
}

bitflags! {
    /// Optional abilities of a backend variant
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BackendCapabilities: u32 {
        /// `is_symlink` can actually report links
        const SYMLINKS = 1;
        /// `change_modified_time` can succeed
        const CHANGE_MODIFIED_TIME = 1 << 1;
        /// `free_space` / `total_space` return real values
        const SPACE_INFO = 1 << 2;
        /// `random_access_input` is available
        const RANDOM_ACCESS = 1 << 3;
        /// `output_stream(true)` appends
        const APPEND = 1 << 4;
        /// `move_to` can rename without copying
        const NATIVE_RENAME = 1 << 5;
        /// `run_external_process` is available
        const EXTERNAL_PROCESS = 1 << 6;
    }
}

/// File contract - every backend variant implements it
///
/// An adapter is bound to one [`FileAddress`] for its lifetime. Identity is
/// the address, not the object: compare adapters with `==` on `dyn
/// FileAdapter` or on their addresses.
///
/// Default implementations cover optional operations by returning the
/// documented sentinel (`false`, `-1`) or [`VfsError::Unsupported`], so a
/// backend only implements what it supports.
///
/// Instances are not meant to be shared between concurrent callers: cached
/// relational state (the parent) is only guarded against data races, not
/// against interleaved use.
#[async_trait]
pub trait FileAdapter: Send + Sync + 'static {
    fn address(&self) -> &FileAddress;

    /// Canonical string form of the address
    ///
    /// Never derived from the backend-native representation.
    fn absolute_path(&self) -> String {
        self.address().to_string()
    }

    fn name(&self) -> String {
        self.address().name().to_string()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::empty()
    }

    fn as_any(&self) -> &dyn Any;

    /// The archive view when this adapter is archive-decorated
    fn as_archive(&self) -> Option<&ArchiveFile> {
        None
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────────────────

    async fn modified_time(&self) -> Result<Option<SystemTime>>;

    async fn size(&self) -> Result<u64>;

    async fn exists(&self) -> Result<bool>;

    async fn is_directory(&self) -> Result<bool>;

    async fn is_symlink(&self) -> Result<bool> {
        Ok(false)
    }

    /// Returns `false` when the date could not be changed
    async fn change_modified_time(&self, _time: SystemTime) -> bool {
        false
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    async fn permission(&self, access: AccessClass, permission: PermissionType) -> Result<bool>;

    /// Returns `false` when the permission could not be changed
    async fn set_permission(
        &self,
        _access: AccessClass,
        _permission: PermissionType,
        _enabled: bool,
    ) -> bool {
        false
    }

    fn can_get_permission(&self, access: AccessClass, permission: PermissionType) -> bool {
        self.permission_get_mask().has(access, permission)
    }

    fn can_set_permission(&self, access: AccessClass, permission: PermissionType) -> bool {
        self.permission_set_mask().has(access, permission)
    }

    /// Bits [`permission`](Self::permission) can answer, for coarse checks
    fn permission_get_mask(&self) -> PermissionBits {
        PermissionBits::DEFAULT_GET_MASK
    }

    /// Bits [`set_permission`](Self::set_permission) can change
    fn permission_set_mask(&self) -> PermissionBits {
        PermissionBits::DEFAULT_SET_MASK
    }

    /// Current value of every gettable cell
    async fn permissions(&self) -> Result<PermissionBits> {
        let mask = self.permission_get_mask();
        let mut bits = PermissionBits::empty();
        for (access, permission) in PermissionBits::cells() {
            if mask.has(access, permission) && self.permission(access, permission).await? {
                bits |= PermissionBits::bit(access, permission);
            }
        }
        Ok(bits)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hierarchy
    // ─────────────────────────────────────────────────────────────────────────

    /// Enclosing directory, resolved lazily and cached; `None` for a root
    async fn parent(&self) -> Result<Option<Arc<dyn FileAdapter>>>;

    /// Overwrite the cached parent, e.g. when the caller already holds it
    fn set_parent(&self, parent: Option<Arc<dyn FileAdapter>>);

    /// Children of this directory, filtered by name before they are built
    async fn list(&self, filter: Option<&dyn FilenameFilter>) -> Result<Vec<Arc<dyn FileAdapter>>>;

    async fn create_directory(&self, _name: &str) -> Result<()> {
        Err(VfsError::Unsupported("create_directory"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Streaming I/O
    // ─────────────────────────────────────────────────────────────────────────

    async fn input_stream(&self) -> Result<Box<dyn ReadHandle>>;

    async fn output_stream(&self, append: bool) -> Result<Box<dyn WriteHandle>>;

    async fn random_access_input(&self) -> Result<Box<dyn RandomAccessRead>> {
        Err(VfsError::Unsupported("random access input"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    async fn delete(&self) -> Result<()> {
        Err(VfsError::Unsupported("delete"))
    }

    /// Move this file to `dest`
    ///
    /// The default copies the contents then deletes this file. Backends
    /// override it to rename natively when both ends allow it.
    async fn move_to(&self, dest: Arc<dyn FileAdapter>) -> Result<bool> {
        transfer::move_by_copy(self, dest.as_ref()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Volume and processes
    // ─────────────────────────────────────────────────────────────────────────

    /// Free bytes on the volume, `-1` when unavailable
    async fn free_space(&self) -> i64 {
        -1
    }

    /// Total bytes on the volume, `-1` when unavailable
    async fn total_space(&self) -> i64 {
        -1
    }

    fn can_run_external_process(&self) -> bool {
        self.capabilities()
            .contains(BackendCapabilities::EXTERNAL_PROCESS)
    }

    async fn run_external_process(&self, _tokens: &[String]) -> Result<Box<dyn ExternalProcess>> {
        Err(VfsError::Unsupported("running external processes"))
    }
}

impl PartialEq for dyn FileAdapter {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl std::fmt::Debug for dyn FileAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FileAdapter")
            .field(&self.absolute_path())
            .finish()
    }
}
