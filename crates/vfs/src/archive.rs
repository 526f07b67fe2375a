//! Archive decoration
//!
//! An [`ArchiveFile`] stands in for a file whose contents are an archive: it
//! behaves like the proxied file for every operation except listing, which
//! is answered by an [`ArchiveCodec`] from the archive's entries.

use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::address::FileAddress;
use crate::backend::{
    BackendCapabilities, ExternalProcess, FileAdapter, FilenameFilter, RandomAccessRead,
    ReadHandle, WriteHandle,
};
use crate::error::Result;
use crate::permissions::{AccessClass, PermissionBits, PermissionType};

/// Archive format support (zip, tar, ...)
#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Whether a file with this name should be opened as an archive
    fn accepts(&self, name: &str) -> bool;

    /// Entries at the top level of the archive
    async fn entries(
        &self,
        archive: &ArchiveFile,
        filter: Option<&dyn FilenameFilter>,
    ) -> Result<Vec<Arc<dyn FileAdapter>>>;
}

/// File adapter exposing an archive's contents through the file contract
pub struct ArchiveFile {
    proxied: Arc<dyn FileAdapter>,
    codec: Arc<dyn ArchiveCodec>,
}

impl ArchiveFile {
    pub fn new(proxied: Arc<dyn FileAdapter>, codec: Arc<dyn ArchiveCodec>) -> Self {
        Self { proxied, codec }
    }

    /// The file holding the archive
    pub fn proxied(&self) -> &Arc<dyn FileAdapter> {
        &self.proxied
    }
}

#[async_trait]
impl FileAdapter for ArchiveFile {
    fn address(&self) -> &FileAddress {
        self.proxied.address()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.proxied.capabilities()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_archive(&self) -> Option<&ArchiveFile> {
        Some(self)
    }

    async fn modified_time(&self) -> Result<Option<SystemTime>> {
        self.proxied.modified_time().await
    }

    async fn size(&self) -> Result<u64> {
        self.proxied.size().await
    }

    async fn exists(&self) -> Result<bool> {
        self.proxied.exists().await
    }

    async fn is_directory(&self) -> Result<bool> {
        self.proxied.is_directory().await
    }

    async fn is_symlink(&self) -> Result<bool> {
        self.proxied.is_symlink().await
    }

    async fn change_modified_time(&self, time: SystemTime) -> bool {
        self.proxied.change_modified_time(time).await
    }

    async fn permission(&self, access: AccessClass, permission: PermissionType) -> Result<bool> {
        self.proxied.permission(access, permission).await
    }

    async fn set_permission(
        &self,
        access: AccessClass,
        permission: PermissionType,
        enabled: bool,
    ) -> bool {
        self.proxied.set_permission(access, permission, enabled).await
    }

    fn can_get_permission(&self, access: AccessClass, permission: PermissionType) -> bool {
        self.proxied.can_get_permission(access, permission)
    }

    fn can_set_permission(&self, access: AccessClass, permission: PermissionType) -> bool {
        self.proxied.can_set_permission(access, permission)
    }

    fn permission_get_mask(&self) -> PermissionBits {
        self.proxied.permission_get_mask()
    }

    fn permission_set_mask(&self) -> PermissionBits {
        self.proxied.permission_set_mask()
    }

    async fn parent(&self) -> Result<Option<Arc<dyn FileAdapter>>> {
        self.proxied.parent().await
    }

    fn set_parent(&self, parent: Option<Arc<dyn FileAdapter>>) {
        self.proxied.set_parent(parent);
    }

    async fn list(&self, filter: Option<&dyn FilenameFilter>) -> Result<Vec<Arc<dyn FileAdapter>>> {
        self.codec.entries(self, filter).await
    }

    async fn create_directory(&self, name: &str) -> Result<()> {
        self.proxied.create_directory(name).await
    }

    async fn input_stream(&self) -> Result<Box<dyn ReadHandle>> {
        self.proxied.input_stream().await
    }

    async fn output_stream(&self, append: bool) -> Result<Box<dyn WriteHandle>> {
        self.proxied.output_stream(append).await
    }

    async fn random_access_input(&self) -> Result<Box<dyn RandomAccessRead>> {
        self.proxied.random_access_input().await
    }

    async fn delete(&self) -> Result<()> {
        self.proxied.delete().await
    }

    async fn move_to(&self, dest: Arc<dyn FileAdapter>) -> Result<bool> {
        self.proxied.move_to(dest).await
    }

    async fn free_space(&self) -> i64 {
        self.proxied.free_space().await
    }

    async fn total_space(&self) -> i64 {
        self.proxied.total_space().await
    }

    fn can_run_external_process(&self) -> bool {
        self.proxied.can_run_external_process()
    }

    async fn run_external_process(&self, tokens: &[String]) -> Result<Box<dyn ExternalProcess>> {
        self.proxied.run_external_process(tokens).await
    }
}
