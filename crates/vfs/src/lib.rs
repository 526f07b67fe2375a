pub mod address;
pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod factory;
pub mod local;
pub mod monitor;
pub mod nfs;
pub mod parent;
pub mod permissions;
pub mod streams;
pub mod transfer;

pub use address::FileAddress;
pub use archive::{ArchiveCodec, ArchiveFile};
pub use backend::{
    BackendCapabilities, ExternalProcess, FileAdapter, FilenameFilter, RandomAccessRead,
    ReadChunk, ReadHandle, WriteHandle,
};
pub use config::{MonitorConfig, NfsConfig, VfsConfig};
pub use error::{Result, VfsError};
pub use factory::{FileFactory, FileResolver};
pub use local::LocalFile;
pub use monitor::{FileAttributes, FileChangeListener, FileMonitor};
pub use nfs::{MemoryNfs, NfsClient, NfsFile};
pub use parent::ParentState;
pub use permissions::{AccessClass, PermissionBits, PermissionType};
pub use streams::{NativeRandomAccess, RandomAccessInput};
