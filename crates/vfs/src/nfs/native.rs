//! Native NFS client seam
//!
//! The adapter talks to an NFS client library through these traits. A
//! handle is created from a native NFS URL (see [`super::url`]) and connects
//! lazily; its queries answer with plain values the way such libraries do,
//! so "not found" and "I/O error" are indistinguishable at this level.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use crate::streams::NativeRandomAccess;

/// Entry point of a native client library
pub trait NfsClient: Send + Sync {
    /// Handle for the file designated by a native NFS URL
    fn open(&self, native_url: &str) -> Box<dyn NfsHandle>;
}

/// One remote file, as seen by the native library
pub trait NfsHandle: Send + Sync {
    fn exists(&self) -> bool;

    fn is_directory(&self) -> bool;

    /// Length in bytes, 0 when unknown
    fn length(&self) -> u64;

    fn last_modified(&self) -> Option<SystemTime>;

    fn can_read(&self) -> bool;

    fn can_write(&self) -> bool;

    /// Entry names, `None` when no listing could be obtained
    fn list(&self) -> Option<Vec<String>>;

    fn mkdir(&self) -> bool;

    fn delete(&self) -> bool;

    /// Rename to the file designated by `dest`
    fn rename_to(&self, dest: &dyn NfsHandle) -> bool;

    /// Native URL this handle was opened with
    fn native_url(&self) -> &str;

    fn open_read(&self) -> io::Result<Box<dyn Read + Send>>;

    fn open_write(&self, append: bool) -> io::Result<Box<dyn Write + Send>>;

    fn open_random_access(&self) -> io::Result<Box<dyn NativeRandomAccess>>;
}
