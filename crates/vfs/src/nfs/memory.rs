//! In-memory NFS export
//!
//! Implements the native client seam over a map of paths, so the NFS adapter
//! can be exercised without a server. Every native URL handed to the client
//! is recorded for inspection.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use super::native::{NfsClient, NfsHandle};
use crate::streams::NativeRandomAccess;

/// In-memory file entry
#[derive(Clone, Debug)]
struct MemoryEntry {
    kind: EntryKind,
    modified: SystemTime,
    readable: bool,
    writable: bool,
}

#[derive(Clone, Debug)]
enum EntryKind {
    File(Vec<u8>),
    Directory,
}

impl MemoryEntry {
    fn file(data: Vec<u8>) -> Self {
        Self {
            kind: EntryKind::File(data),
            modified: SystemTime::now(),
            readable: true,
            writable: true,
        }
    }

    fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            ..Self::file(Vec::new())
        }
    }
}

type Entries = Arc<RwLock<HashMap<String, MemoryEntry>>>;

/// In-memory NFS export served under one host name
///
/// Thread-safe via internal `RwLock`; clones share the same export.
#[derive(Clone)]
pub struct MemoryNfs {
    host: String,
    entries: Entries,
    opened: Arc<RwLock<Vec<String>>>,
}

impl MemoryNfs {
    /// Create an export containing only the root directory
    pub fn new(host: impl Into<String>) -> Self {
        let mut entries = HashMap::new();
        entries.insert("/".to_string(), MemoryEntry::directory());
        Self {
            host: host.into(),
            entries: Arc::new(RwLock::new(entries)),
            opened: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create with initial file contents, parent directories included
    pub fn with_files(host: impl Into<String>, files: &[(&str, &[u8])]) -> Self {
        let export = Self::new(host);
        for (path, content) in files {
            export.write_file(path, content);
        }
        export
    }

    /// Native URLs opened so far, oldest first
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Create or replace a file, creating parent directories
    pub fn write_file(&self, path: &str, content: &[u8]) {
        let path = normalize_path(path);
        let mut entries = self.write_entries();
        ensure_parents(&mut entries, &path);
        entries.insert(path, MemoryEntry::file(content.to_vec()));
    }

    /// Create a directory and its parents
    pub fn create_dir_all(&self, path: &str) {
        let path = normalize_path(path);
        let mut entries = self.write_entries();
        ensure_parents(&mut entries, &path);
        entries.entry(path).or_insert_with(MemoryEntry::directory);
    }

    /// Set the modification time of an entry, without touching its content
    pub fn set_modified(&self, path: &str, modified: SystemTime) {
        if let Some(entry) = self.write_entries().get_mut(&normalize_path(path)) {
            entry.modified = modified;
        }
    }

    /// Set the read / write flags reported for an entry
    pub fn set_access(&self, path: &str, readable: bool, writable: bool) {
        if let Some(entry) = self.write_entries().get_mut(&normalize_path(path)) {
            entry.readable = readable;
            entry.writable = writable;
        }
    }

    /// Remove an entry and everything below it
    pub fn remove(&self, path: &str) {
        let path = normalize_path(path);
        let prefix = format!("{path}/");
        self.write_entries()
            .retain(|key, _| key != &path && !key.starts_with(&prefix));
    }

    /// Content of a file, `None` for directories and missing entries
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match &self.read_entries().get(&normalize_path(path))?.kind {
            EntryKind::File(data) => Some(data.clone()),
            EntryKind::Directory => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.read_entries().contains_key(&normalize_path(path))
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NfsClient for MemoryNfs {
    fn open(&self, native_url: &str) -> Box<dyn NfsHandle> {
        self.opened
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(native_url.to_string());

        let (host, path) = split_native_url(native_url);
        Box::new(MemoryHandle {
            url: native_url.to_string(),
            served: host == self.host,
            path,
            entries: self.entries.clone(),
        })
    }
}

/// Host and path of `nfs://host:<port+flags>/<path>`
fn split_native_url(url: &str) -> (String, String) {
    let rest = url.strip_prefix("nfs://").unwrap_or(url);
    let slash_pos = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..slash_pos];
    let host = authority.split(':').next().unwrap_or_default().to_string();
    (host, normalize_path(&rest[slash_pos..]))
}

/// Normalize path (ensure leading /, no trailing /, no empty segments)
fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return "/".to_string();
    }
    format!("/{}", parts.join("/"))
}

fn parent_path(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    Some(if idx == 0 { "/".to_string() } else { path[..idx].to_string() })
}

fn ensure_parents(entries: &mut HashMap<String, MemoryEntry>, path: &str) {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut current = String::new();
    for part in &parts[..parts.len().saturating_sub(1)] {
        current = format!("{current}/{part}");
        entries
            .entry(current.clone())
            .or_insert_with(MemoryEntry::directory);
    }
}

fn is_directory(entries: &HashMap<String, MemoryEntry>, path: &str) -> bool {
    matches!(
        entries.get(path).map(|e| &e.kind),
        Some(EntryKind::Directory)
    )
}

/// Handle on one path of a [`MemoryNfs`] export
struct MemoryHandle {
    url: String,
    /// False when the URL names another server: every query then fails
    served: bool,
    path: String,
    entries: Entries,
}

impl MemoryHandle {
    fn entry(&self) -> Option<MemoryEntry> {
        if !self.served {
            return None;
        }
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.path)
            .cloned()
    }

    fn not_found(&self) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, self.url.clone())
    }
}

impl NfsHandle for MemoryHandle {
    fn exists(&self) -> bool {
        self.entry().is_some()
    }

    fn is_directory(&self) -> bool {
        matches!(self.entry().map(|e| e.kind), Some(EntryKind::Directory))
    }

    fn length(&self) -> u64 {
        match self.entry().map(|e| e.kind) {
            Some(EntryKind::File(data)) => data.len() as u64,
            _ => 0,
        }
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.entry().map(|e| e.modified)
    }

    fn can_read(&self) -> bool {
        self.entry().is_some_and(|e| e.readable)
    }

    fn can_write(&self) -> bool {
        self.entry().is_some_and(|e| e.writable)
    }

    fn list(&self) -> Option<Vec<String>> {
        let entry = self.entry()?;
        if !matches!(entry.kind, EntryKind::Directory) || !entry.readable {
            return None;
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let prefix = if self.path == "/" {
            "/".to_string()
        } else {
            format!("{}/", self.path)
        };

        let mut names: Vec<String> = entries
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(ToString::to_string)
            .collect();
        names.sort();
        Some(names)
    }

    fn mkdir(&self) -> bool {
        if !self.served {
            return false;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let parent_ok = parent_path(&self.path).is_some_and(|p| is_directory(&entries, &p));
        if !parent_ok || entries.contains_key(&self.path) {
            return false;
        }
        entries.insert(self.path.clone(), MemoryEntry::directory());
        true
    }

    fn delete(&self) -> bool {
        if !self.served || self.path == "/" {
            return false;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let prefix = format!("{}/", self.path);
        if entries.keys().any(|key| key.starts_with(&prefix)) {
            return false;
        }
        entries.remove(&self.path).is_some()
    }

    fn rename_to(&self, dest: &dyn NfsHandle) -> bool {
        let (dest_host, dest_path) = split_native_url(dest.native_url());
        let (src_host, _) = split_native_url(&self.url);
        if !self.served || dest_host != src_host || dest_path == self.path {
            return false;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let parent_ok = parent_path(&dest_path).is_some_and(|p| is_directory(&entries, &p));
        if !parent_ok || entries.contains_key(&dest_path) || !entries.contains_key(&self.path) {
            return false;
        }
        if dest_path.starts_with(&format!("{}/", self.path)) {
            return false;
        }

        let prefix = format!("{}/", self.path);
        let moved: Vec<String> = entries
            .keys()
            .filter(|key| *key == &self.path || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = entries.remove(&key) {
                let new_key = format!("{dest_path}{}", &key[self.path.len()..]);
                entries.insert(new_key, entry);
            }
        }
        true
    }

    fn native_url(&self) -> &str {
        &self.url
    }

    fn open_read(&self) -> io::Result<Box<dyn Read + Send>> {
        match self.entry().map(|e| e.kind) {
            Some(EntryKind::File(data)) => Ok(Box::new(Cursor::new(data))),
            _ => Err(self.not_found()),
        }
    }

    fn open_write(&self, append: bool) -> io::Result<Box<dyn Write + Send>> {
        if !self.served {
            return Err(self.not_found());
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let parent_ok = parent_path(&self.path).is_some_and(|p| is_directory(&entries, &p));
        if !parent_ok || is_directory(&entries, &self.path) {
            return Err(self.not_found());
        }

        let entry = entries
            .entry(self.path.clone())
            .or_insert_with(|| MemoryEntry::file(Vec::new()));
        if !entry.writable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, self.url.clone()));
        }
        if !append {
            entry.kind = EntryKind::File(Vec::new());
        }
        entry.modified = SystemTime::now();

        Ok(Box::new(MemoryWriter {
            path: self.path.clone(),
            entries: self.entries.clone(),
        }))
    }

    fn open_random_access(&self) -> io::Result<Box<dyn NativeRandomAccess>> {
        match self.entry().map(|e| e.kind) {
            Some(EntryKind::File(data)) => Ok(Box::new(Cursor::new(data))),
            _ => Err(self.not_found()),
        }
    }
}

/// Appends straight into the export entry
struct MemoryWriter {
    path: String,
    entries: Entries,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&self.path) {
            Some(MemoryEntry {
                kind: EntryKind::File(data),
                modified,
                ..
            }) => {
                data.extend_from_slice(buf);
                *modified = SystemTime::now();
                Ok(buf.len())
            }
            _ => Err(io::Error::new(io::ErrorKind::NotFound, self.path.clone())),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_url_is_parsed() {
        let export = MemoryNfs::with_files("garfield", &[("/stuff/a.txt", b"A")]);
        let handle = export.open("nfs://garfield:123v3um//stuff/a.txt");
        assert!(handle.exists());
        assert_eq!(handle.length(), 1);
        assert_eq!(export.opened_urls(), vec!["nfs://garfield:123v3um//stuff/a.txt"]);

        let elsewhere = export.open("nfs://odie:v2m//stuff/a.txt");
        assert!(!elsewhere.exists());
    }

    #[test]
    fn test_listing_and_directories() {
        let export = MemoryNfs::with_files(
            "garfield",
            &[("/dir/b.txt", b"B"), ("/dir/a.txt", b"A"), ("/dir/sub/c.txt", b"C")],
        );
        let dir = export.open("nfs://garfield:v2m//dir");
        assert_eq!(dir.list().unwrap(), vec!["a.txt", "b.txt", "sub"]);
        assert!(export.open("nfs://garfield:v2m//dir/a.txt").list().is_none());
        assert!(!dir.delete());

        let new_dir = export.open("nfs://garfield:v2m//dir/new");
        assert!(new_dir.mkdir());
        assert!(!new_dir.mkdir());
        assert!(new_dir.delete());
    }

    #[test]
    fn test_write_append_and_rename() {
        let export = MemoryNfs::with_files("garfield", &[("/a.txt", b"abc")]);
        let file = export.open("nfs://garfield:v2m//a.txt");

        file.open_write(true).unwrap().write_all(b"def").unwrap();
        assert_eq!(export.read_file("/a.txt").unwrap(), b"abcdef");

        file.open_write(false).unwrap().write_all(b"x").unwrap();
        assert_eq!(export.read_file("/a.txt").unwrap(), b"x");

        let dest = export.open("nfs://garfield:v2m//b.txt");
        assert!(file.rename_to(dest.as_ref()));
        assert!(!export.contains("/a.txt"));
        assert_eq!(export.read_file("/b.txt").unwrap(), b"x");
    }
}
