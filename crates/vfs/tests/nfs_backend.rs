//! NFS backend integration tests
//!
//! Run against the in-memory export; the local backend is used as the
//! foreign side of cross-protocol moves.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::tempdir;
use unifs_vfs::address::FileAddress;
use unifs_vfs::nfs::{self, url::TRANSPORT_PROPERTY, url::VERSION_PROPERTY, NfsHandle};
use unifs_vfs::{
    local, ArchiveCodec, ArchiveFile, FileAdapter, FileFactory, FileResolver, FilenameFilter,
    MemoryNfs, NativeRandomAccess, NfsClient, NfsConfig, NfsFile, VfsError,
};

fn setup(files: &[(&str, &[u8])]) -> (Arc<FileFactory>, MemoryNfs) {
    let export = MemoryNfs::with_files("garfield", files);
    let factory = FileFactory::new();
    nfs::register(&factory, Arc::new(export.clone()), NfsConfig::default());
    local::register(&factory);
    (factory, export)
}

/// Treats `*.zip` files as archives holding a fixed list of entries
struct FakeZip {
    entries: Vec<&'static str>,
}

#[async_trait]
impl ArchiveCodec for FakeZip {
    fn accepts(&self, name: &str) -> bool {
        name.ends_with(".zip")
    }

    async fn entries(
        &self,
        archive: &ArchiveFile,
        filter: Option<&dyn FilenameFilter>,
    ) -> unifs_vfs::Result<Vec<Arc<dyn FileAdapter>>> {
        let _ = archive.proxied().size().await?;
        Ok(self
            .entries
            .iter()
            .filter(|name| filter.map_or(true, |f| f.accept(name)))
            .map(|name| {
                let address = archive.address().child(name);
                Arc::new(Entry(address)) as Arc<dyn FileAdapter>
            })
            .collect())
    }
}

/// Minimal archive entry: attributes only
struct Entry(FileAddress);

#[async_trait]
impl FileAdapter for Entry {
    fn address(&self) -> &FileAddress {
        &self.0
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn modified_time(&self) -> unifs_vfs::Result<Option<std::time::SystemTime>> {
        Ok(None)
    }

    async fn size(&self) -> unifs_vfs::Result<u64> {
        Ok(0)
    }

    async fn exists(&self) -> unifs_vfs::Result<bool> {
        Ok(true)
    }

    async fn is_directory(&self) -> unifs_vfs::Result<bool> {
        Ok(false)
    }

    async fn permission(
        &self,
        _access: unifs_vfs::AccessClass,
        _permission: unifs_vfs::PermissionType,
    ) -> unifs_vfs::Result<bool> {
        Ok(false)
    }

    async fn parent(&self) -> unifs_vfs::Result<Option<Arc<dyn FileAdapter>>> {
        Ok(None)
    }

    fn set_parent(&self, _parent: Option<Arc<dyn FileAdapter>>) {}

    async fn list(
        &self,
        _filter: Option<&dyn FilenameFilter>,
    ) -> unifs_vfs::Result<Vec<Arc<dyn FileAdapter>>> {
        Ok(Vec::new())
    }

    async fn input_stream(&self) -> unifs_vfs::Result<Box<dyn unifs_vfs::ReadHandle>> {
        Err(VfsError::Unsupported("reading archive entries"))
    }

    async fn output_stream(
        &self,
        _append: bool,
    ) -> unifs_vfs::Result<Box<dyn unifs_vfs::WriteHandle>> {
        Err(VfsError::Unsupported("writing archive entries"))
    }
}

#[test]
fn test_default_port_is_omitted() -> Result<()> {
    let address = FileAddress::parse("nfs://garfield:2049/stuff/")?;
    assert_eq!(address.to_string(), "nfs://garfield/stuff");

    let address = FileAddress::parse("nfs://192.168.1.1:1234/stuff/somefile")?;
    assert_eq!(address.to_string(), "nfs://192.168.1.1:1234/stuff/somefile");
    Ok(())
}

#[test]
fn test_native_url_carries_options() -> Result<()> {
    let (factory, export) = setup(&[("/stuff/a.txt", b"a")]);

    let mut address = FileAddress::parse("nfs://garfield:2049/stuff/a.txt")?;
    address.set_property(VERSION_PROPERTY, "v3");
    address.set_property(TRANSPORT_PROPERTY, "TCP");
    let file = factory.resolve(&address)?;

    let nfs_file = file
        .as_any()
        .downcast_ref::<NfsFile>()
        .expect("resolved an NFS file");
    assert_eq!(nfs_file.native_url(), "nfs://garfield:v3tm//stuff/a.txt");
    assert_eq!(file.absolute_path(), "nfs://garfield/stuff/a.txt");
    assert!(export.opened_urls().contains(&"nfs://garfield:v3tm//stuff/a.txt".to_string()));

    let file = factory.resolve_str("nfs://garfield:1234/stuff/a.txt")?;
    let nfs_file = file.as_any().downcast_ref::<NfsFile>().expect("NFS file");
    assert_eq!(nfs_file.native_url(), "nfs://garfield:1234v2m//stuff/a.txt");
    Ok(())
}

#[tokio::test]
async fn test_list_applies_filter_before_building_children() -> Result<()> {
    let (factory, _export) = setup(&[
        ("/dir/a.txt", b"a"),
        ("/dir/b.log", b"b"),
        ("/dir/c.txt", b"c"),
        ("/dir/d.txt", b"d"),
        ("/dir/e.bin", b"e"),
    ]);
    let dir = factory.resolve_str("nfs://garfield/dir/")?;

    let filter = |name: &str| name.ends_with(".txt");
    let children = dir.list(Some(&filter)).await?;
    assert_eq!(children.len(), 3);

    for child in &children {
        let path = child.absolute_path();
        assert_eq!(path, format!("nfs://garfield/dir/{}", child.name()));
        assert!(!path["nfs://".len()..].contains("//"));

        let parent = child.parent().await?.expect("child has a parent");
        assert!(parent.as_ref() == dir.as_ref());
    }

    assert_eq!(dir.list(None).await?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_list_failures_are_io_errors() -> Result<()> {
    let (factory, export) = setup(&[("/dir/a.txt", b"a")]);

    let file = factory.resolve_str("nfs://garfield/dir/a.txt")?;
    assert!(matches!(file.list(None).await, Err(VfsError::Io(_))));

    let missing = factory.resolve_str("nfs://garfield/nowhere")?;
    assert!(matches!(missing.list(None).await, Err(VfsError::Io(_))));

    export.set_access("/dir", false, false);
    let dir = factory.resolve_str("nfs://garfield/dir")?;
    assert!(matches!(dir.list(None).await, Err(VfsError::Io(_))));
    Ok(())
}

#[tokio::test]
async fn test_archives_are_decorated() -> Result<()> {
    let (factory, _export) = setup(&[("/dir/bundle.zip", b"PK"), ("/dir/plain.txt", b"x")]);
    factory.register_archive_codec(Arc::new(FakeZip {
        entries: vec!["one.txt", "two.txt", "three.md"],
    }));

    let children = factory.resolve_str("nfs://garfield/dir")?.list(None).await?;
    let bundle = children
        .iter()
        .find(|c| c.name() == "bundle.zip")
        .expect("archive listed");
    let plain = children
        .iter()
        .find(|c| c.name() == "plain.txt")
        .expect("file listed");

    assert!(plain.as_archive().is_none());
    let archive = bundle.as_archive().expect("archive view");
    assert!(archive.proxied().as_any().downcast_ref::<NfsFile>().is_some());
    assert_eq!(bundle.size().await?, 2);

    let filter = |name: &str| name.ends_with(".txt");
    let entries = bundle.list(Some(&filter)).await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].absolute_path(),
        "nfs://garfield/dir/bundle.zip/one.txt"
    );
    Ok(())
}

#[tokio::test]
async fn test_same_backend_move_reports_rename_outcome() -> Result<()> {
    let (factory, export) = setup(&[("/a.txt", b"a"), ("/taken.txt", b"t")]);

    let src = factory.resolve_str("nfs://garfield/a.txt")?;
    let dest = factory.resolve_str("nfs://garfield/b.txt")?;
    assert!(src.move_to(dest).await?);
    assert!(!export.contains("/a.txt"));
    assert_eq!(export.read_file("/b.txt"), Some(b"a".to_vec()));

    // Failed renames are reported through the return value only
    let src = factory.resolve_str("nfs://garfield/b.txt")?;
    let dest = factory.resolve_str("nfs://garfield/taken.txt")?;
    assert!(!src.move_to(dest).await?);

    let missing = factory.resolve_str("nfs://garfield/missing.txt")?;
    let dest = factory.resolve_str("nfs://garfield/c.txt")?;
    assert!(!missing.move_to(dest).await?);

    let dest = factory.resolve_str("nfs://garfield/no/such/dir/c.txt")?;
    let src = factory.resolve_str("nfs://garfield/b.txt")?;
    assert!(!src.move_to(dest).await?);
    assert!(export.contains("/b.txt"));
    Ok(())
}

#[tokio::test]
async fn test_move_onto_archive_renames_underlying_file() -> Result<()> {
    let (factory, export) = setup(&[("/a.zip", b"PK")]);
    factory.register_archive_codec(Arc::new(FakeZip { entries: vec![] }));

    let src = factory.resolve_str("nfs://garfield/a.zip")?;
    let dest = factory.resolve_str("nfs://garfield/b.zip")?;
    assert!(dest.as_archive().is_some());
    assert!(src.move_to(dest).await?);
    assert!(export.contains("/b.zip"));
    Ok(())
}

#[tokio::test]
async fn test_cross_backend_move_copies_then_deletes() -> Result<()> {
    let (factory, export) = setup(&[("/report.txt", b"quarterly numbers")]);
    let dir = tempdir()?;

    let src = factory.resolve_str("nfs://garfield/report.txt")?;
    let dest = factory.resolve(&local::address_of(&dir.path().join("report.txt"))?)?;
    assert!(src.move_to(dest).await?);

    assert!(!export.contains("/report.txt"));
    assert_eq!(
        std::fs::read(dir.path().join("report.txt"))?,
        b"quarterly numbers"
    );

    // And back again
    let src = factory.resolve(&local::address_of(&dir.path().join("report.txt"))?)?;
    let dest = factory.resolve_str("nfs://garfield/report.txt")?;
    assert!(src.move_to(dest).await?);
    assert_eq!(export.read_file("/report.txt"), Some(b"quarterly numbers".to_vec()));
    assert!(!dir.path().join("report.txt").exists());
    Ok(())
}

/// Export whose handles cannot tell their length, as some servers answer
struct UnknownLengthNfs(MemoryNfs);

impl NfsClient for UnknownLengthNfs {
    fn open(&self, native_url: &str) -> Box<dyn NfsHandle> {
        Box::new(UnknownLength(self.0.open(native_url)))
    }
}

struct UnknownLength(Box<dyn NfsHandle>);

impl NfsHandle for UnknownLength {
    fn exists(&self) -> bool {
        self.0.exists()
    }

    fn is_directory(&self) -> bool {
        self.0.is_directory()
    }

    fn length(&self) -> u64 {
        0
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.0.last_modified()
    }

    fn can_read(&self) -> bool {
        self.0.can_read()
    }

    fn can_write(&self) -> bool {
        self.0.can_write()
    }

    fn list(&self) -> Option<Vec<String>> {
        self.0.list()
    }

    fn mkdir(&self) -> bool {
        self.0.mkdir()
    }

    fn delete(&self) -> bool {
        self.0.delete()
    }

    fn rename_to(&self, dest: &dyn NfsHandle) -> bool {
        self.0.rename_to(dest)
    }

    fn native_url(&self) -> &str {
        self.0.native_url()
    }

    fn open_read(&self) -> std::io::Result<Box<dyn Read + Send>> {
        self.0.open_read()
    }

    fn open_write(&self, append: bool) -> std::io::Result<Box<dyn Write + Send>> {
        self.0.open_write(append)
    }

    fn open_random_access(&self) -> std::io::Result<Box<dyn NativeRandomAccess>> {
        self.0.open_random_access()
    }
}

#[tokio::test]
async fn test_unknown_length_reads_to_the_end() -> Result<()> {
    let export = MemoryNfs::with_files("garfield", &[("/report.txt", b"quarterly numbers")]);
    let factory = FileFactory::new();
    let client = Arc::new(UnknownLengthNfs(export.clone()));
    nfs::register(&factory, client, NfsConfig::default());
    local::register(&factory);

    let src = factory.resolve_str("nfs://garfield/report.txt")?;
    assert_eq!(src.size().await?, 0);

    let mut reader = src.input_stream().await?;
    let mut content = Vec::new();
    loop {
        let chunk = reader.read_chunk().await?;
        content.extend_from_slice(&chunk.data);
        if chunk.is_last {
            break;
        }
    }
    reader.close().await?;
    assert_eq!(content, b"quarterly numbers");

    // The copy must not stop at the reported length before the source goes
    let dir = tempdir()?;
    let dest = factory.resolve(&local::address_of(&dir.path().join("report.txt"))?)?;
    assert!(src.move_to(dest).await?);
    assert_eq!(
        std::fs::read(dir.path().join("report.txt"))?,
        b"quarterly numbers"
    );
    assert!(!export.contains("/report.txt"));
    Ok(())
}

#[tokio::test]
async fn test_cross_backend_move_failure_raises() -> Result<()> {
    let (factory, export) = setup(&[("/dir/a.txt", b"a")]);
    let dir = tempdir()?;

    let src = factory.resolve_str("nfs://garfield/missing.txt")?;
    let dest = factory.resolve(&local::address_of(&dir.path().join("a.txt"))?)?;
    assert!(matches!(src.move_to(dest).await, Err(VfsError::Io(_))));

    let src = factory.resolve_str("nfs://garfield/dir")?;
    let dest = factory.resolve(&local::address_of(&dir.path().join("dir"))?)?;
    assert!(matches!(src.move_to(dest).await, Err(VfsError::Io(_))));
    assert!(export.contains("/dir/a.txt"));
    Ok(())
}

#[tokio::test]
async fn test_unsupported_operations() -> Result<()> {
    let (factory, _export) = setup(&[("/a.txt", b"a")]);
    let file = factory.resolve_str("nfs://garfield/a.txt")?;

    assert!(!file.change_modified_time(std::time::SystemTime::now()).await);
    assert_eq!(file.free_space().await, -1);
    assert_eq!(file.total_space().await, -1);
    assert!(!file.can_run_external_process());
    assert!(matches!(
        file.run_external_process(&["true".to_string()]).await,
        Err(VfsError::Unsupported(_))
    ));

    assert!(matches!(
        factory.resolve_str("smb://garfield/a.txt"),
        Err(VfsError::NotFound(_))
    ));
    Ok(())
}
