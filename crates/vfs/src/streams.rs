//! Handles over blocking `std::io` streams
//!
//! Native clients hand out plain `Read`/`Write` objects; these wrappers run
//! them on the blocking pool and expose the [`ReadHandle`]/[`WriteHandle`]
//! contract. Seekable sources are exposed read-only through
//! [`RandomAccessInput`].

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{RandomAccessRead, ReadChunk, ReadHandle, WriteHandle};
use crate::error::{Result, VfsError};

/// Default chunk size for streaming (64KB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming read handle over any blocking reader
pub struct BlockingReadHandle<R> {
    reader: Arc<Mutex<Option<R>>>,
    size: Option<u64>,
    offset: u64,
}

impl<R: Read + Send + 'static> BlockingReadHandle<R> {
    pub fn new(reader: R, size: Option<u64>) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Some(reader))),
            size,
            offset: 0,
        }
    }
}

#[async_trait]
impl<R: Read + Send + 'static> ReadHandle for BlockingReadHandle<R> {
    async fn read_chunk(&mut self) -> Result<ReadChunk> {
        let reader = self.reader.clone();
        let want = self
            .size
            .map_or(CHUNK_SIZE, |size| {
                usize::try_from(size.saturating_sub(self.offset))
                    .map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE))
            })
            .max(1);

        let data = tokio::task::spawn_blocking(move || {
            let mut guard = reader.lock().map_err(|_| VfsError::io("Lock poisoned"))?;
            let reader = guard.as_mut().ok_or_else(|| VfsError::io("stream is closed"))?;
            let mut buffer = vec![0u8; want];
            let bytes_read = reader.read(&mut buffer)?;
            buffer.truncate(bytes_read);
            Ok::<_, VfsError>(buffer)
        })
        .await
        .map_err(|e| VfsError::io(format!("read task failed: {e}")))??;

        let bytes_read = data.len() as u64;
        let is_last = bytes_read == 0
            || self
                .size
                .is_some_and(|size| self.offset + bytes_read >= size);
        let chunk = ReadChunk {
            data,
            offset: self.offset,
            is_last,
        };
        self.offset += bytes_read;
        Ok(chunk)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    async fn close(&mut self) -> Result<()> {
        self.reader
            .lock()
            .map_err(|_| VfsError::io("Lock poisoned"))?
            .take();
        Ok(())
    }
}

/// Streaming write handle over any blocking writer
pub struct BlockingWriteHandle<W> {
    writer: Arc<Mutex<Option<W>>>,
    bytes_written: u64,
}

impl<W: Write + Send + 'static> BlockingWriteHandle<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Some(writer))),
            bytes_written: 0,
        }
    }
}

#[async_trait]
impl<W: Write + Send + 'static> WriteHandle for BlockingWriteHandle<W> {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.clone();
        let data = data.to_vec();
        let bytes = data.len() as u64;

        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock().map_err(|_| VfsError::io("Lock poisoned"))?;
            let writer = guard.as_mut().ok_or_else(|| VfsError::io("stream is closed"))?;
            writer.write_all(&data)?;
            Ok::<_, VfsError>(())
        })
        .await
        .map_err(|e| VfsError::io(format!("write task failed: {e}")))??;

        self.bytes_written += bytes;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock().map_err(|_| VfsError::io("Lock poisoned"))?;
            if let Some(mut writer) = guard.take() {
                writer.flush()?;
            }
            Ok::<_, VfsError>(())
        })
        .await
        .map_err(|e| VfsError::io(format!("close task failed: {e}")))??;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Seekable file of a native library
pub trait NativeRandomAccess: Read + Seek + Send {
    fn length(&mut self) -> io::Result<u64>;
}

impl NativeRandomAccess for io::Cursor<Vec<u8>> {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

/// Read-only random access over a [`NativeRandomAccess`] source
///
/// Write operations of the source are not exposed. The source is dropped on
/// [`close`](RandomAccessRead::close) or with the wrapper.
pub struct RandomAccessInput {
    file: Mutex<Option<Box<dyn NativeRandomAccess>>>,
}

impl RandomAccessInput {
    pub fn new(file: Box<dyn NativeRandomAccess>) -> Self {
        Self {
            file: Mutex::new(Some(file)),
        }
    }

    fn with_file<T>(
        &self,
        op: impl FnOnce(&mut dyn NativeRandomAccess) -> io::Result<T>,
    ) -> Result<T> {
        let mut guard = self.file.lock().map_err(|_| VfsError::io("Lock poisoned"))?;
        let file = guard
            .as_deref_mut()
            .ok_or_else(|| VfsError::io("random access stream is closed"))?;
        Ok(op(file)?)
    }
}

#[async_trait]
impl RandomAccessRead for RandomAccessInput {
    async fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = self.with_file(|f| f.read(&mut byte))?;
        Ok((n == 1).then_some(byte[0]))
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.with_file(|f| f.read(buf))
    }

    async fn offset(&mut self) -> Result<u64> {
        self.with_file(|f| f.stream_position())
    }

    async fn length(&mut self) -> Result<u64> {
        self.with_file(|f| f.length())
    }

    async fn seek(&mut self, pos: u64) -> Result<()> {
        self.with_file(|f| f.seek(SeekFrom::Start(pos)).map(|_| ()))
    }

    async fn close(&mut self) -> Result<()> {
        self.file
            .lock()
            .map_err(|_| VfsError::io("Lock poisoned"))?
            .take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_chunks_until_end() {
        let data = vec![7u8; CHUNK_SIZE + 10];
        let size = Some(data.len() as u64);
        let mut reader = BlockingReadHandle::new(Cursor::new(data.clone()), size);

        let first = reader.read_chunk().await.unwrap();
        assert_eq!(first.data.len(), CHUNK_SIZE);
        assert!(!first.is_last);

        let second = reader.read_chunk().await.unwrap();
        assert_eq!(second.offset, CHUNK_SIZE as u64);
        assert_eq!(second.data.len(), 10);
        assert!(second.is_last);
    }

    #[tokio::test]
    async fn test_unknown_size_ends_on_empty_read() {
        let mut reader = BlockingReadHandle::new(Cursor::new(b"abc".to_vec()), None);
        let chunk = reader.read_chunk().await.unwrap();
        assert_eq!(chunk.data, b"abc");
        assert!(!chunk.is_last);
        assert!(reader.read_chunk().await.unwrap().is_last);
    }

    #[tokio::test]
    async fn test_closed_stream_fails() {
        let mut reader = BlockingReadHandle::new(Cursor::new(b"abc".to_vec()), Some(3));
        reader.close().await.unwrap();
        assert!(reader.read_chunk().await.is_err());

        let mut writer = BlockingWriteHandle::new(Vec::new());
        writer.write_chunk(b"abc").await.unwrap();
        assert_eq!(writer.bytes_written(), 3);
        writer.close().await.unwrap();
        assert!(writer.write_chunk(b"d").await.is_err());
    }

    #[tokio::test]
    async fn test_random_access_input() {
        let source = Cursor::new(b"0123456789".to_vec());
        let mut input = RandomAccessInput::new(Box::new(source));
        assert_eq!(input.length().await.unwrap(), 10);

        input.seek(7).await.unwrap();
        assert_eq!(input.read_byte().await.unwrap(), Some(b'7'));
        assert_eq!(input.offset().await.unwrap(), 8);

        let mut buf = [0u8; 4];
        assert_eq!(input.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(input.read_byte().await.unwrap(), None);

        input.close().await.unwrap();
        assert!(input.read_byte().await.is_err());
        assert!(input.length().await.is_err());
    }
}
