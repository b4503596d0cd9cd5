//! Open files for the local adapters.

use std::fs;
use std::io::{Read, Write};

use async_trait::async_trait;
use bytes::Bytes;
use storeloc_core::{AsyncHandle, BlockingHandle, Error, OpenOptions, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn closed() -> Error {
    Error::validation("I/O operation on closed file")
}

pub(crate) fn std_options(options: &OpenOptions) -> fs::OpenOptions {
    let mut std = fs::OpenOptions::new();
    std.read(options.read)
        .write(options.write)
        .append(options.append)
        .truncate(options.truncate)
        .create(options.create)
        .create_new(options.create_new);
    std
}

/// A `std::fs::File` behind the blocking handle contract.
pub struct LocalFile {
    file: Option<fs::File>,
    key: String,
}

impl LocalFile {
    pub fn new(file: fs::File, key: String) -> Self {
        LocalFile {
            file: Some(file),
            key,
        }
    }

    fn file(&mut self) -> Result<&mut fs::File> {
        self.file.as_mut().ok_or_else(closed)
    }
}

impl BlockingHandle for LocalFile {
    fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        let key = self.key.clone();
        let file = self.file()?;
        let mut buf = Vec::new();
        let read = match max {
            Some(n) => file.take(n as u64).read_to_end(&mut buf),
            None => file.read_to_end(&mut buf),
        };
        read.map_err(|e| Error::from_io(key, e))?;
        Ok(Bytes::from(buf))
    }

    fn write(&mut self, data: Bytes) -> Result<usize> {
        let key = self.key.clone();
        self.file()?
            .write_all(&data)
            .map_err(|e| Error::from_io(key, e))?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        let key = self.key.clone();
        self.file()?.flush().map_err(|e| Error::from_io(key, e))
    }

    fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(mut file) => file.flush().map_err(|e| Error::from_io(&self.key, e)),
            None => Ok(()),
        }
    }
}

/// A `tokio::fs::File` behind the async handle contract.
///
/// tokio completes writes in the background; `flush` and `close` wait for
/// them, so a handle must be closed before its writes are visible to a
/// fresh reader.
pub struct AsyncLocalFile {
    file: Option<tokio::fs::File>,
    key: String,
}

impl AsyncLocalFile {
    pub fn new(file: tokio::fs::File, key: String) -> Self {
        AsyncLocalFile {
            file: Some(file),
            key,
        }
    }
}

#[async_trait]
impl AsyncHandle for AsyncLocalFile {
    async fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        let mut buf = Vec::new();
        let read = match max {
            Some(n) => file.take(n as u64).read_to_end(&mut buf).await,
            None => file.read_to_end(&mut buf).await,
        };
        read.map_err(|e| Error::from_io(&self.key, e))?;
        Ok(Bytes::from(buf))
    }

    async fn write(&mut self, data: Bytes) -> Result<usize> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(&data)
            .await
            .map_err(|e| Error::from_io(&self.key, e))?;
        Ok(data.len())
    }

    async fn flush(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.flush().await.map_err(|e| Error::from_io(&self.key, e))
    }

    async fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(mut file) => file.flush().await.map_err(|e| Error::from_io(&self.key, e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_read_in_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "abcdef").unwrap();

        let mut handle = LocalFile::new(fs::File::open(&path).unwrap(), "f.txt".into());
        assert_eq!(handle.read(Some(4)).unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(handle.read(None).unwrap(), Bytes::from_static(b"ef"));
        assert!(handle.read(Some(4)).unwrap().is_empty());
        handle.close().unwrap();
        handle.close().unwrap();
        assert!(handle.read(None).unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_async_local_file_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");

        let file = tokio::fs::File::create(&path).await.unwrap();
        let mut handle = AsyncLocalFile::new(file, "f.bin".into());
        assert_eq!(handle.write(Bytes::from_static(b"hello")).await.unwrap(), 5);
        handle.close().await.unwrap();
        assert!(handle.write(Bytes::new()).await.unwrap_err().is_validation());

        let file = tokio::fs::File::open(&path).await.unwrap();
        let mut handle = AsyncLocalFile::new(file, "f.bin".into());
        assert_eq!(handle.read(Some(2)).await.unwrap(), Bytes::from_static(b"he"));
        assert_eq!(handle.read(None).await.unwrap(), Bytes::from_static(b"llo"));
    }
}
