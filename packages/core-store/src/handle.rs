//! Open-file handles.
//!
//! Adapters produce raw handles ([`BlockingHandle`] or [`AsyncHandle`]);
//! callers receive them wrapped in [`FileHandle`] / [`AsyncFileHandle`],
//! which make `close` idempotent and guarantee release on drop.
//!
//! Raw handles move bytes only. The facade handles add the per-open
//! behaviour: a write buffer sized by `buffering` (line buffered for text
//! opens with `buffering = 1`) and the text helpers driven by
//! [`TextCodec`]. A single handle is not reentrant; the `&mut` receivers
//! make callers serialize access.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;

use crate::text::TextCodec;
use crate::{Error, OpenOptions, Result};

/// A blocking, backend-produced stream over one open resource.
///
/// Implementations must release the resource when dropped, even if
/// [`BlockingHandle::close`] was never called.
pub trait BlockingHandle: Send {
    /// Read up to `max` bytes, or everything that is left when `None`.
    /// An empty result means end of stream.
    fn read(&mut self, max: Option<usize>) -> Result<Bytes>;

    /// Write all of `data`, returning the number of bytes written.
    fn write(&mut self, data: Bytes) -> Result<usize>;

    fn flush(&mut self) -> Result<()>;

    /// Release the resource. Calling it twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Async version of [`BlockingHandle`].
#[async_trait]
pub trait AsyncHandle: Send {
    async fn read(&mut self, max: Option<usize>) -> Result<Bytes>;

    async fn write(&mut self, data: Bytes) -> Result<usize>;

    async fn flush(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

fn closed_error(key: &str) -> Error {
    Error::validation(format!("I/O operation on closed file: {}", key))
}

/// Write coalescing shared by both facade handles.
#[derive(Debug, Default)]
struct WriteBuffer {
    pending: Vec<u8>,
    /// Flush once this many bytes are pending; 0 passes writes through.
    capacity: usize,
    line: bool,
    binary: bool,
}

impl WriteBuffer {
    fn new(options: &OpenOptions) -> Self {
        let (capacity, line) = match options.buffering {
            Some(1) if !options.binary => (0, true),
            Some(n) if n > 1 => (n, false),
            _ => (0, false),
        };
        WriteBuffer {
            pending: Vec::new(),
            capacity,
            line,
            binary: options.binary,
        }
    }

    /// Queue `data`; returns what must go to the raw handle now.
    fn push(&mut self, data: Bytes) -> Option<Bytes> {
        if self.line {
            if data.contains(&b'\n') {
                self.pending.extend_from_slice(&data);
                return self.take();
            }
            self.pending.extend_from_slice(&data);
            return None;
        }
        if self.capacity == 0 {
            return Some(data);
        }
        self.pending.extend_from_slice(&data);
        if self.pending.len() >= self.capacity {
            return self.take();
        }
        None
    }

    fn take(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            None
        } else {
            Some(Bytes::from(std::mem::take(&mut self.pending)))
        }
    }

    fn text_mode(&self, key: &str) -> Result<()> {
        if self.binary {
            return Err(Error::validation(format!(
                "text operation on a binary handle: {}",
                key
            )));
        }
        Ok(())
    }
}

/// An open file, as returned by the blocking facade.
///
/// The underlying handle is closed exactly once: by [`FileHandle::close`],
/// or on drop if the caller never closed it.
pub struct FileHandle {
    inner: Option<Box<dyn BlockingHandle>>,
    key: String,
    buffer: WriteBuffer,
    codec: TextCodec,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("key", &self.key)
            .field("closed", &self.inner.is_none())
            .finish_non_exhaustive()
    }
}

impl FileHandle {
    pub fn new(inner: Box<dyn BlockingHandle>, key: impl Into<String>) -> Self {
        FileHandle {
            inner: Some(inner),
            key: key.into(),
            buffer: WriteBuffer::default(),
            codec: TextCodec::default(),
        }
    }

    /// Apply the buffering and text arguments of `options`.
    pub fn with_options(mut self, options: &OpenOptions) -> Result<Self> {
        self.buffer = WriteBuffer::new(options);
        self.codec = TextCodec::from_options(options)?;
        Ok(self)
    }

    /// The backend key this handle was opened on.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn live(&mut self) -> Result<&mut Box<dyn BlockingHandle>> {
        match self.inner.as_mut() {
            Some(inner) => Ok(inner),
            None => Err(closed_error(&self.key)),
        }
    }

    fn write_pending(&mut self) -> Result<()> {
        if let Some(data) = self.buffer.take() {
            self.live()?.write(data)?;
        }
        Ok(())
    }

    pub fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        self.write_pending()?;
        self.live()?.read(max)
    }

    pub fn read_to_end(&mut self) -> Result<Bytes> {
        self.read(None)
    }

    /// Read the rest of the file as text.
    pub fn read_text(&mut self) -> Result<String> {
        self.buffer.text_mode(&self.key)?;
        let data = self.read_to_end()?;
        self.codec.decode(&self.key, &data)
    }

    /// Returns the number of bytes accepted, which may still be buffered.
    pub fn write(&mut self, data: impl Into<Bytes>) -> Result<usize> {
        let data = data.into();
        let len = data.len();
        self.live()?;
        if let Some(ready) = self.buffer.push(data) {
            self.live()?.write(ready)?;
        }
        Ok(len)
    }

    /// Encode `text` and write it; returns the encoded length.
    pub fn write_text(&mut self, text: &str) -> Result<usize> {
        self.buffer.text_mode(&self.key)?;
        let data = self.codec.encode(text);
        self.write(data)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.write_pending()?;
        self.live()?.flush()
    }

    /// Pending writes are flushed first; the handle is released even if
    /// that flush fails.
    pub fn close(&mut self) -> Result<()> {
        let flushed = if self.inner.is_some() {
            self.write_pending()
        } else {
            Ok(())
        };
        let closed = match self.inner.take() {
            Some(mut inner) => inner.close(),
            None => Ok(()),
        };
        flushed.and(closed)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!(key = %self.key, error = %e, "failed to close file handle on drop");
            }
        }
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = FileHandle::read(self, Some(buf.len())).map_err(io::Error::other)?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileHandle::write(self, Bytes::copy_from_slice(buf)).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileHandle::flush(self).map_err(io::Error::other)
    }
}

/// An open file, as returned by the async facade.
///
/// Dropping it without calling [`AsyncFileHandle::close`] drops the inner
/// handle, which releases the resource on its own.
pub struct AsyncFileHandle {
    inner: Option<Box<dyn AsyncHandle>>,
    key: String,
    buffer: WriteBuffer,
    codec: TextCodec,
}

impl AsyncFileHandle {
    pub fn new(inner: Box<dyn AsyncHandle>, key: impl Into<String>) -> Self {
        AsyncFileHandle {
            inner: Some(inner),
            key: key.into(),
            buffer: WriteBuffer::default(),
            codec: TextCodec::default(),
        }
    }

    pub fn with_options(mut self, options: &OpenOptions) -> Result<Self> {
        self.buffer = WriteBuffer::new(options);
        self.codec = TextCodec::from_options(options)?;
        Ok(self)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn live(&mut self) -> Result<&mut Box<dyn AsyncHandle>> {
        match self.inner.as_mut() {
            Some(inner) => Ok(inner),
            None => Err(closed_error(&self.key)),
        }
    }

    async fn write_pending(&mut self) -> Result<()> {
        if let Some(data) = self.buffer.take() {
            self.live()?.write(data).await?;
        }
        Ok(())
    }

    pub async fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        self.write_pending().await?;
        self.live()?.read(max).await
    }

    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        self.read(None).await
    }

    pub async fn read_text(&mut self) -> Result<String> {
        self.buffer.text_mode(&self.key)?;
        let data = self.read_to_end().await?;
        self.codec.decode(&self.key, &data)
    }

    pub async fn write(&mut self, data: impl Into<Bytes>) -> Result<usize> {
        let data = data.into();
        let len = data.len();
        self.live()?;
        if let Some(ready) = self.buffer.push(data) {
            self.live()?.write(ready).await?;
        }
        Ok(len)
    }

    pub async fn write_text(&mut self, text: &str) -> Result<usize> {
        self.buffer.text_mode(&self.key)?;
        let data = self.codec.encode(text);
        self.write(data).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.write_pending().await?;
        self.live()?.flush().await
    }

    /// Dropping without `close` discards writes still held by the buffer.
    pub async fn close(&mut self) -> Result<()> {
        let flushed = if self.inner.is_some() {
            self.write_pending().await
        } else {
            Ok(())
        };
        let closed = match self.inner.take() {
            Some(mut inner) => inner.close().await,
            None => Ok(()),
        };
        flushed.and(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandle {
        data: Vec<u8>,
        pos: usize,
        closes: Arc<AtomicUsize>,
        closed: bool,
    }

    impl BlockingHandle for CountingHandle {
        fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
            let end = match max {
                Some(n) => (self.pos + n).min(self.data.len()),
                None => self.data.len(),
            };
            let chunk = Bytes::copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(chunk)
        }

        fn write(&mut self, data: Bytes) -> Result<usize> {
            self.data.extend_from_slice(&data);
            Ok(data.len())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            if !self.closed {
                self.closed = true;
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    fn handle(data: &[u8], closes: &Arc<AtomicUsize>) -> FileHandle {
        FileHandle::new(
            Box::new(CountingHandle {
                data: data.to_vec(),
                pos: 0,
                closes: closes.clone(),
                closed: false,
            }),
            "mem:test",
        )
    }

    #[test]
    fn close_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut h = handle(b"abc", &closes);
        h.close().unwrap();
        h.close().unwrap();
        drop(h);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_unclosed_handle() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let _h = handle(b"abc", &closes);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn operations_after_close_fail() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut h = handle(b"abc", &closes);
        h.close().unwrap();
        assert!(h.is_closed());
        assert!(h.read(None).unwrap_err().is_validation());
    }

    fn opened(data: &[u8], closes: &Arc<AtomicUsize>, options: OpenOptions) -> FileHandle {
        handle(data, closes).with_options(&options).unwrap()
    }

    #[test]
    fn writes_are_coalesced_up_to_buffering() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut h = opened(b"", &closes, OpenOptions::parse("wb").unwrap().buffering(4));
        h.write(&b"ab"[..]).unwrap();
        // pending writes reach the raw handle before any read
        assert_eq!(h.read(None).unwrap(), Bytes::from_static(b"ab"));
        h.write(&b"cdef"[..]).unwrap();
        h.write(&b"g"[..]).unwrap();
        h.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn text_helpers_follow_options() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut h = opened(
            b"one\r\ntwo \xff",
            &closes,
            OpenOptions::parse("r").unwrap().errors("replace"),
        );
        assert_eq!(h.read_text().unwrap(), "one\ntwo \u{fffd}");

        let mut h = opened(b"", &closes, OpenOptions::parse("w+").unwrap().newline("\r\n"));
        assert_eq!(h.write_text("a\nb\n").unwrap(), 6);
        assert_eq!(h.read(None).unwrap(), Bytes::from_static(b"a\r\nb\r\n"));

        let mut h = opened(b"x", &closes, OpenOptions::parse("rb").unwrap());
        assert!(h.read_text().unwrap_err().is_validation());
        assert!(h.write_text("x").unwrap_err().is_validation());
    }

    #[test]
    fn line_buffering_flushes_on_newline() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut h = opened(b"", &closes, OpenOptions::parse("w+").unwrap().buffering(1));
        h.write_text("partial").unwrap();
        h.write_text(" line\nrest").unwrap();
        assert_eq!(h.read(None).unwrap(), Bytes::from_static(b"partial line\nrest"));
    }

    #[test]
    fn std_io_read_interop() {
        use std::io::Read;
        let closes = Arc::new(AtomicUsize::new(0));
        let mut h = handle(b"hello world", &closes);
        let mut s = String::new();
        h.read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello world");
    }
}
