//! [`StreamBuffer`], a circular-ish byte buffer
//! (`prepare`/`commit`/`data`/`consume`), and [`BufferedStream`], the
//! read-ahead wrapper over [`crate::stream::AsyncStream`] both the TLS
//! record layer and the HTTP/1.1 line parser build on.

use wisp_core::error::{categories, Code, Error};
use wisp_core::Result;

use crate::stream::AsyncStream;

/// A growable byte buffer with the read-ahead shape protocol parsers
/// want: reserve writable space, commit what was actually written, read
/// what's buffered without consuming it, then consume once processed.
///
/// Not a true ring buffer (no wraparound) — it compacts by shifting
/// unread bytes to the front when `prepare` needs more room than the
/// tail has left, which is the same amortized-linear tradeoff
/// `std::collections::VecDeque` makes and is simpler to reason about at
/// this buffer's scale (single-connection framing, not a hot allocator
/// path).
pub struct StreamBuffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    limit: usize,
}

impl StreamBuffer {
    /// `limit` bounds how large the buffer is allowed to grow, matching
    /// §4.8's "buffer sizes are bounded; exceeding the limit during
    /// `getline` is an error."
    pub fn new(limit: usize) -> Self {
        StreamBuffer {
            buf: Vec::new(),
            start: 0,
            end: 0,
            limit,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn consume(&mut self, n: usize) {
        self.start += n.min(self.end - self.start);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Reserves at least `n` writable bytes at the tail, compacting
    /// (shifting unread data to the front) or growing as needed. Returns
    /// `Err(Code::InvalidArgument)` if honoring the request would exceed
    /// `limit`.
    pub fn prepare(&mut self, n: usize) -> Result<&mut [u8]> {
        let available_tail = self.buf.len() - self.end;
        if available_tail < n {
            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }
            let needed = self.end + n;
            if needed > self.limit {
                return Err(Error::new(categories::GENERIC, Code::InvalidArgument)
                    .with_message("StreamBuffer::prepare would exceed its configured limit"));
            }
            if self.buf.len() < needed {
                self.buf.resize(needed, 0);
            }
        }
        Ok(&mut self.buf[self.end..self.end + n])
    }

    pub fn commit(&mut self, n: usize) {
        self.end += n;
    }
}

/// Read-ahead wrapper over any [`AsyncStream`].
pub struct BufferedStream<S> {
    inner: S,
    read_buf: StreamBuffer,
    write_buf: Option<StreamBuffer>,
}

const DEFAULT_CHUNK: usize = 8 * 1024;

impl<S: AsyncStream> BufferedStream<S> {
    pub fn new(inner: S) -> Self {
        BufferedStream::with_limit(inner, 64 * 1024)
    }

    pub fn with_limit(inner: S, limit: usize) -> Self {
        BufferedStream {
            inner,
            read_buf: StreamBuffer::new(limit),
            write_buf: None,
        }
    }

    /// Enables write buffering with the same size limit as reads. By
    /// default `write` passes straight through to the underlying stream.
    pub fn buffer_writes(&mut self, limit: usize) {
        self.write_buf = Some(StreamBuffer::new(limit));
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    async fn fill_buf(&mut self) -> Result<usize> {
        let chunk = self.read_buf.prepare(DEFAULT_CHUNK)?;
        let n = self.inner.read(chunk).await?;
        self.read_buf.commit(n);
        Ok(n)
    }

    /// Draws from the internal buffer first; refills from the underlying
    /// stream when it's empty.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_buf.is_empty() {
            self.fill_buf().await?;
        }
        let available = self.read_buf.data();
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_buf.consume(n);
        Ok(n)
    }

    /// Returns the next chunk up to (and excluding) `delim`, refilling as
    /// needed. `Err(Code::InvalidArgument)` (via `UnexpectedEof`'s
    /// mapping) if the stream ends before `delim` appears, or if no
    /// match fits inside the configured buffer limit.
    pub async fn getline(&mut self, delim: u8) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = self.read_buf.data().iter().position(|&b| b == delim) {
                let line = self.read_buf.data()[..pos].to_vec();
                self.read_buf.consume(pos + 1);
                return Ok(line);
            }
            let n = self.fill_buf().await?;
            if n == 0 {
                return Err(Error::new(categories::GENERIC, Code::Unknown)
                    .with_message("unexpected EOF before delimiter"));
            }
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match &mut self.write_buf {
            Some(write_buf) => {
                let span = write_buf.prepare(buf.len())?;
                span.copy_from_slice(buf);
                write_buf.commit(buf.len());
                Ok(buf.len())
            }
            None => self.inner.write(buf).await,
        }
    }

    pub async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Empties the write buffer (if any) to the underlying stream, then
    /// forwards flush.
    pub async fn flush(&mut self) -> Result<()> {
        if let Some(write_buf) = &mut self.write_buf {
            while !write_buf.is_empty() {
                let n = self.inner.write(write_buf.data()).await?;
                if n == 0 {
                    return Err(io_write_zero());
                }
                write_buf.consume(n);
            }
        }
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.flush().await?;
        self.inner.shutdown()
    }
}

fn io_write_zero() -> Error {
    Error::new(categories::GENERIC, Code::Unknown).with_message("write returned zero bytes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use wisp_core::executor::LocalExecutor;
    use wisp_core::future::LocalBoxFuture;

    struct MemStream {
        read_data: RefCell<std::collections::VecDeque<u8>>,
        written: RefCell<Vec<u8>>,
    }

    impl MemStream {
        fn new(data: &[u8]) -> Self {
            MemStream {
                read_data: RefCell::new(data.iter().copied().collect()),
                written: RefCell::new(Vec::new()),
            }
        }
    }

    impl AsyncStream for MemStream {
        fn read<'a>(&'a self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                let mut data = self.read_data.borrow_mut();
                let n = buf.len().min(data.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = data.pop_front().unwrap();
                }
                Ok(n)
            })
        }

        fn write<'a>(&'a self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                self.written.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            })
        }

        fn flush<'a>(&'a self) -> LocalBoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn getline_splits_on_delimiter() {
        let exec = LocalExecutor::new();
        let stream = MemStream::new(b"hello\nworld\n");
        let mut buffered = BufferedStream::new(stream);
        let (first, second) = exec.block_on(async move {
            let first = buffered.getline(b'\n').await.unwrap();
            let second = buffered.getline(b'\n').await.unwrap();
            (first, second)
        });
        assert_eq!(first, b"hello");
        assert_eq!(second, b"world");
    }

    #[test]
    fn getline_without_delimiter_is_unexpected_eof() {
        let exec = LocalExecutor::new();
        let stream = MemStream::new(b"no newline here");
        let mut buffered = BufferedStream::new(stream);
        let result = exec.block_on(async move { buffered.getline(b'\n').await });
        assert!(result.is_err());
    }

    #[test]
    fn read_draws_from_buffer_before_refilling() {
        let exec = LocalExecutor::new();
        let stream = MemStream::new(b"abcdef");
        let mut buffered = BufferedStream::new(stream);
        let (first, second) = exec.block_on(async move {
            let mut a = [0u8; 3];
            let mut b = [0u8; 3];
            buffered.read(&mut a).await.unwrap();
            buffered.read(&mut b).await.unwrap();
            (a, b)
        });
        assert_eq!(&first, b"abc");
        assert_eq!(&second, b"def");
    }
}
