//! [`Http1Connection`] / [`Http1Stream`] — the HTTP/1.1 framing state
//! machine (RFC 7230). One stream may be active on a connection at a
//! time, enforced by an [`wisp_core::sync::AsyncMutex`] acquired in
//! [`Http1Connection::new_stream`] and released when the stream drops.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wisp_core::error::{categories, Code, Error};
use wisp_core::sync::{AsyncMutex, AsyncMutexGuard};
use wisp_core::Result;
use wisp_stream::{AsyncStream, BufferedStream};

use crate::headers::{well_known, HttpHeaders};
use crate::url::Url;

/// The shared transport type every `Http1Connection` frames: type-erased
/// so the caller (`HttpWorker`) can hand in a plain TCP stream or one
/// already wrapped in `wisp_stream::TlsStream`, matching Design Notes §9.
pub type Transport = Rc<dyn AsyncStream>;

pub struct Http1Connection {
    client: RefCell<BufferedStream<Transport>>,
    mutex: AsyncMutex,
    broken: Cell<bool>,
    num_streams: Cell<usize>,
    /// Design Notes §9 open question: whether a keep-alive reply with
    /// neither `Content-Length` nor chunked framing is rejected as a bad
    /// reply (the source's behavior, and this stack's default) or
    /// tolerated as an until-close body.
    reject_chunkless_keep_alive: Cell<bool>,
}

impl Http1Connection {
    pub fn new(transport: Transport) -> Rc<Self> {
        Rc::new(Http1Connection {
            client: RefCell::new(BufferedStream::new(transport)),
            mutex: AsyncMutex::new(),
            broken: Cell::new(false),
            num_streams: Cell::new(0),
            reject_chunkless_keep_alive: Cell::new(true),
        })
    }

    /// Overrides the chunkless-keep-alive rejection; see
    /// `HttpSessionBuilder::allow_chunkless_keep_alive`.
    pub fn set_reject_chunkless_keep_alive(&self, reject: bool) {
        self.reject_chunkless_keep_alive.set(reject);
    }

    pub fn is_broken(&self) -> bool {
        self.broken.get()
    }

    fn mark_broken(&self) {
        if !self.broken.get() {
            tracing::warn!("HTTP/1.1 connection marked broken");
        }
        self.broken.set(true);
    }

    pub fn live_streams(&self) -> usize {
        self.num_streams.get()
    }

    /// `true` when no stream currently holds the serialization mutex —
    /// used by `HttpWorker` to prefer handing a request to an idle
    /// connection over queuing behind a busy one.
    pub fn is_idle(&self) -> bool {
        !self.mutex.is_locked()
    }

    /// Acquires the connection's serialization mutex and hands back a
    /// fresh `Http1Stream`. Fails fast if the connection is already
    /// broken rather than queueing behind a connection that will never
    /// recover.
    pub async fn new_stream(self: &Rc<Self>) -> Result<Http1Stream> {
        if self.is_broken() {
            return Err(Error::new(categories::SOCKET, Code::ConnectionAborted)
                .with_message("connection is broken"));
        }
        let guard = self.mutex.lock().await;
        self.num_streams.set(self.num_streams.get() + 1);
        Ok(Http1Stream {
            con: self.clone(),
            _guard: guard,
            method_head: false,
            header_sent: false,
            header_received: false,
            content_end: false,
            keep_alive: false,
            chunked: false,
            content_length: None,
            chunk_size: None,
            chunk_remain: 0,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.client.borrow_mut().shutdown().await
    }
}

/// One logical request/response exchange on a physical connection.
/// States:
/// `Idle → HeadersSent → HeadersReceived → Body{...} → Done`, tracked here
/// as the `header_sent`/`header_received`/`content_end` flags rather than
/// an explicit enum.
pub struct Http1Stream {
    con: Rc<Http1Connection>,
    _guard: AsyncMutexGuard,
    method_head: bool,
    header_sent: bool,
    header_received: bool,
    content_end: bool,
    keep_alive: bool,
    chunked: bool,
    content_length: Option<usize>,
    chunk_size: Option<u64>,
    chunk_remain: usize,
}

impl Http1Stream {
    fn fail(&self, err: Error) -> Error {
        self.con.mark_broken();
        err
    }

    async fn read_line(&self) -> Result<String> {
        let raw = self.con.client.borrow_mut().getline(b'\n').await?;
        let raw = raw.strip_suffix(b"\r").unwrap_or(&raw);
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Sends the request line, headers, and (if non-empty) body. Appends
    /// Appends `Host` and `Content-Length` as needed before sending.
    pub async fn send(&mut self, method: &str, url: &Url, headers: &HttpHeaders, payload: &[u8]) -> Result<()> {
        let mut headers = headers.clone();
        if !payload.is_empty() {
            headers.append(well_known::CONTENT_LENGTH, payload.len().to_string());
        }
        if !headers.contains(well_known::HOST) {
            headers.append(well_known::HOST, url.host());
        }

        let mut request_target = url.path().to_string();
        if !url.query().is_empty() {
            request_target.push('?');
            request_target.push_str(url.query());
        }

        let mut buf = format!("{method} {request_target} HTTP/1.1\r\n");
        buf.push_str(&headers.to_string());
        buf.push_str("\r\n");

        tracing::trace!(%buf, "sending HTTP/1.1 request headers");

        let mut client = self.con.client.borrow_mut();
        client
            .write_all(buf.as_bytes())
            .await
            .map_err(|e| self.fail(e))?;
        if !payload.is_empty() {
            client.write_all(payload).await.map_err(|e| self.fail(e))?;
        }
        client.flush().await.map_err(|e| self.fail(e))?;
        drop(client);

        self.header_sent = true;
        self.method_head = method.eq_ignore_ascii_case("HEAD");
        Ok(())
    }

    /// Reads the status line and header block.
    pub async fn recv_headers(&mut self) -> Result<(u16, String, HttpHeaders)> {
        debug_assert!(self.header_sent && !self.header_received);

        let status_line = self.read_line().await.map_err(|e| self.fail(e))?;
        if status_line.is_empty() {
            return Err(self.fail(bad_reply("empty status line")));
        }
        let after_version = status_line
            .find(' ')
            .map(|idx| &status_line[idx + 1..])
            .ok_or_else(|| self.fail(bad_reply("malformed status line")))?;
        let (code_str, message) = after_version.split_once(' ').unwrap_or((after_version, ""));
        let status_code: u16 = code_str
            .parse()
            .map_err(|_| self.fail(bad_reply("non-numeric status code")))?;

        let mut headers = HttpHeaders::new();
        loop {
            let line = self.read_line().await.map_err(|e| self.fail(e))?;
            if line.is_empty() {
                break;
            }
            let (key, value) = match line.find(": ") {
                Some(idx) => (&line[..idx], &line[idx + 2..]),
                None => match line.find(':') {
                    Some(idx) => (&line[..idx], &line[idx + 1..]),
                    None => return Err(self.fail(bad_reply("header line missing ':'"))),
                },
            };
            headers.append(key, value);
        }

        self.keep_alive = headers.value(well_known::CONNECTION).eq_ignore_ascii_case("keep-alive");

        let content_length = headers.value(well_known::CONTENT_LENGTH);
        let transfer_encoding = headers.value(well_known::TRANSFER_ENCODING);
        if !content_length.is_empty() {
            self.content_length = Some(
                content_length
                    .parse()
                    .map_err(|_| self.fail(bad_reply("non-numeric Content-Length")))?,
            );
        } else if transfer_encoding.eq_ignore_ascii_case("chunked") {
            self.chunked = true;
        } else if self.keep_alive && !self.method_head && self.con.reject_chunkless_keep_alive.get() {
            return Err(self.fail(bad_reply(
                "keep-alive response with neither Content-Length nor chunked transfer",
            )));
        }

        if self.method_head {
            self.content_end = true;
        }

        self.header_received = true;
        Ok((status_code, message.to_string(), headers))
    }

    async fn read_chunk_size(&mut self) -> Result<u64> {
        let line = self.read_line().await.map_err(|e| self.fail(e))?;
        if line.is_empty() {
            return Err(self.fail(bad_reply("empty chunk size line")));
        }
        let size = u64::from_str_radix(line.trim(), 16)
            .map_err(|_| self.fail(bad_reply("malformed chunk size")))?;
        self.chunk_size = Some(size);
        self.chunk_remain = size as usize;
        Ok(size)
    }

    /// Reads one span of body bytes under whichever of the three framings
    /// (content-length, chunked, until-close) applies.
    /// Returns `Ok(0)` once the body is fully consumed.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        debug_assert!(self.header_sent && self.header_received);
        if self.content_end {
            return Ok(0);
        }

        if let Some(remaining) = self.content_length {
            let n = remaining.min(buf.len());
            let read = self
                .con
                .client
                .borrow_mut()
                .read(&mut buf[..n])
                .await
                .map_err(|e| self.fail(e))?;
            self.content_length = Some(remaining - read);
            if remaining - read == 0 {
                self.content_end = true;
            }
            return Ok(read);
        }

        if !self.chunked {
            let n = self
                .con
                .client
                .borrow_mut()
                .read(buf)
                .await
                .map_err(|e| self.fail(e))?;
            if n == 0 {
                self.content_end = true;
            }
            return Ok(n);
        }

        // `chunk_size` is `None` exactly when the next thing to read off the
        // wire is a fresh chunk-size line: either this is the very first
        // chunk of the body, or the previous call just consumed a data
        // chunk's trailing CRLF and reset it below. A size of `0` is the
        // terminator and has no data chunk of its own, so it's handled here
        // directly rather than falling through into the data-read path
        // below with `chunk_remain == 0` — that path is for "just finished
        // reading a chunk's data", not "the size line itself said zero".
        if self.chunk_size.is_none() {
            let size = self.read_chunk_size().await?;
            if size == 0 {
                let trailer = self.read_line().await.map_err(|e| self.fail(e))?;
                if !trailer.is_empty() {
                    return Err(self.fail(bad_reply("malformed final chunk trailer")));
                }
                self.content_end = true;
                return Ok(0);
            }
        }

        let n = buf.len().min(self.chunk_remain);
        let read = self
            .con
            .client
            .borrow_mut()
            .read(&mut buf[..n])
            .await
            .map_err(|e| self.fail(e))?;
        self.chunk_remain -= read;

        if self.chunk_remain == 0 {
            let trailer = self.read_line().await.map_err(|e| self.fail(e))?;
            if !trailer.is_empty() {
                return Err(self.fail(bad_reply("malformed chunk trailer")));
            }
            self.chunk_size = None;
        }
        Ok(read)
    }

    pub fn is_done(&self) -> bool {
        self.content_end
    }
}

impl Drop for Http1Stream {
    fn drop(&mut self) {
        // Absent `Connection: keep-alive`, or an unfinished body, the
        // connection is marked broken and not returned to the pool.
        if !self.content_end {
            self.con.mark_broken();
        }
        if !self.keep_alive {
            self.con.mark_broken();
        }
        self.con.num_streams.set(self.con.num_streams.get() - 1);
    }
}

fn bad_reply(message: &'static str) -> Error {
    Error::new(categories::HTTP, Code::HttpBadReply).with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::collections::VecDeque;
    use wisp_core::executor::LocalExecutor;
    use wisp_core::future::LocalBoxFuture;

    struct MemStream {
        read_data: StdRefCell<VecDeque<u8>>,
        written: StdRefCell<Vec<u8>>,
    }

    impl MemStream {
        fn new(data: &[u8]) -> Rc<Self> {
            Rc::new(MemStream {
                read_data: StdRefCell::new(data.iter().copied().collect()),
                written: StdRefCell::new(Vec::new()),
            })
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
    fn chunked_body_reads_to_completion() {
        let exec = LocalExecutor::new();
        let reply = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n7\r\n, World\r\n1\r\n!\r\n0\r\n\r\n";
        let transport: Transport = MemStream::new(reply);
        let con = Http1Connection::new(transport);

        let body = exec.block_on(async move {
            let mut stream = con.new_stream().await.unwrap();
            stream.header_sent = true;
            let (status, _msg, _headers) = stream.recv_headers().await.unwrap();
            assert_eq!(status, 200);
            let mut body = Vec::new();
            let mut buf = [0u8; 4];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&buf[..n]);
            }
            body
        });

        assert_eq!(body, b"Hello, World!".to_vec());
    }

    #[test]
    fn chunked_body_with_no_data_chunks_completes_cleanly() {
        let exec = LocalExecutor::new();
        let reply = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n";
        let transport: Transport = MemStream::new(reply);
        let con = Http1Connection::new(transport);

        let body = exec.block_on(async move {
            let mut stream = con.new_stream().await.unwrap();
            stream.header_sent = true;
            let (status, _msg, _headers) = stream.recv_headers().await.unwrap();
            assert_eq!(status, 200);
            let mut buf = [0u8; 4];
            let n = stream.read(&mut buf).await.unwrap();
            (n, stream.is_done())
        });

        assert_eq!(body, (0, true));
    }

    #[test]
    fn head_response_with_content_length_has_no_body() {
        let exec = LocalExecutor::new();
        let reply = b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\n";
        let transport: Transport = MemStream::new(reply);
        let con = Http1Connection::new(transport);

        let n = exec.block_on(async move {
            let mut stream = con.new_stream().await.unwrap();
            stream.header_sent = true;
            stream.method_head = true;
            let _ = stream.recv_headers().await.unwrap();
            let mut buf = [0u8; 16];
            stream.read(&mut buf).await.unwrap()
        });

        assert_eq!(n, 0);
    }

    #[test]
    fn keep_alive_without_framing_is_bad_reply() {
        let exec = LocalExecutor::new();
        let reply = b"HTTP/1.1 200 OK\r\nConnection: keep-alive\r\n\r\n";
        let transport: Transport = MemStream::new(reply);
        let con = Http1Connection::new(transport.clone());

        let result = exec.block_on(async move {
            let mut stream = con.new_stream().await.unwrap();
            stream.header_sent = true;
            stream.recv_headers().await
        });

        assert!(result.is_err());
    }
}
