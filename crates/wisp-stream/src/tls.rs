//! [`TlsStream`] — a streams-on-streams TLS adapter built directly on
//! `rustls`'s "manual I/O" API (the same shape the `rustls` repository's
//! own `tlsclient.rs` example drives by hand over a blocking `TcpStream`;
//! here the pump loop suspends on [`crate::stream::AsyncStream`] instead
//! of blocking a thread), negotiating ALPN `http/1.1` for the HTTP worker.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::{ClientConfig, ClientConnection};
use rustls_pki_types::ServerName;

use wisp_core::error::{categories, Code, Error};
use wisp_core::future::LocalBoxFuture;
use wisp_core::Result;

use crate::stream::AsyncStream;

/// A `rustls`-backed TLS client connection layered over any
/// [`AsyncStream`]. Construct with [`TlsStream::connect`], which drives
/// the handshake to completion before returning.
pub struct TlsStream<S> {
    inner: S,
    conn: RefCell<ClientConnection>,
}

fn tls_error(err: rustls::Error) -> Error {
    Error::new(categories::TLS, Code::TlsProtocolError).with_source(err)
}

/// Builds the default root-of-trust client config (webpki's bundled
/// Mozilla root store) offering ALPN `http/1.1`, matching the HTTP
/// worker's TLS dial in §4.10.
pub fn default_config() -> Arc<ClientConfig> {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

impl<S: AsyncStream> TlsStream<S> {
    pub async fn connect(inner: S, server_name: ServerName<'static>, config: Arc<ClientConfig>) -> Result<Self> {
        let conn = ClientConnection::new(config, server_name).map_err(tls_error)?;
        let stream = TlsStream {
            inner,
            conn: RefCell::new(conn),
        };
        stream.complete_handshake().await?;
        Ok(stream)
    }

    /// The ALPN protocol negotiated with the peer, if any.
    pub fn alpn_protocol(&self) -> Option<Vec<u8>> {
        self.conn.borrow().alpn_protocol().map(|p| p.to_vec())
    }

    async fn complete_handshake(&self) -> Result<()> {
        while self.conn.borrow().is_handshaking() {
            self.pump_write().await?;
            if self.conn.borrow().wants_read() {
                self.pump_read().await?;
            }
        }
        self.pump_write().await
    }

    /// Drains any TLS records `rustls` wants to send (handshake
    /// messages, encrypted application data, alerts) out to the
    /// underlying stream.
    async fn pump_write(&self) -> Result<()> {
        loop {
            let mut out = Vec::new();
            let wrote = {
                let mut conn = self.conn.borrow_mut();
                if !conn.wants_write() {
                    break;
                }
                conn.write_tls(&mut out).map_err(Error::from)?
            };
            if wrote == 0 {
                break;
            }
            let mut sent = 0;
            while sent < out.len() {
                let n = self.inner.write(&out[sent..]).await?;
                if n == 0 {
                    return Err(Error::new(categories::TLS, Code::Unknown)
                        .with_message("underlying stream closed mid TLS record"));
                }
                sent += n;
            }
        }
        Ok(())
    }

    /// Reads one batch of ciphertext from the underlying stream into
    /// `rustls`, then lets it process whatever complete records arrived.
    /// Returns `true` on a clean EOF from the transport.
    async fn pump_read(&self) -> Result<bool> {
        let mut buf = [0u8; 8 * 1024];
        let n = self.inner.read(&mut buf).await?;
        if n == 0 {
            return Ok(true);
        }
        let mut conn = self.conn.borrow_mut();
        let mut slice = &buf[..n];
        conn.read_tls(&mut slice).map_err(Error::from)?;
        conn.process_new_packets().map_err(tls_error)?;
        Ok(false)
    }
}

impl<S: AsyncStream> AsyncStream for TlsStream<S> {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            loop {
                let outcome = self.conn.borrow_mut().reader().read(buf);
                match outcome {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
                if self.pump_read().await? {
                    return Ok(0);
                }
                self.pump_write().await?;
            }
        })
    }

    fn write<'a>(&'a self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let n = self
                .conn
                .borrow_mut()
                .writer()
                .write(buf)
                .map_err(Error::from)?;
            self.pump_write().await?;
            Ok(n)
        })
    }

    fn flush<'a>(&'a self) -> LocalBoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.pump_write().await?;
            self.inner.flush().await
        })
    }

    /// Queues a `close_notify` alert and forwards the transport
    /// shutdown. Does not flush: this trait's `shutdown` is sync by
    /// design (Design Notes §9's single capability abstraction), so the
    /// alert rides along with whatever the transport's own close does;
    /// callers that need a guaranteed clean TLS close should `flush`
    /// first.
    fn shutdown(&self) -> Result<()> {
        self.conn.borrow_mut().send_close_notify();
        self.inner.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_offers_http11_alpn() {
        let config = default_config();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }
}
