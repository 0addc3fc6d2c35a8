//! [`AsyncStream`] — the single capability abstraction Design Notes §9
//! asks for: "pick a single capability abstraction (`AsyncRead +
//! AsyncWrite + Shutdown + Flush`) and use dynamic dispatch only at
//! protocol boundaries." Everything above this crate (TLS records, HTTP/1.1
//! framing) is written against this trait, not against `wisp_reactor::IoHandle`
//! directly, so the HTTP stack works the same whether the underlying
//! transport is a plain TCP connection, a SOCKS5-tunneled one, or one
//! already wrapped in [`crate::tls::TlsStream`].

use std::net::TcpStream;
use std::rc::Rc;

use wisp_core::future::LocalBoxFuture;
use wisp_core::Result;
use wisp_reactor::IoHandle;

/// An async byte stream: read, write, shutdown, flush. Protocol code
/// (`wisp-http`'s `Http1Connection`, this crate's `TlsStream`) is generic
/// over this trait, or holds a `Rc<dyn AsyncStream>` at the one boundary
/// (the HTTP connection's transport slot) where the concrete type varies
/// at runtime.
pub trait AsyncStream {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>>;
    fn write<'a>(&'a self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>>;
    fn flush<'a>(&'a self) -> LocalBoxFuture<'a, Result<()>>;
    fn shutdown(&self) -> Result<()>;
}

impl AsyncStream for IoHandle<TcpStream> {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        Box::pin(IoHandle::read(self, buf))
    }

    fn write<'a>(&'a self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        Box::pin(IoHandle::write(self, buf))
    }

    fn flush<'a>(&'a self) -> LocalBoxFuture<'a, Result<()>> {
        // TCP writes are unbuffered at this layer; nothing to flush.
        Box::pin(async { Ok(()) })
    }

    fn shutdown(&self) -> Result<()> {
        IoHandle::shutdown(self)
    }
}

impl<T: AsyncStream + ?Sized> AsyncStream for Rc<T> {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        (**self).read(buf)
    }

    fn write<'a>(&'a self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        (**self).write(buf)
    }

    fn flush<'a>(&'a self) -> LocalBoxFuture<'a, Result<()>> {
        (**self).flush()
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }
}
