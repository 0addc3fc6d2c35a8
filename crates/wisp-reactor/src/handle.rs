//! [`IoHandle`] — binds a typed fd owner (`TcpStream`, `UdpSocket`, a raw
//! file, ...) to an [`IoContext`] registration and forwards the I/O
//! operation set as inherent methods. Move-only by
//! construction (no `Clone`); dropping one cancels any pending ops,
//! deregisters from the reactor, then closes the underlying fd by
//! dropping it — in that order, matching "drop implies cancel + remove +
//! close".

use std::io;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::rc::Rc;

use wisp_core::Result;

use crate::context::IoContext;
use crate::descriptor::{DescriptorKind, IoDescriptor};
use crate::endpoint::IpEndpoint;

/// Invariant: either both `fd` and `desc` are set, or
/// neither is — there is no state in between. The only way to reach the
/// "neither" state is after [`IoHandle::into_inner`]/`Drop`, which is why
/// both fields are private.
pub struct IoHandle<Fd> {
    fd: Option<Fd>,
    desc: Option<IoDescriptor>,
    ctx: Rc<IoContext>,
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

impl<Fd: AsRawFd> IoHandle<Fd> {
    /// Registers `fd` with `ctx`, setting it non-blocking first (every
    /// operation on this crate's `IoContext` assumes `O_NONBLOCK`).
    pub fn make(ctx: Rc<IoContext>, fd: Fd, kind: DescriptorKind) -> Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        let desc = ctx.add_descriptor(fd.as_raw_fd(), kind)?;
        Ok(IoHandle {
            fd: Some(fd),
            desc: Some(desc),
            ctx,
        })
    }

    fn fd(&self) -> &Fd {
        self.fd.as_ref().expect("IoHandle used after teardown")
    }

    fn raw_fd(&self) -> RawFd {
        self.fd().as_raw_fd()
    }

    fn descriptor(&self) -> &IoDescriptor {
        self.desc.as_ref().expect("IoHandle used after teardown")
    }

    pub fn get_ref(&self) -> &Fd {
        self.fd()
    }

    pub fn context(&self) -> Rc<IoContext> {
        self.ctx.clone()
    }

    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.ctx.read(self.descriptor(), self.raw_fd(), buf).await
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        self.ctx.write(self.descriptor(), self.raw_fd(), buf).await
    }

    pub async fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    pub async fn poll(&self, events: u32) -> Result<u32> {
        self.ctx.poll(self.descriptor(), events).await
    }
}

impl IoHandle<TcpListener> {
    pub fn bind(ctx: Rc<IoContext>, endpoint: IpEndpoint) -> Result<Self> {
        let listener = TcpListener::bind(endpoint.as_socket_addr())?;
        Self::make(ctx, listener, DescriptorKind::Socket)
    }

    pub fn local_addr(&self) -> Result<IpEndpoint> {
        Ok(IpEndpoint::new(self.fd().local_addr()?))
    }

    pub async fn accept(&self) -> Result<(IoHandle<TcpStream>, IpEndpoint)> {
        let (raw, peer) = self.ctx.accept(self.descriptor(), self.raw_fd()).await?;
        let stream = unsafe { TcpStream::from_raw_fd(raw) };
        let handle = IoHandle::make(self.ctx.clone(), stream, DescriptorKind::Socket)?;
        Ok((handle, peer))
    }
}

impl IoHandle<TcpStream> {
    pub async fn connect(ctx: Rc<IoContext>, endpoint: IpEndpoint) -> Result<Self> {
        let domain = match endpoint.as_socket_addr() {
            std::net::SocketAddr::V4(_) => socket2::Domain::IPV4,
            std::net::SocketAddr::V6(_) => socket2::Domain::IPV6,
        };
        let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        let stream: TcpStream = socket.into();
        let handle = IoHandle::make(ctx, stream, DescriptorKind::Socket)?;
        handle.ctx.connect(handle.descriptor(), handle.raw_fd(), endpoint).await?;
        Ok(handle)
    }

    pub fn peer_addr(&self) -> Result<IpEndpoint> {
        Ok(IpEndpoint::new(self.fd().peer_addr()?))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.fd().shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }
}

impl IoHandle<UdpSocket> {
    pub fn bind(ctx: Rc<IoContext>, endpoint: IpEndpoint) -> Result<Self> {
        let socket = UdpSocket::bind(endpoint.as_socket_addr())?;
        Self::make(ctx, socket, DescriptorKind::Socket)
    }

    pub fn local_addr(&self) -> Result<IpEndpoint> {
        Ok(IpEndpoint::new(self.fd().local_addr()?))
    }

    pub async fn sendto(&self, buf: &[u8], endpoint: IpEndpoint) -> Result<usize> {
        self.ctx
            .sendto(self.descriptor(), self.raw_fd(), buf, Some(endpoint))
            .await
    }

    pub async fn recvfrom(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
        self.ctx.recvfrom(self.descriptor(), self.raw_fd(), buf).await
    }
}

impl<Fd> Drop for IoHandle<Fd> {
    fn drop(&mut self) {
        if let Some(desc) = self.desc.take() {
            self.ctx.cancel(&desc);
            self.ctx.remove_descriptor(desc);
        }
        // `self.fd` drops here (if still present), closing the OS handle.
    }
}
