//! [`IoContext`] — the unified async I/O surface, implemented once over
//! `Rc<dyn Backend>` rather than per concrete backend: every shipped
//! backend ([`crate::backend::epoll::EpollBackend`],
//! [`crate::backend::poll::PollBackend`]) is readiness-based, so the
//! "submit syscall, await readiness, retry" shape is identical across
//! both and belongs in one place — one capability abstraction, with
//! dynamic dispatch only at the boundary, here at
//! [`crate::backend::Backend`].

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as StdContext, Poll, Waker};

use wisp_core::error::Error;
use wisp_core::stop::{self, StopRegistration};
use wisp_core::Result;

use crate::backend::{Backend, Interest, Token};
use crate::descriptor::{DescriptorKind, IoDescriptor};
use crate::endpoint::IpEndpoint;

/// Owns a completion backend and exposes the unified I/O operation set
/// over it. One `IoContext` per executor; obtain it with
/// [`crate::reactor::install`].
pub struct IoContext {
    backend: Rc<dyn Backend>,
}

impl IoContext {
    pub fn new(backend: Rc<dyn Backend>) -> Rc<Self> {
        Rc::new(IoContext { backend })
    }

    pub fn add_descriptor(&self, fd: RawFd, kind: DescriptorKind) -> Result<IoDescriptor> {
        let token = self.backend.register(fd)?;
        Ok(IoDescriptor::new(token, kind))
    }

    /// Consumes the descriptor, deregistering it from the backend. Does
    /// not close `fd` — that's [`crate::handle::IoHandle`]'s job, since
    /// the descriptor and the fd it names have independent lifetimes
    /// until the handle ties them together.
    pub fn remove_descriptor(&self, desc: IoDescriptor) {
        self.backend.deregister(desc.token);
    }

    /// Cancels every pending operation on `desc` (both directions).
    pub fn cancel(&self, desc: &IoDescriptor) {
        self.backend.cancel(desc.token, Interest::Read);
        self.backend.cancel(desc.token, Interest::Write);
    }

    pub async fn sleep(&self, duration: std::time::Duration) {
        wisp_core::combinators::sleep(duration).await
    }

    fn ready(&self, token: Token, interest: Interest) -> Ready {
        Ready {
            backend: self.backend.clone(),
            token,
            interest,
            waker: Rc::new(RefCell::new(None)),
            canceled: Rc::new(Cell::new(false)),
            stop_reg: None,
        }
    }

    pub async fn read(&self, desc: &IoDescriptor, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        loop {
            match raw_read(fd, buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.ready(desc.token, Interest::Read).await?
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn write(&self, desc: &IoDescriptor, fd: RawFd, buf: &[u8]) -> Result<usize> {
        loop {
            match raw_write(fd, buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.ready(desc.token, Interest::Write).await?
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn accept(&self, desc: &IoDescriptor, fd: RawFd) -> Result<(RawFd, IpEndpoint)> {
        loop {
            match raw_accept(fd) {
                Ok(accepted) => return Ok(accepted),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.ready(desc.token, Interest::Read).await?
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn connect(&self, desc: &IoDescriptor, fd: RawFd, endpoint: IpEndpoint) -> Result<()> {
        match raw_connect(fd, endpoint.as_socket_addr()) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }
        self.ready(desc.token, Interest::Write).await?;
        match socket_error(fd)? {
            0 => Ok(()),
            errno => Err(io::Error::from_raw_os_error(errno).into()),
        }
    }

    pub async fn sendto(
        &self,
        desc: &IoDescriptor,
        fd: RawFd,
        buf: &[u8],
        endpoint: Option<IpEndpoint>,
    ) -> Result<usize> {
        loop {
            match raw_sendto(fd, buf, endpoint) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.ready(desc.token, Interest::Write).await?
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn recvfrom(
        &self,
        desc: &IoDescriptor,
        fd: RawFd,
        buf: &mut [u8],
    ) -> Result<(usize, IpEndpoint)> {
        loop {
            match raw_recvfrom(fd, buf) {
                Ok(result) => return Ok(result),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.ready(desc.token, Interest::Read).await?
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Awaits `events` (a bitmask of `libc::POLL*` flags, restricted to
    /// readable/writable) becoming ready on `desc`, returning the
    /// subset that actually fired.
    pub async fn poll(&self, desc: &IoDescriptor, events: u32) -> Result<u32> {
        let mut seen = 0u32;
        if events & (libc::POLLIN as u32) != 0 {
            self.ready(desc.token, Interest::Read).await?;
            seen |= libc::POLLIN as u32;
        }
        if events & (libc::POLLOUT as u32) != 0 {
            self.ready(desc.token, Interest::Write).await?;
            seen |= libc::POLLOUT as u32;
        }
        Ok(seen)
    }
}

/// Awaits readiness of one interest on one descriptor, forwarding
/// cancellation: if the ambient stop token fires
/// while this is pending, a backend cancel is issued and the awaiter
/// resolves to `Err(Canceled)` rather than hanging forever waiting for
/// readiness that will now never be acted on.
struct Ready {
    backend: Rc<dyn Backend>,
    token: Token,
    interest: Interest,
    waker: Rc<RefCell<Option<Waker>>>,
    canceled: Rc<Cell<bool>>,
    stop_reg: Option<StopRegistration>,
}

impl Future for Ready {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut StdContext<'_>) -> Poll<Result<()>> {
        if self.stop_reg.is_none() {
            let canceled = self.canceled.clone();
            let waker = self.waker.clone();
            let backend = self.backend.clone();
            let token = self.token;
            let interest = self.interest;
            let reg = stop::current().register(move || {
                canceled.set(true);
                backend.cancel(token, interest);
                if let Some(w) = waker.borrow_mut().take() {
                    w.wake();
                }
            });
            self.stop_reg = Some(reg);
        }
        if self.canceled.get() {
            return Poll::Ready(Err(Error::canceled()));
        }
        *self.waker.borrow_mut() = Some(cx.waker().clone());
        match self.backend.poll_ready(self.token, self.interest, cx) {
            Poll::Ready(()) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn raw_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn raw_write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn raw_accept(fd: RawFd) -> io::Result<(RawFd, IpEndpoint)> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let accepted = unsafe {
        libc::accept4(
            fd,
            (&mut storage as *mut libc::sockaddr_storage).cast(),
            &mut len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    };
    if accepted < 0 {
        return Err(io::Error::last_os_error());
    }
    let addr = sockaddr_to_socket_addr(&storage, len)?;
    Ok((accepted, IpEndpoint::new(addr)))
}

fn raw_connect(fd: RawFd, addr: SocketAddr) -> io::Result<()> {
    let (storage, len) = socket_addr_to_raw(&addr);
    let rc = unsafe { libc::connect(fd, (&storage as *const libc::sockaddr_storage).cast(), len) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINPROGRESS) {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        return Err(err);
    }
    Ok(())
}

fn socket_error(fd: RawFd) -> Result<i32> {
    let mut errno: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            (&mut errno as *mut libc::c_int).cast(),
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(errno)
}

fn raw_sendto(fd: RawFd, buf: &[u8], endpoint: Option<IpEndpoint>) -> io::Result<usize> {
    let n = match endpoint {
        Some(ep) => {
            let (storage, len) = socket_addr_to_raw(&ep.as_socket_addr());
            unsafe {
                libc::sendto(
                    fd,
                    buf.as_ptr().cast(),
                    buf.len(),
                    0,
                    (&storage as *const libc::sockaddr_storage).cast(),
                    len,
                )
            }
        }
        None => unsafe { libc::sendto(fd, buf.as_ptr().cast(), buf.len(), 0, std::ptr::null(), 0) },
    };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn raw_recvfrom(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, IpEndpoint)> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let n = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr().cast(),
            buf.len(),
            0,
            (&mut storage as *mut libc::sockaddr_storage).cast(),
            &mut len,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    let addr = sockaddr_to_socket_addr(&storage, len)?;
    Ok((n as usize, IpEndpoint::new(addr)))
}

/// Fills a `sockaddr_storage` the way `accept`/`recvfrom` expect to
/// receive one, for the syscalls (`connect`/`sendto`) that take an
/// address as input rather than an output parameter.
fn socket_addr_to_raw(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            }
            std::mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            }
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

fn sockaddr_to_socket_addr(storage: &libc::sockaddr_storage, _len: libc::socklen_t) -> io::Result<SocketAddr> {
    match storage.ss_family as i32 {
        libc::AF_INET => {
            // Safety: `ss_family == AF_INET` guarantees the kernel wrote a
            // `sockaddr_in` into this union's leading bytes.
            let sin = unsafe { *(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in) };
            let ip = std::net::Ipv4Addr::from(u32::to_ne_bytes(sin.sin_addr.s_addr));
            Ok(SocketAddr::new(ip.into(), u16::from_be(sin.sin_port)))
        }
        libc::AF_INET6 => {
            // Safety: same reasoning, for `sockaddr_in6`.
            let sin6 = unsafe { *(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in6) };
            let ip = std::net::Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            let addr = std::net::SocketAddrV6::new(ip, u16::from_be(sin6.sin6_port), sin6.sin6_flowinfo, sin6.sin6_scope_id);
            Ok(SocketAddr::V6(addr))
        }
        _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "unsupported address family")),
    }
}
