//! Linux completion backend built directly on `epoll_create1`/`epoll_ctl`/
//! `epoll_wait`. Level-triggered: a registration's readiness flag stays set
//! until an awaiter actually observes it via [`Backend::poll_ready`],
//! which matches the read-until-`WouldBlock` usage pattern every caller
//! in this workspace follows.

use std::cell::RefCell;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use slab::Slab;
use wisp_core::executor::IdleHook;
use wisp_core::Result;

use super::{Backend, Interest, Token};

struct Registration {
    fd: RawFd,
    read_ready: bool,
    write_ready: bool,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

pub struct EpollBackend {
    epoll_fd: RawFd,
    registrations: RefCell<Slab<Registration>>,
}

impl EpollBackend {
    pub fn new() -> Result<Rc<Self>> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(Rc::new(EpollBackend {
            epoll_fd,
            registrations: RefCell::new(Slab::new()),
        }))
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

impl Backend for EpollBackend {
    fn register(&self, fd: RawFd) -> Result<Token> {
        let mut registrations = self.registrations.borrow_mut();
        let index = registrations.insert(Registration {
            fd,
            read_ready: false,
            write_ready: false,
            read_waker: None,
            write_waker: None,
        });
        let mut event = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLOUT) as u32,
            u64: index as u64,
        };
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            registrations.remove(index);
            return Err(io::Error::last_os_error().into());
        }
        Ok(Token(index))
    }

    fn deregister(&self, token: Token) {
        let mut registrations = self.registrations.borrow_mut();
        if let Some(registration) = registrations.try_remove(token.0) {
            unsafe {
                libc::epoll_ctl(
                    self.epoll_fd,
                    libc::EPOLL_CTL_DEL,
                    registration.fd,
                    std::ptr::null_mut(),
                );
            }
        }
    }

    fn poll_ready(&self, token: Token, interest: Interest, cx: &mut Context<'_>) -> Poll<()> {
        let mut registrations = self.registrations.borrow_mut();
        let Some(registration) = registrations.get_mut(token.0) else {
            return Poll::Ready(());
        };
        let (ready, waker_slot) = match interest {
            Interest::Read => (&mut registration.read_ready, &mut registration.read_waker),
            Interest::Write => (&mut registration.write_ready, &mut registration.write_waker),
        };
        if *ready {
            *ready = false;
            return Poll::Ready(());
        }
        *waker_slot = Some(cx.waker().clone());
        Poll::Pending
    }

    fn cancel(&self, token: Token, interest: Interest) {
        let mut registrations = self.registrations.borrow_mut();
        if let Some(registration) = registrations.get_mut(token.0) {
            match interest {
                Interest::Read => registration.read_waker = None,
                Interest::Write => registration.write_waker = None,
            }
        }
    }

    fn poll_once(&self, timeout: Option<Duration>) {
        let mut events: [libc::epoll_event; 256] = unsafe { std::mem::zeroed() };
        let timeout_ms = match timeout {
            None => -1,
            Some(duration) => duration.as_millis().min(i32::MAX as u128) as i32,
        };
        let count = unsafe {
            libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), events.len() as i32, timeout_ms)
        };
        if count <= 0 {
            return;
        }
        let mut registrations = self.registrations.borrow_mut();
        for event in &events[..count as usize] {
            let index = event.u64 as usize;
            let Some(registration) = registrations.get_mut(index) else { continue };
            if event.events & (libc::EPOLLIN as u32) != 0 || event.events & (libc::EPOLLHUP as u32) != 0 {
                registration.read_ready = true;
                if let Some(waker) = registration.read_waker.take() {
                    waker.wake();
                }
            }
            if event.events & (libc::EPOLLOUT as u32) != 0 {
                registration.write_ready = true;
                if let Some(waker) = registration.write_waker.take() {
                    waker.wake();
                }
            }
            if event.events & (libc::EPOLLERR as u32) != 0 {
                registration.read_ready = true;
                registration.write_ready = true;
                if let Some(waker) = registration.read_waker.take() {
                    waker.wake();
                }
                if let Some(waker) = registration.write_waker.take() {
                    waker.wake();
                }
            }
        }
    }
}

impl IdleHook for EpollBackend {
    fn park(&self, timeout: Option<Duration>) {
        self.poll_once(timeout);
    }
}
