//! Portable POSIX fallback backend built on `poll(2)`, for platforms (or
//! sandboxes) where `epoll_create1` is unavailable: a flat array of
//! `pollfd`s re-scanned every wakeup, traded for epoll's registration
//! bookkeeping. O(n) per wakeup in the
//! descriptor count rather than epoll's O(ready), which is the right
//! tradeoff for the handful of descriptors a client-side HTTP stack keeps
//! open at once but would not scale to a large server listener set.

use std::cell::RefCell;
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

pub struct PollBackend {
    registrations: RefCell<Slab<Registration>>,
}

impl PollBackend {
    pub fn new() -> Rc<Self> {
        Rc::new(PollBackend {
            registrations: RefCell::new(Slab::new()),
        })
    }
}

impl Backend for PollBackend {
    fn register(&self, fd: RawFd) -> Result<Token> {
        let index = self.registrations.borrow_mut().insert(Registration {
            fd,
            read_ready: false,
            write_ready: false,
            read_waker: None,
            write_waker: None,
        });
        Ok(Token(index))
    }

    fn deregister(&self, token: Token) {
        self.registrations.borrow_mut().try_remove(token.0);
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
        let mut fds: Vec<libc::pollfd> = Vec::new();
        let mut indices: Vec<usize> = Vec::new();
        {
            let registrations = self.registrations.borrow();
            for (index, registration) in registrations.iter() {
                let mut events = 0;
                if registration.read_waker.is_some() {
                    events |= libc::POLLIN;
                }
                if registration.write_waker.is_some() {
                    events |= libc::POLLOUT;
                }
                fds.push(libc::pollfd {
                    fd: registration.fd,
                    events,
                    revents: 0,
                });
                indices.push(index);
            }
        }
        if fds.is_empty() {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout.min(Duration::from_millis(50)));
            }
            return;
        }
        let timeout_ms = match timeout {
            None => -1,
            Some(duration) => duration.as_millis().min(i32::MAX as u128) as i32,
        };
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc <= 0 {
            return;
        }
        let mut registrations = self.registrations.borrow_mut();
        for (fd, index) in fds.iter().zip(indices) {
            if fd.revents == 0 {
                continue;
            }
            let Some(registration) = registrations.get_mut(index) else { continue };
            if fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                registration.read_ready = true;
                if let Some(waker) = registration.read_waker.take() {
                    waker.wake();
                }
            }
            if fd.revents & (libc::POLLOUT | libc::POLLERR) != 0 {
                registration.write_ready = true;
                if let Some(waker) = registration.write_waker.take() {
                    waker.wake();
                }
            }
        }
    }
}

impl IdleHook for PollBackend {
    fn park(&self, timeout: Option<Duration>) {
        self.poll_once(timeout);
    }
}
