//! The completion-backend seam: [`Backend`] is the one trait a new
//! platform (io_uring, IOCP, a GUI-toolkit event loop) needs to implement
//! to plug into the rest of this crate. Two are shipped: [`epoll`] for
//! Linux and [`poll`] as the portable POSIX fallback.

pub mod epoll;
pub mod poll;

use std::os::unix::io::RawFd;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use wisp_core::Result;

/// Which direction of readiness a caller is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Identifies one fd's registration with a backend. Opaque to callers;
/// never reused while the registration it names is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(pub(crate) usize);

/// A readiness-notification backend. Every method here is meant to be
/// called only from the executor thread this backend is bound to — there
/// is no locking because there is, by construction, only one caller.
pub trait Backend {
    /// Registers `fd` for readiness notifications. `fd` must remain valid
    /// (open, not reused by another registration) until
    /// [`Backend::deregister`] is called with the returned token.
    fn register(&self, fd: RawFd) -> Result<Token>;

    /// Drops a registration. Idempotent.
    fn deregister(&self, token: Token);

    /// Polls for readiness of `interest` on `token`'s fd. Registers
    /// `cx`'s waker to be woken the next time the backend observes that
    /// readiness if it isn't ready yet.
    fn poll_ready(&self, token: Token, interest: Interest, cx: &mut Context<'_>) -> Poll<()>;

    /// Clears a previously-registered waker for `token`/`interest`
    /// without waking it — used when an awaiter is dropped (cancelled)
    /// before its readiness arrived, so a stale waker doesn't linger.
    fn cancel(&self, token: Token, interest: Interest);

    /// Blocks for at most `timeout` (`None` = forever) waiting for any
    /// registered fd to become ready, waking whatever wakers are
    /// currently registered for the interests that fired. Returns once at
    /// least one completion has been delivered or the timeout elapses.
    fn poll_once(&self, timeout: Option<Duration>);
}

pub(crate) fn wake(slot: &mut Option<Waker>, cx: &Context<'_>) {
    *slot = Some(cx.waker().clone());
}
