//! Cooperative cancellation: a [`StopSource`] owns the flag, a [`StopToken`]
//! observes it, and a [`StopRegistration`] runs a callback exactly once when
//! the stop is requested (immediately, if it already was).
//!
//! Every [`crate::task::Task`] carries one token. Awaiters that wrap an I/O
//! operation or a child task register a callback that forwards the stop
//! into whatever they're waiting on — "stop propagation".

use std::cell::RefCell;
use std::rc::Rc;

struct Inner {
    requested: bool,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

/// Owns the cancellation flag for one task tree. Not `Clone`; share a
/// [`StopToken`] instead (cloning the token is cheap, it's a ref-counted
/// pointer to the same flag).
pub struct StopSource {
    inner: Rc<RefCell<Inner>>,
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSource {
    pub fn new() -> Self {
        StopSource {
            inner: Rc::new(RefCell::new(Inner {
                requested: false,
                callbacks: Vec::new(),
            })),
        }
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            inner: self.inner.clone(),
        }
    }

    /// Requests stop. Idempotent: a second call is a no-op. Callbacks run
    /// synchronously, in registration order, on whatever thread calls this
    /// (in practice always the executor thread the token's task lives on).
    pub fn request_stop(&self) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.requested {
                return;
            }
            inner.requested = true;
            std::mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.borrow().requested
    }
}

/// A cheaply-cloned handle observing one [`StopSource`]'s flag.
#[derive(Clone)]
pub struct StopToken {
    inner: Rc<RefCell<Inner>>,
}

impl StopToken {
    /// A token that can never be stopped, for tasks spawned with no
    /// cancellation scope of their own.
    pub fn none() -> Self {
        StopSource::new().token()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.borrow().requested
    }

    /// Registers `callback` to run when stop is requested. If stop was
    /// already requested, runs it immediately instead of registering it —
    /// matching the auto-reset behavior a task's stop context needs:
    /// a late registration on an already-stopped token must still fire.
    pub fn register(&self, callback: impl FnOnce() + 'static) -> StopRegistration {
        let mut inner = self.inner.borrow_mut();
        if inner.requested {
            drop(inner);
            callback();
            return StopRegistration { fired: true };
        }
        inner.callbacks.push(Box::new(callback));
        StopRegistration { fired: false }
    }
}

/// RAII marker returned by [`StopToken::register`]. Carries no cleanup
/// logic of its own (the callback vector is append-only and drained on
/// stop) — its only job is to let call sites express "this awaiter's
/// registration already fired" without a separate bool.
pub struct StopRegistration {
    fired: bool,
}

impl StopRegistration {
    pub fn already_fired(&self) -> bool {
        self.fired
    }
}

thread_local! {
    /// The stack of stop tokens belonging to tasks currently being polled on
    /// this thread, innermost last. An I/O or combinator awaiter that needs
    /// to forward cancellation calls [`current`] rather than taking a token
    /// as an explicit parameter everywhere — the alternative threading it
    /// through every `read`/`write`/`connect` signature was tried in an
    /// earlier revision and made the I/O context trait unreadable.
    static CURRENT: RefCell<Vec<StopToken>> = const { RefCell::new(Vec::new()) };
}

/// The stop token of the task currently being polled on this thread, or a
/// token that never fires if called outside of [`crate::task::Task::poll`]
/// (e.g. from a unit test driving a future directly with `block_on`-style
/// helpers).
pub fn current() -> StopToken {
    CURRENT.with(|stack| stack.borrow().last().cloned().unwrap_or_else(StopToken::none))
}

/// RAII guard pushing `token` as current for the duration of one poll.
/// Used by [`crate::task::Task::poll`]; not exposed outside the crate.
pub(crate) struct CurrentGuard;

impl CurrentGuard {
    pub(crate) fn push(token: StopToken) -> Self {
        CURRENT.with(|stack| stack.borrow_mut().push(token));
        CurrentGuard
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn request_stop_is_idempotent() {
        let source = StopSource::new();
        let count = Rc::new(Cell::new(0));
        {
            let count = count.clone();
            source.token().register(move || count.set(count.get() + 1));
        }
        source.request_stop();
        source.request_stop();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn registering_after_stop_fires_immediately() {
        let source = StopSource::new();
        source.request_stop();
        let fired = Rc::new(Cell::new(false));
        let reg = {
            let fired = fired.clone();
            source.token().register(move || fired.set(true))
        };
        assert!(fired.get());
        assert!(reg.already_fired());
    }
}
