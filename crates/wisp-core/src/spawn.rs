//! `spawn` detaches a [`Task`] onto the current thread's executor and
//! hands back a [`WaitHandle`] to join or cancel it: a `spawn` that
//! returns a join handle carrying its own stop source, rather than a bare
//! fire-and-forget.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::{Error, Result};
use crate::executor;
use crate::stop::{StopSource, StopToken};
use crate::task::panic_to_error;

struct Shared<T> {
    value: RefCell<Option<Result<T>>>,
    waker: RefCell<Option<Waker>>,
    // Separate from `value`: polling `WaitHandle` takes `value` out on the
    // first `Ready`, but callers that never poll (e.g. a `Drop` impl
    // deciding whether it's safe to cancel) still need to observe
    // completion, so this flag is set once and never consumed.
    completed: Cell<bool>,
}

/// A handle to a task spawned with [`spawn`]. Awaiting it yields the
/// task's result; dropping it without awaiting leaves the task running
/// detached (use [`WaitHandle::stop_handle`] first if you need to cancel
/// it instead).
pub struct WaitHandle<T> {
    shared: Rc<Shared<T>>,
    stop: Rc<StopSource>,
}

/// A cancellation-only view of a spawned task, for callers that want to
/// request stop without holding onto (or awaiting) its result.
#[derive(Clone)]
pub struct StopHandle {
    stop: Rc<StopSource>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stop_requested()
    }
}

impl<T: 'static> WaitHandle<T> {
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { stop: self.stop.clone() }
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Whether the task has produced its outcome (value, stop, or panic),
    /// without consuming it the way polling/awaiting does.
    pub fn is_finished(&self) -> bool {
        self.shared.completed.get()
    }
}

impl<T> Future for WaitHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(value) = self.shared.value.borrow_mut().take() {
            return Poll::Ready(value);
        }
        *self.shared.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Spawns `fut` onto the executor currently running on this thread (see
/// [`executor::current`]) and returns a handle to join or cancel it.
///
/// # Panics
///
/// Panics if called outside of a running [`crate::executor::LocalExecutor`].
pub fn spawn<T: 'static>(fut: impl Future<Output = Result<T>> + 'static) -> WaitHandle<T> {
    let exec = executor::current().expect("spawn called with no executor running on this thread");
    let stop = Rc::new(StopSource::new());
    let task_stop_token = stop.token();
    let shared = Rc::new(Shared {
        value: RefCell::new(None),
        waker: RefCell::new(None),
        completed: Cell::new(false),
    });

    let shared_for_job = shared.clone();
    let body = async move {
        let outcome = fut.catch_unwind().await.unwrap_or_else(|payload| Err(panic_to_error(payload)));
        *shared_for_job.value.borrow_mut() = Some(outcome);
        shared_for_job.completed.set(true);
        if let Some(waker) = shared_for_job.waker.borrow_mut().take() {
            waker.wake();
        }
    };

    exec.spawn_local(Box::pin(WithStopToken {
        inner: body,
        token: task_stop_token,
    }));

    WaitHandle { shared, stop }
}

/// Wraps a future so polling it always observes `token` as
/// [`crate::stop::current`], the same way [`crate::task::Task::poll`] does.
/// `spawn` needs this directly (rather than going through `Task<T>`) since
/// its body's output is `()`, not `Result<T>`.
struct WithStopToken<F> {
    inner: F,
    token: StopToken,
}

impl<F: Future> Future for WithStopToken<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let _guard = crate::stop::CurrentGuard::push(this.token.clone());
        unsafe { Pin::new_unchecked(&mut this.inner) }.poll(cx)
    }
}

trait CatchUnwindExt: Future + Sized {
    fn catch_unwind(self) -> CatchUnwind<Self>;
}

impl<F: Future> CatchUnwindExt for F {
    fn catch_unwind(self) -> CatchUnwind<Self> {
        CatchUnwind { inner: self }
    }
}

struct CatchUnwind<F> {
    inner: F,
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = std::result::Result<F::Output, Box<dyn std::any::Any + Send>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| inner.poll(cx)))
            .map(|poll| poll.map(Ok))
            .unwrap_or_else(|payload| Poll::Ready(Err(payload)))
    }
}

/// Runs `blocking` on a dedicated OS thread and resolves once it finishes,
/// for CPU-bound or blocking-syscall work that must not stall the
/// single-threaded executor (spec's "spawn_blocking" escape hatch).
pub fn spawn_blocking<T: Send + 'static>(
    blocking: impl FnOnce() -> Result<T> + Send + 'static,
) -> WaitHandle<T> {
    let exec = executor::current().expect("spawn_blocking called with no executor running on this thread");
    let handle = exec.handle();
    let stop = Rc::new(StopSource::new());
    let shared = Rc::new(Shared {
        value: RefCell::new(None),
        waker: RefCell::new(None),
        completed: Cell::new(false),
    });

    let shared_for_thread = shared.clone();
    std::thread::spawn(move || {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(blocking))
            .unwrap_or_else(|payload| Err(panic_to_error(payload)));
        handle.post(move || {
            *shared_for_thread.value.borrow_mut() = Some(outcome);
            shared_for_thread.completed.set(true);
            if let Some(waker) = shared_for_thread.waker.borrow_mut().take() {
                waker.wake();
            }
        });
    });

    WaitHandle { shared, stop }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;

    #[test]
    fn spawn_resolves_with_value() {
        let exec = LocalExecutor::new();
        let value = exec.block_on(async {
            let handle = spawn(async { Ok(7) });
            handle.await
        });
        assert_eq!(value.unwrap(), 7);
    }

    #[test]
    fn spawn_catches_panics_as_errors() {
        let exec = LocalExecutor::new();
        let value = exec.block_on(async {
            let handle = spawn(async {
                panic!("boom");
                #[allow(unreachable_code)]
                Ok::<(), Error>(())
            });
            handle.await
        });
        assert!(value.is_err());
    }

    #[test]
    fn stop_handle_requests_cancellation_visible_to_task() {
        let exec = LocalExecutor::new();
        let observed = exec.block_on(async {
            let handle = spawn(async {
                let token = crate::stop::current();
                Ok(token.is_stop_requested())
            });
            handle.request_stop();
            handle.await
        });
        assert_eq!(observed.unwrap(), true);
    }
}
