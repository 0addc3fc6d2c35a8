//! `Task<T>` — the lazy, cancellable unit of work.
//!
//! Rust's `async fn`/`async {}` already compiles to a lazy state machine
//! (nothing runs until polled); that *is* the stackless coroutine this
//! runtime builds on, so `Task<T>` is a thin wrapper around a boxed future
//! rather than a bespoke coroutine frame. What it adds over a bare future:
//! a private [`StopSource`] so the task has somewhere to register
//! cancellation callbacks ([`crate::stop::current`]), and the `Result<T>`
//! output shape every layer above this one relies on.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{Error, Result};
use crate::future::LocalBoxFuture;
use crate::stop::{CurrentGuard, StopSource, StopToken};

/// A lazy, cancellable computation producing a [`Result<T>`].
///
/// Never resumed after completion (enforced by the underlying `Future`
/// contract: polling a completed future is a logic error in Rust generally,
/// and `Task` does not paper over it). Awaiting a `Task` forwards the
/// *caller's* ambient stop token into this task for the duration of the
/// await, by construction: nested tasks share the outer stop propagation
/// path because `crate::stop::current()` always reflects the innermost
/// task currently on the poll stack.
pub struct Task<T> {
    fut: LocalBoxFuture<'static, Result<T>>,
    stop: StopSource,
}

impl<T: 'static> Task<T> {
    pub fn new(fut: impl Future<Output = Result<T>> + 'static) -> Self {
        Task {
            fut: Box::pin(fut),
            stop: StopSource::new(),
        }
    }

    pub fn ready(value: Result<T>) -> Self {
        Task::new(async move { value })
    }

    /// The stop token this task's own body and its direct awaitees observe.
    pub fn stop_token(&self) -> StopToken {
        self.stop.token()
    }

    /// Requests cancellation. Idempotent; see [`StopSource::request_stop`].
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Safety: `fut` is `Pin<Box<_>>` already; we only ever reach into
        // `self` through `get_unchecked_mut` to reborrow fields we never
        // move out of.
        let this = unsafe { self.get_unchecked_mut() };
        let _guard = CurrentGuard::push(this.stop.token());
        this.fut.as_mut().poll(cx)
    }
}

/// Maps a caught panic payload into the same [`Error`] shape as any other
/// failure — a "Panicked" task-error case: Rust's analog of an unhandled
/// exception in the coroutine body is an unwinding panic, not a thrown
/// C++ exception, so this is where that gets turned back into a `Result`).
pub fn panic_to_error(payload: Box<dyn std::any::Any + Send>) -> Error {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    };
    Error::new(crate::error::categories::RUNTIME, crate::error::Code::Unknown).with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;

    #[test]
    fn ready_task_resolves_immediately() {
        let exec = LocalExecutor::new();
        let value = exec.block_on(Task::<i32>::ready(Ok(42)));
        assert_eq!(value.unwrap(), 42);
    }

    #[test]
    fn task_stop_token_starts_unstopped() {
        let task = Task::<()>::new(async { Ok(()) });
        assert!(!task.stop_token().is_stop_requested());
        task.request_stop();
        assert!(task.stop_token().is_stop_requested());
    }
}
