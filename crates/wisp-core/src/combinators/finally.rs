//! `finally` — runs a cleanup closure once, whether the wrapped future
//! completes normally or is dropped (cancelled) before doing so.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Wraps `fut` so `cleanup` runs exactly once: right after `fut` resolves,
/// or when the returned future is dropped without having resolved.
pub fn finally<F: Future>(fut: F, cleanup: impl FnOnce()) -> Finally<F, impl FnOnce()> {
    Finally { fut: Some(fut), cleanup: Some(cleanup) }
}

pub struct Finally<F, C: FnOnce()> {
    fut: Option<F>,
    cleanup: Option<C>,
}

impl<F: Future, C: FnOnce()> Future for Finally<F, C> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let fut = this.fut.as_mut().expect("Finally polled after completion");
        let pinned = unsafe { Pin::new_unchecked(fut) };
        match pinned.poll(cx) {
            Poll::Ready(value) => {
                this.fut = None;
                if let Some(cleanup) = this.cleanup.take() {
                    cleanup();
                }
                Poll::Ready(value)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F, C: FnOnce()> Drop for Finally<F, C> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn cleanup_runs_after_completion() {
        let exec = LocalExecutor::new();
        let ran = Rc::new(Cell::new(false));
        let ran_inner = ran.clone();
        let value = exec.block_on(finally(async { 1 }, move || ran_inner.set(true)));
        assert_eq!(value, 1);
        assert!(ran.get());
    }

    #[test]
    fn cleanup_runs_on_drop_without_completion() {
        let ran = Rc::new(Cell::new(false));
        let ran_inner = ran.clone();
        let fut = finally(std::future::pending::<()>(), move || ran_inner.set(true));
        drop(fut);
        assert!(ran.get());
    }
}
