//! `sleep`/`with_timeout`. Both
//! need a [`crate::executor::TimerDriver`] installed on the current
//! executor — in practice one of the `wisp-reactor` backends, since
//! `wisp-core` has no clock or timer queue of its own.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::{categories, Code, Error, Result};
use crate::executor;
use crate::future::LocalBoxFuture;
use crate::task::Task;

/// Resolves after `duration` elapses.
///
/// # Panics
///
/// Panics if no [`crate::executor::TimerDriver`] is installed on the
/// current executor.
pub fn sleep(duration: Duration) -> LocalBoxFuture<'static, ()> {
    let exec = executor::current().expect("sleep called with no executor running on this thread");
    let driver = exec
        .timer_driver()
        .expect("sleep called with no TimerDriver installed (wisp-reactor usually installs one at startup)");
    driver.sleep(duration)
}

/// Runs `task`, racing it against a `duration`-long sleep. If the sleep
/// wins, `task` is asked to stop and the result is
/// `Err(Error::timed_out())`.
pub async fn with_timeout<T: 'static>(task: Task<T>, duration: Duration) -> Result<T> {
    let timer = sleep(duration);
    WithTimeout { task, timer }.await
}

struct WithTimeout<T> {
    task: Task<T>,
    timer: LocalBoxFuture<'static, ()>,
}

impl<T: 'static> Future for WithTimeout<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let task = unsafe { Pin::new_unchecked(&mut this.task) };
        if let Poll::Ready(value) = task.poll(cx) {
            return Poll::Ready(value);
        }
        if this.timer.as_mut().poll(cx).is_ready() {
            this.task.request_stop();
            return Poll::Ready(Err(Error::new(categories::SOCKET, Code::TimedOut)));
        }
        Poll::Pending
    }
}
