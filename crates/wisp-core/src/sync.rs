//! A single-threaded async mutex, used by `wisp-http` to serialize
//! streams on a connection and to guard a session's worker map. Same
//! waker-queue shape as [`crate::channel`]'s
//! oneshot/mpsc: no atomics, because nothing here ever crosses an
//! executor boundary.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct State {
    locked: bool,
    waiters: VecDeque<Waker>,
}

/// A lock with no payload of its own — callers protect data by convention
/// (holding the guard for the duration of the critical section). This
/// matches how `HttpConnection`'s serialization mutex is used: acquired
/// and released around stream lifetime rather than wrapping a value.
#[derive(Clone)]
pub struct AsyncMutex {
    state: Rc<RefCell<State>>,
}

impl AsyncMutex {
    pub fn new() -> Self {
        AsyncMutex {
            state: Rc::new(RefCell::new(State {
                locked: false,
                waiters: VecDeque::new(),
            })),
        }
    }

    pub fn lock(&self) -> Lock {
        Lock {
            state: self.state.clone(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }
}

impl Default for AsyncMutex {
    fn default() -> Self {
        AsyncMutex::new()
    }
}

pub struct Lock {
    state: Rc<RefCell<State>>,
}

impl Future for Lock {
    type Output = AsyncMutexGuard;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if !state.locked {
            state.locked = true;
            return Poll::Ready(AsyncMutexGuard {
                state: self.state.clone(),
            });
        }
        state.waiters.push_back(cx.waker().clone());
        Poll::Pending
    }
}

pub struct AsyncMutexGuard {
    state: Rc<RefCell<State>>,
}

impl Drop for AsyncMutexGuard {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.locked = false;
        if let Some(waker) = state.waiters.pop_front() {
            waker.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;
    use crate::spawn::spawn;

    #[test]
    fn second_locker_waits_for_the_first_to_release() {
        let exec = LocalExecutor::new();
        let mutex = AsyncMutex::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        exec.block_on(async {
            let guard = mutex.lock().await;
            let mutex2 = mutex.clone();
            let order2 = order.clone();
            let waiter = spawn(async move {
                mutex2.lock().await;
                order2.borrow_mut().push(2);
                Ok::<(), crate::error::Error>(())
            });
            order.borrow_mut().push(1);
            drop(guard);
            waiter.await.unwrap();
        });

        assert_eq!(*order.borrow(), vec![1, 2]);
    }
}
