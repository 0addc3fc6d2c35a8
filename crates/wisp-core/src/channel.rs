//! Single-threaded oneshot and mpsc channels. These back
//! [`crate::spawn::WaitHandle`]-style wiring inside the combinators
//! (`when_any`, `TaskGroup`) — user code
//! wanting a general-purpose channel should prefer these over rolling its
//! own `Rc<RefCell<..>>` plumbing.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::{categories, Code, Error, Result};

struct OneshotInner<T> {
    value: Option<T>,
    waker: Option<Waker>,
    sender_dropped: bool,
    receiver_dropped: bool,
}

/// Creates a single-use, single-value channel. Sending after the receiver
/// has been dropped is a no-op; awaiting after the sender has been dropped
/// without sending resolves to [`Code::ChannelBroken`].
pub fn oneshot<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let inner = Rc::new(RefCell::new(OneshotInner {
        value: None,
        waker: None,
        sender_dropped: false,
        receiver_dropped: false,
    }));
    (
        OneshotSender { inner: inner.clone() },
        OneshotReceiver { inner },
    )
}

pub struct OneshotSender<T> {
    inner: Rc<RefCell<OneshotInner<T>>>,
}

impl<T> OneshotSender<T> {
    /// Sends `value`. Returns it back if the receiver is already gone.
    pub fn send(self, value: T) -> std::result::Result<(), T> {
        let mut inner = self.inner.borrow_mut();
        if inner.receiver_dropped {
            return Err(value);
        }
        inner.value = Some(value);
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
        Ok(())
    }
}

impl<T> Drop for OneshotSender<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.sender_dropped = true;
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }
}

pub struct OneshotReceiver<T> {
    inner: Rc<RefCell<OneshotInner<T>>>,
}

impl<T> Drop for OneshotReceiver<T> {
    fn drop(&mut self) {
        self.inner.borrow_mut().receiver_dropped = true;
    }
}

impl<T> Future for OneshotReceiver<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        if let Some(value) = inner.value.take() {
            return Poll::Ready(Ok(value));
        }
        if inner.sender_dropped {
            return Poll::Ready(Err(Error::new(categories::CHANNEL, Code::ChannelBroken)));
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

struct MpscInner<T> {
    queue: VecDeque<T>,
    waker: Option<Waker>,
    senders: usize,
    receiver_dropped: bool,
}

/// An unbounded, single-consumer queue with cloneable senders. Closing
/// happens automatically once every [`MpscSender`] clone is dropped.
pub fn mpsc<T>() -> (MpscSender<T>, MpscReceiver<T>) {
    let inner = Rc::new(RefCell::new(MpscInner {
        queue: VecDeque::new(),
        waker: None,
        senders: 1,
        receiver_dropped: false,
    }));
    (
        MpscSender { inner: inner.clone() },
        MpscReceiver { inner },
    )
}

pub struct MpscSender<T> {
    inner: Rc<RefCell<MpscInner<T>>>,
}

impl<T> Clone for MpscSender<T> {
    fn clone(&self) -> Self {
        self.inner.borrow_mut().senders += 1;
        MpscSender { inner: self.inner.clone() }
    }
}

impl<T> Drop for MpscSender<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.senders -= 1;
        if inner.senders == 0 {
            if let Some(waker) = inner.waker.take() {
                waker.wake();
            }
        }
    }
}

impl<T> MpscSender<T> {
    /// Pushes `value`. Returns it back if the receiver has already gone
    /// away (there is no point queueing work nobody will ever read).
    pub fn send(&self, value: T) -> std::result::Result<(), T> {
        let mut inner = self.inner.borrow_mut();
        if inner.receiver_dropped {
            return Err(value);
        }
        inner.queue.push_back(value);
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
        Ok(())
    }
}

pub struct MpscReceiver<T> {
    inner: Rc<RefCell<MpscInner<T>>>,
}

impl<T> Drop for MpscReceiver<T> {
    fn drop(&mut self) {
        self.inner.borrow_mut().receiver_dropped = true;
    }
}

impl<T> MpscReceiver<T> {
    /// Awaits the next item, or `None` once every sender has dropped and
    /// the queue has drained.
    pub fn recv(&mut self) -> Recv<'_, T> {
        Recv { inner: &self.inner }
    }
}

pub struct Recv<'a, T> {
    inner: &'a Rc<RefCell<MpscInner<T>>>,
}

impl<'a, T> Future for Recv<'a, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        if let Some(value) = inner.queue.pop_front() {
            return Poll::Ready(Some(value));
        }
        if inner.senders == 0 {
            return Poll::Ready(None);
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;

    #[test]
    fn oneshot_round_trips_a_value() {
        let exec = LocalExecutor::new();
        let (tx, rx) = oneshot::<i32>();
        tx.send(5).unwrap();
        let value = exec.block_on(rx);
        assert_eq!(value.unwrap(), 5);
    }

    #[test]
    fn oneshot_dropped_sender_breaks_the_channel() {
        let exec = LocalExecutor::new();
        let (tx, rx) = oneshot::<i32>();
        drop(tx);
        let value = exec.block_on(rx);
        assert!(value.is_err());
    }

    #[test]
    fn mpsc_delivers_in_order_then_closes() {
        let exec = LocalExecutor::new();
        let (tx, mut rx) = mpsc::<i32>();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);
        let values = exec.block_on(async move {
            let mut out = Vec::new();
            while let Some(v) = rx.recv().await {
                out.push(v);
            }
            out
        });
        assert_eq!(values, vec![1, 2]);
    }
}
