//! Monotonic-clock timer wheel backing [`wisp_core::executor::TimerDriver`].
//! Rather than a real fd-per-timer, this keeps a flat list of pending
//! deadlines and lets whichever [`crate::backend::Backend`] is installed
//! as the [`wisp_core::executor::IdleHook`] cap its park duration at the
//! earliest one.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use wisp_core::executor::TimerDriver;
use wisp_core::future::LocalBoxFuture;

struct Entry {
    deadline: Instant,
    fired: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// Holds every outstanding [`Sleep`] deadline for one executor. Shared
/// between the [`TimerDriver`] impl (which registers new deadlines) and
/// whatever drives the reactor's idle loop (which fires due ones).
#[derive(Default)]
pub struct TimerWheel {
    entries: RefCell<Vec<Rc<Entry>>>,
}

impl TimerWheel {
    pub fn new() -> Rc<Self> {
        Rc::new(TimerWheel::default())
    }

    /// The duration until the earliest pending deadline, if any — used to
    /// cap how long the reactor's `poll_once` is allowed to block so a
    /// timer never fires late just because no I/O happened to wake it.
    pub fn next_deadline(&self) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .borrow()
            .iter()
            .filter(|e| !e.fired.get())
            .map(|e| e.deadline.saturating_duration_since(now))
            .min()
    }

    /// Wakes every entry whose deadline has passed and drops it from the
    /// wheel. Call after every `poll_once`/`park`, whether or not it
    /// actually blocked.
    pub fn fire_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.borrow_mut();
        entries.retain(|entry| {
            if entry.fired.get() {
                return false;
            }
            if entry.deadline <= now {
                entry.fired.set(true);
                if let Some(waker) = entry.waker.borrow_mut().take() {
                    waker.wake();
                }
                return false;
            }
            true
        });
    }
}

impl TimerDriver for TimerWheel {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let entry = Rc::new(Entry {
            deadline: Instant::now() + duration,
            fired: Cell::new(duration.is_zero()),
            waker: RefCell::new(None),
        });
        self.entries.borrow_mut().push(entry.clone());
        Box::pin(Sleep { entry })
    }
}

struct Sleep {
    entry: Rc<Entry>,
}

impl std::future::Future for Sleep {
    type Output = ();

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.entry.fired.get() {
            return Poll::Ready(());
        }
        *self.entry.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}
