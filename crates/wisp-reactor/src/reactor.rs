//! Wires a concrete [`Backend`] and a [`TimerWheel`] into one
//! [`wisp_core::executor::IdleHook`] and installs both on an executor,
//! returning the [`IoContext`] call sites actually use. This is the one
//! place backend choice and timer-wheel integration meet; everything
//! above this module only ever sees [`IoContext`].

use std::rc::Rc;
use std::time::Duration;

use wisp_core::executor::{IdleHook, LocalExecutor};

use crate::backend::Backend;
use crate::context::IoContext;
use crate::timer::TimerWheel;

struct Driver<B> {
    backend: Rc<B>,
    timers: Rc<TimerWheel>,
}

impl<B: Backend + IdleHook + 'static> IdleHook for Driver<B> {
    fn park(&self, timeout: Option<Duration>) {
        let cap = self.timers.next_deadline();
        let effective = match (timeout, cap) {
            (Some(t), Some(c)) => Some(t.min(c)),
            (Some(t), None) => Some(t),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        };
        self.backend.poll_once(effective);
        self.timers.fire_expired();
    }
}

/// Installs `backend` as both the idle hook and (via an internal
/// [`TimerWheel`]) the timer driver of `executor`, and returns the
/// [`IoContext`] wrapping it.
pub fn install<B: Backend + IdleHook + 'static>(executor: &Rc<LocalExecutor>, backend: Rc<B>) -> Rc<IoContext> {
    let timers = TimerWheel::new();
    let driver = Rc::new(Driver {
        backend: backend.clone(),
        timers: timers.clone(),
    });
    executor.set_idle_hook(driver);
    executor.set_timer_driver(timers);
    IoContext::new(backend)
}
