//! The single-threaded executor: a ready queue of locally-spawned futures
//! plus a thread-safe post queue for cross-thread wakeups, exposing the
//! `post`/`run`/`schedule` contract a mutex+condvar run loop needs to
//! support cross-thread wakeups safely.
//!
//! All coroutine resumptions for an executor happen on the thread that
//! calls [`LocalExecutor::run`]/[`LocalExecutor::block_on`]. `post` is the
//! one entry point safe to call from another thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::time::Duration;

use crate::future::LocalBoxFuture;
use crate::stop::StopToken;

/// Something the executor parks on when its ready queue is empty and no
/// cross-thread work has arrived — in practice the reactor, blocking in
/// `epoll_wait`/`poll` for the shortest of "a completion is ready" or the
/// given timeout. A `LocalExecutor` with no idle hook just busy-waits on
/// the post queue's condvar, which is enough to drive pure-compute tasks
/// and is what the unit tests in this crate use.
pub trait IdleHook {
    /// Block for at most `timeout` (`None` = forever) or until woken by
    /// [`LocalExecutor::post`]. Implementations that own I/O readiness
    /// should run any due completions (waking their tasks) before
    /// returning.
    fn park(&self, timeout: Option<Duration>);
}

struct Job {
    future: RefCell<Option<LocalBoxFuture<'static, ()>>>,
    queue: Rc<RunQueue>,
}

struct RunQueue {
    ready: RefCell<VecDeque<Rc<Job>>>,
}

impl RunQueue {
    fn schedule(self: &Rc<Self>, job: Rc<Job>) {
        self.ready.borrow_mut().push_back(job);
    }
}

unsafe fn waker_clone(data: *const ()) -> RawWaker {
    let job = unsafe { Rc::from_raw(data as *const Job) };
    std::mem::forget(job.clone());
    std::mem::forget(job);
    RawWaker::new(data, &VTABLE)
}

unsafe fn waker_wake(data: *const ()) {
    let job = unsafe { Rc::from_raw(data as *const Job) };
    job.queue.clone().schedule(job);
}

unsafe fn waker_wake_by_ref(data: *const ()) {
    let job = unsafe { Rc::from_raw(data as *const Job) };
    job.queue.clone().schedule(job.clone());
    std::mem::forget(job);
}

unsafe fn waker_drop(data: *const ()) {
    drop(unsafe { Rc::from_raw(data as *const Job) });
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(waker_clone, waker_wake, waker_wake_by_ref, waker_drop);

fn waker_for(job: Rc<Job>) -> Waker {
    let raw = RawWaker::new(Rc::into_raw(job) as *const (), &VTABLE);
    // Safety: the vtable's four functions uphold the `Waker`/`RawWaker`
    // contract (clone/wake/wake_by_ref/drop all operate on the `Rc` strong
    // count consistently); not `Send`/`Sync` in spirit, but nothing here
    // ever hands this waker across a thread boundary — only `post` does,
    // and `post` carries a plain `Send` closure, not a `Waker`.
    unsafe { Waker::from_raw(raw) }
}

type PostedJob = Box<dyn FnOnce() + Send + 'static>;

struct PostQueue {
    jobs: Mutex<VecDeque<PostedJob>>,
    condvar: Condvar,
}

/// Cheaply-cloned handle used to wake a [`LocalExecutor`] from another
/// thread. Obtained via [`LocalExecutor::handle`].
#[derive(Clone)]
pub struct ExecutorHandle {
    post_queue: Arc<PostQueue>,
}

impl ExecutorHandle {
    /// Schedules `job` to run on the executor's thread. Safe to call from
    /// any thread; wakes the run loop if it is parked.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let mut jobs = self.post_queue.jobs.lock().unwrap();
        jobs.push_back(Box::new(job));
        self.post_queue.condvar.notify_one();
    }
}

/// Supplies timer futures to [`crate::combinators::timeout`] and
/// [`crate::combinators::sleep`]. `wisp-core` has no notion of wall-clock
/// time of its own (no reactor, no timerfd); a backend in `wisp-reactor`
/// installs one of these at startup the same way it installs an
/// [`IdleHook`].
pub trait TimerDriver {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// The single-threaded task scheduler. One of these is bound to exactly
/// one OS thread for its whole lifetime; a task spawned on it is always
/// resumed on that thread.
pub struct LocalExecutor {
    queue: Rc<RunQueue>,
    post_queue: Arc<PostQueue>,
    idle_hook: RefCell<Option<Rc<dyn IdleHook>>>,
    timer_driver: RefCell<Option<Rc<dyn TimerDriver>>>,
}

thread_local! {
    static CURRENT_EXECUTOR: RefCell<Vec<Rc<LocalExecutor>>> = const { RefCell::new(Vec::new()) };
}

impl LocalExecutor {
    pub fn new() -> Rc<Self> {
        Rc::new(LocalExecutor {
            queue: Rc::new(RunQueue {
                ready: RefCell::new(VecDeque::new()),
            }),
            post_queue: Arc::new(PostQueue {
                jobs: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
            }),
            idle_hook: RefCell::new(None),
            timer_driver: RefCell::new(None),
        })
    }

    pub fn set_timer_driver(&self, driver: Rc<dyn TimerDriver>) {
        *self.timer_driver.borrow_mut() = Some(driver);
    }

    pub fn timer_driver(&self) -> Option<Rc<dyn TimerDriver>> {
        self.timer_driver.borrow().clone()
    }

    /// Installs the hook consulted when the ready queue empties out. Set
    /// once, typically by whichever `wisp-reactor` backend is bound to
    /// this executor at startup.
    pub fn set_idle_hook(&self, hook: Rc<dyn IdleHook>) {
        *self.idle_hook.borrow_mut() = Some(hook);
    }

    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            post_queue: self.post_queue.clone(),
        }
    }

    /// Schedules a `'static` future to run to completion, detached from
    /// this call. Internal building block for [`crate::spawn::spawn`];
    /// most code should go through that instead since it also gives you a
    /// handle to join or cancel the task.
    pub(crate) fn spawn_local(self: &Rc<Self>, fut: LocalBoxFuture<'static, ()>) {
        let job = Rc::new(Job {
            future: RefCell::new(Some(fut)),
            queue: self.queue.clone(),
        });
        self.queue.schedule(job);
    }

    /// Runs ready work, draining the post queue and parking on the idle
    /// hook (if any) between batches, until `stop` is requested.
    pub fn run(self: &Rc<Self>, stop: &StopToken) {
        self.run_until(stop, || false)
    }

    /// Like [`Self::run`], but also exits as soon as `done` returns `true`
    /// (checked once per loop iteration, after draining ready work). Used by
    /// [`Self::block_on`], which has no `StopSource` of its own to request.
    fn run_until(self: &Rc<Self>, stop: &StopToken, mut done: impl FnMut() -> bool) {
        let _current = CurrentGuard::push(self.clone());
        loop {
            if stop.is_stop_requested() || done() {
                return;
            }
            self.drain_post_queue();
            if let Some(job) = self.queue.ready.borrow_mut().pop_front() {
                self.poll_job(job);
                continue;
            }
            if stop.is_stop_requested() || done() {
                return;
            }
            match self.idle_hook.borrow().clone() {
                Some(hook) => hook.park(Some(Duration::from_millis(50))),
                None => {
                    // No reactor attached: block on the post queue itself so
                    // a foreign-thread `post` still wakes us promptly.
                    let jobs = self.post_queue.jobs.lock().unwrap();
                    if jobs.is_empty() {
                        let _unused = self
                            .post_queue
                            .condvar
                            .wait_timeout(jobs, Duration::from_millis(50))
                            .unwrap();
                    }
                }
            }
        }
    }

    /// Runs `fut` to completion on this executor and returns its value.
    /// Intended for tests and the top of a binary's `main`; library code
    /// should prefer [`crate::spawn::spawn`] plus awaiting the resulting
    /// handle so cancellation composes.
    pub fn block_on<T: 'static>(self: &Rc<Self>, fut: impl Future<Output = T> + 'static) -> T {
        let result = Rc::new(RefCell::new(None));
        {
            let result = result.clone();
            self.spawn_local(Box::pin(async move {
                *result.borrow_mut() = Some(fut.await);
            }));
        }
        // `run_until` has no `StopSource` of its own here; it just exits as
        // soon as the job above has filled in `result`.
        let result_check = result.clone();
        self.run_until(&StopToken::none(), move || result_check.borrow().is_some());
        result.borrow_mut().take().expect("block_on future did not complete")
    }

    fn drain_post_queue(&self) {
        let jobs: Vec<PostedJob> = {
            let mut jobs = self.post_queue.jobs.lock().unwrap();
            jobs.drain(..).collect()
        };
        for job in jobs {
            job();
        }
    }

    fn poll_job(&self, job: Rc<Job>) {
        let mut slot = job.future.borrow_mut();
        let Some(mut fut) = slot.take() else { return };
        drop(slot);
        let waker = waker_for(job.clone());
        let mut cx = Context::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {}
            Poll::Pending => {
                *job.future.borrow_mut() = Some(fut);
            }
        }
    }
}

struct CurrentGuard;

impl CurrentGuard {
    fn push(executor: Rc<LocalExecutor>) -> Self {
        CURRENT_EXECUTOR.with(|stack| stack.borrow_mut().push(executor));
        CurrentGuard
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT_EXECUTOR.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The executor currently running on this thread, if any. Used by
/// [`crate::spawn::spawn`] and the `scheduleOn` combinator to find "the
/// executor the caller is on" without threading it through every function
/// signature (Design Notes §9 accepts this as the documented tradeoff of
/// per-thread ambient state over an explicit parameter everywhere).
pub fn current() -> Option<Rc<LocalExecutor>> {
    CURRENT_EXECUTOR.with(|stack| stack.borrow().last().cloned())
}
