//! Runtime core: the error taxonomy, cooperative cancellation, the lazy
//! `Task` type, the single-threaded executor, `spawn`, and the task
//! combinators built on top of them.
//!
//! This crate has no I/O of its own — see `wisp-reactor` for the
//! completion backends that plug into [`executor::LocalExecutor`] via
//! [`executor::IdleHook`] and [`executor::TimerDriver`].

pub mod channel;
pub mod combinators;
pub mod error;
pub mod executor;
pub mod future;
pub mod spawn;
pub mod stop;
pub mod sync;
pub mod task;

pub use error::{Error, Result};
pub use executor::LocalExecutor;
pub use spawn::{spawn, spawn_blocking, StopHandle, WaitHandle};
pub use stop::{StopRegistration, StopSource, StopToken};
pub use sync::AsyncMutex;
pub use task::Task;
