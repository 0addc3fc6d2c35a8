//! `schedule_on` — runs a `Send` future to completion on a different
//! executor's thread and resolves here once it's done. The cross-thread
//! leg goes through [`crate::executor::ExecutorHandle::post`], the same
//! mechanism `spawn_blocking` uses to get its result back.

use crate::channel::oneshot;
use crate::error::{categories, Code, Error, Result};
use crate::executor::ExecutorHandle;

/// Runs `make_task` on `target`'s thread (constructing the future there,
/// since most futures worth moving across threads aren't `Send`
/// themselves) and returns its result here.
pub async fn schedule_on<T: Send + 'static>(
    target: &ExecutorHandle,
    make_task: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    let (tx, rx) = oneshot::<Result<T>>();
    target.post(move || {
        let _ = tx.send(make_task());
    });
    rx.await.unwrap_or_else(|_| Err(Error::new(categories::CHANNEL, Code::ChannelBroken)))
}
