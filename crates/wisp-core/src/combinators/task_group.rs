//! `TaskGroup` — spawns a batch of tasks and joins all of them at once,
//! collecting every result (unlike `when_any`, which only wants the
//! first).

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::Poll;

use crate::error::Result;
use crate::spawn::{spawn, WaitHandle};

/// A set of spawned tasks, joined together or drained one at a time.
/// Dropping a `TaskGroup` with members still running requests stop on all
/// of them rather than leaking them detached — see [`crate::combinators::TaskScope`]
/// for the opposite policy (asserting everything already completed).
#[derive(Default)]
pub struct TaskGroup<T: 'static> {
    handles: Vec<WaitHandle<T>>,
}

impl<T: 'static> TaskGroup<T> {
    pub fn new() -> Self {
        TaskGroup { handles: Vec::new() }
    }

    /// Spawns `fut` onto the current executor and tracks it in this group.
    pub fn spawn(&mut self, fut: impl std::future::Future<Output = Result<T>> + 'static) {
        self.handles.push(spawn(fut));
    }

    /// Requests stop on every task currently in the group.
    pub fn request_stop_all(&self) {
        for handle in &self.handles {
            handle.request_stop();
        }
    }

    /// The number of tasks currently tracked (running and not-yet-popped
    /// completed ones).
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Awaits the next task in the group to complete, popping and
    /// returning its result. Returns `None` once the group is empty.
    pub async fn next(&mut self) -> Option<Result<T>> {
        if self.handles.is_empty() {
            return None;
        }
        poll_fn(|cx| {
            for index in 0..self.handles.len() {
                if let Poll::Ready(value) = Pin::new(&mut self.handles[index]).poll(cx) {
                    self.handles.remove(index);
                    return Poll::Ready(Some(value));
                }
            }
            Poll::Pending
        })
        .await
    }

    /// Awaits every task in the group, in spawn order, returning one
    /// result per task.
    pub async fn join_all(mut self) -> Vec<Result<T>> {
        let mut results = Vec::with_capacity(self.handles.len());
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }
}

impl<T: 'static> Drop for TaskGroup<T> {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.request_stop();
            debug_assert!(
                handle.stop_handle().is_stop_requested(),
                "TaskGroup::drop requested stop on a member but it did not take effect"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;

    #[test]
    fn join_all_collects_every_result_in_order() {
        let exec = LocalExecutor::new();
        let results = exec.block_on(async {
            let mut group = TaskGroup::new();
            group.spawn(async { Ok(1) });
            group.spawn(async { Ok(2) });
            group.spawn(async { Ok(3) });
            group.join_all().await
        });
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn next_pops_completed_tasks_and_shrinks_size() {
        let exec = LocalExecutor::new();
        let (first, remaining) = exec.block_on(async {
            let mut group = TaskGroup::new();
            group.spawn(async { Ok(1) });
            group.spawn(async { Ok(2) });
            assert_eq!(group.size(), 2);
            let first = group.next().await;
            (first, group.size())
        });
        assert_eq!(first.unwrap().unwrap(), 1);
        assert_eq!(remaining, 1);
    }

    #[test]
    fn next_returns_none_once_drained() {
        let exec = LocalExecutor::new();
        let drained = exec.block_on(async {
            let mut group = TaskGroup::<()>::new();
            group.spawn(async { Ok(()) });
            group.next().await;
            group.next().await
        });
        assert!(drained.is_none());
    }

    #[test]
    fn dropping_without_draining_cancels_remaining_members() {
        let exec = LocalExecutor::new();
        let stopped = exec.block_on(async {
            let mut group = TaskGroup::<()>::new();
            group.spawn(async {
                std::future::pending::<()>().await;
                Ok(())
            });
            let stop = group.handles[0].stop_handle();
            drop(group);
            stop.is_stop_requested()
        });
        assert!(stopped);
    }
}
