//! `TaskScope` — a lexically scoped set of spawned tasks: every member is
//! expected to have completed (via [`TaskScope::join_all`] or individually
//! awaiting a member) by the time the scope is dropped. Unlike
//! [`crate::combinators::TaskGroup`], which cancels and releases whatever
//! is left running on drop, a `TaskScope` treats an undrained drop as a
//! programming error.

use crate::error::Result;
use crate::spawn::{spawn, StopHandle, WaitHandle};

pub struct TaskScope<T: 'static> {
    handles: Vec<WaitHandle<T>>,
}

impl<T: 'static> TaskScope<T> {
    pub fn new() -> Self {
        TaskScope { handles: Vec::new() }
    }

    /// Spawns `fut`, tracked by this scope. The returned [`StopHandle`]
    /// lets the caller cancel it individually before the scope itself
    /// ends.
    pub fn spawn(&mut self, fut: impl std::future::Future<Output = Result<T>> + 'static) -> StopHandle {
        let handle = spawn(fut);
        let stop = handle.stop_handle();
        self.handles.push(handle);
        stop
    }

    /// Awaits every task in the scope and consumes it without requesting
    /// stop on anything (the normal, non-cancelling exit path).
    pub async fn join_all(mut self) -> Vec<Result<T>> {
        let handles = std::mem::take(&mut self.handles);
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await);
        }
        results
    }
}

impl<T: 'static> Default for TaskScope<T> {
    fn default() -> Self {
        TaskScope { handles: Vec::new() }
    }
}

impl<T: 'static> Drop for TaskScope<T> {
    fn drop(&mut self) {
        for handle in &self.handles {
            debug_assert!(
                handle.is_finished(),
                "TaskScope dropped with a member still running; call join_all() (or await every \
                 spawned handle) before the scope ends"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;

    #[test]
    fn dropping_a_scope_whose_members_all_completed_is_fine() {
        let exec = LocalExecutor::new();
        exec.block_on(async {
            let mut scope = TaskScope::<i32>::new();
            scope.spawn(async { Ok(1) });
            scope.spawn(async { Ok(2) });
            let results = scope.join_all().await;
            let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
            assert_eq!(values, vec![1, 2]);
            // `scope` is consumed by `join_all`; nothing left to assert on drop.
        });
    }

    #[test]
    #[should_panic(expected = "TaskScope dropped with a member still running")]
    fn dropping_a_scope_with_an_unfinished_member_panics_in_debug() {
        let exec = LocalExecutor::new();
        exec.block_on(async {
            let mut scope = TaskScope::<()>::new();
            scope.spawn(async {
                std::future::pending::<()>().await;
                Ok(())
            });
            // Dropped here without joining or awaiting the member: the
            // `debug_assert!` in `Drop` should fire.
        });
    }
}
