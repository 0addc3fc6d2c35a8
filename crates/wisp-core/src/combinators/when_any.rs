//! `when_any` — races a set of tasks, returns the first to finish, and
//! requests stop on the rest.

use crate::error::Result;
use crate::task::Task;

/// Polls every task in `tasks` concurrently and returns as soon as one
/// completes, along with its index in the input slice. The remaining
/// tasks are asked to stop (via [`Task::request_stop`]) before being
/// dropped — they do not keep running in the background.
pub async fn when_any<T: 'static>(tasks: Vec<Task<T>>) -> (usize, Result<T>) {
    WhenAny { tasks: tasks.into_iter().map(Some).collect() }.await
}

struct WhenAny<T> {
    tasks: Vec<Option<Task<T>>>,
}

impl<T: 'static> std::future::Future for WhenAny<T> {
    type Output = (usize, Result<T>);

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        use std::future::Future;
        use std::task::Poll;

        let this = unsafe { self.get_unchecked_mut() };
        for (index, slot) in this.tasks.iter_mut().enumerate() {
            let Some(task) = slot else { continue };
            let pinned = unsafe { std::pin::Pin::new_unchecked(task) };
            if let Poll::Ready(value) = pinned.poll(cx) {
                *slot = None;
                for other in this.tasks.iter().flatten() {
                    other.request_stop();
                }
                return Poll::Ready((index, value));
            }
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;

    #[test]
    fn first_ready_task_wins() {
        let exec = LocalExecutor::new();
        let (index, value) = exec.block_on(when_any(vec![
            Task::new(async {
                std::future::pending::<()>().await;
                Ok(1)
            }),
            Task::ready(Ok(2)),
        ]));
        assert_eq!(index, 1);
        assert_eq!(value.unwrap(), 2);
    }

    #[test]
    fn losing_tasks_are_asked_to_stop() {
        let exec = LocalExecutor::new();
        let loser = Task::<()>::new(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let loser_token = loser.stop_token();
        exec.block_on(when_any(vec![loser, Task::ready(Ok(()))]));
        assert!(loser_token.is_stop_requested());
    }
}
