//! Spawns the long-running tasks (clock tick producer, block processor, attestation processor)
//! onto a shared tokio runtime, tying each to the node's single shutdown signal so stopping the
//! chain coordinator stops every task it started.

use futures::future::Future;
use slog::{debug, o, Logger};
use tokio::runtime::Handle;

mod metrics;

/// A handle to the runtime plus the shutdown signal every spawned task is raced against. Cloning
/// is cheap; every clone shares the same runtime handle and exit signal.
#[derive(Clone)]
pub struct TaskExecutor {
    handle: Handle,
    exit: exit_future::Exit,
    log: Logger,
}

impl TaskExecutor {
    pub fn new(handle: Handle, exit: exit_future::Exit, log: Logger) -> Self {
        Self { handle, exit, log }
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// A copy of this executor with `name` appended to its logger, used when handing the executor
    /// down into a subsystem constructor so its log lines are attributable.
    pub fn clone_with_name(&self, name: &'static str) -> Self {
        Self {
            handle: self.handle.clone(),
            exit: self.exit.clone(),
            log: self.log.new(o!("service" => name)),
        }
    }

    /// Spawns `task` on the runtime, racing it against the shutdown signal so it is dropped, not
    /// run to completion, once `exit` fires. Intended for tasks that loop until told to stop (the
    /// clock tick producer, network event loops).
    pub fn spawn(&self, task: impl Future<Output = ()> + Send + 'static, name: &'static str) {
        let exit = self.exit.clone();
        let log = self.log.clone();
        lighthouse_metrics::inc_gauge_vec(&metrics::ASYNC_TASKS_COUNT, &[name]);
        self.handle.spawn(async move {
            futures::future::select(Box::pin(task), exit).await;
            lighthouse_metrics::dec_gauge_vec(&metrics::ASYNC_TASKS_COUNT, &[name]);
            debug!(log, "Task ended"; "name" => name);
        });
    }

    /// Spawns `task` to run to completion even if `exit` fires first — for one-shot work (a
    /// single state-transition, a single genesis check) that must not be cancelled mid-flight.
    pub fn spawn_ignoring_error(
        &self,
        task: impl Future<Output = Result<(), ()>> + Send + 'static,
        name: &'static str,
    ) {
        let log = self.log.clone();
        self.handle.spawn(async move {
            if task.await.is_err() {
                debug!(log, "Task completed with error"; "name" => name);
            }
        });
    }

    /// Runs CPU-bound work on the blocking thread pool, for use by callers (the block processor)
    /// that must not block the async runtime while running the state-transition function.
    pub fn spawn_blocking<F, R>(&self, task: F, name: &'static str) -> tokio::task::JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let log = self.log.clone();
        let handle = self.handle.spawn_blocking(task);
        debug!(log, "Spawned blocking task"; "name" => name);
        handle
    }

    pub fn exit(&self) -> exit_future::Exit {
        self.exit.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> Logger {
        let drain = slog::Discard;
        Logger::root(drain, o!())
    }

    #[tokio::test]
    async fn spawned_task_runs_to_completion_without_exit() {
        let (signal, exit) = exit_future::signal();
        let executor = TaskExecutor::new(Handle::current(), exit, test_logger());

        let (tx, rx) = tokio::sync::oneshot::channel();
        executor.spawn(
            async move {
                let _ = tx.send(());
            },
            "test_task",
        );

        rx.await.unwrap();
        drop(signal);
    }
}
