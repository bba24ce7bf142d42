//! Bounded worker pool generic over its task type.
//!
//! Tasks flow through a capacity-one channel, so `submit` blocks while every
//! worker is busy; that blocking is the pipeline's backpressure. Workers
//! never exit on a handler error, only on shutdown or channel close.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of workers draining the queue.
pub const DEFAULT_WORKER_COUNT: usize = 25;

/// A fixed-size pool of long-lived workers driving an async handler.
pub struct WorkerPool<T> {
    tasks: mpsc::Sender<T>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `worker_count` workers, each draining the task channel until it
    /// closes or shutdown is signaled.
    pub fn start<H, Fut, E>(worker_count: usize, handler: H) -> Self
    where
        H: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display,
    {
        let (task_tx, task_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let handler = Arc::new(handler);

        let workers = (0..worker_count)
            .map(|worker| {
                let task_rx = Arc::clone(&task_rx);
                let handler = Arc::clone(&handler);
                let mut shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    loop {
                        let task = tokio::select! {
                            biased;

                            changed = shutdown_rx.changed() => {
                                match changed {
                                    Ok(()) if *shutdown_rx.borrow() => break,
                                    Ok(()) => continue,
                                    // Sender gone: the pool was dropped.
                                    Err(_) => break,
                                }
                            }

                            task = next_task(&task_rx) => match task {
                                Some(task) => task,
                                None => break,
                            },
                        };

                        if let Err(e) = handler(task).await {
                            warn!(worker, error = %e, "task handler failed");
                        }
                    }
                    debug!(worker, "worker exited");
                })
            })
            .collect();

        Self {
            tasks: task_tx,
            shutdown: shutdown_tx,
            workers,
        }
    }

    /// Hand a task to the pool, waiting until a worker can take it.
    pub async fn submit(&self, task: T) {
        if self.tasks.send(task).await.is_err() {
            warn!("worker pool task channel closed, dropping task");
        }
    }

    /// Signal shutdown, close the task channel, and wait for every worker to
    /// observe one of the two and return.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        drop(self.tasks);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn next_task<T>(task_rx: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
    task_rx.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Poll until `counter` reaches `expected`; `stop()` may legitimately
    /// abandon a queued task, so tests drain before stopping.
    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {expected} handled tasks, saw {}",
            counter.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_all_submitted_tasks_are_handled() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let pool = WorkerPool::start(4, move |_: u32| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Infallible>(())
            }
        });

        for task in 0..32 {
            pool.submit(task).await;
        }
        wait_for(&handled, 32).await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_workers_survive_handler_errors() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let pool = WorkerPool::start(1, move |task: u32| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if task % 2 == 0 {
                    Err("even task rejected")
                } else {
                    Ok(())
                }
            }
        });

        for task in 0..10 {
            pool.submit(task).await;
        }
        wait_for(&handled, 10).await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_with_no_tasks_returns() {
        let pool = WorkerPool::start(8, |_: u32| async { Ok::<(), Infallible>(()) });
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_submit_backpressures_until_a_worker_frees_up() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let handled = Arc::new(AtomicUsize::new(0));
        let worker_gate = Arc::clone(&gate);
        let counter = Arc::clone(&handled);
        let pool = WorkerPool::start(1, move |_: u32| {
            let gate = Arc::clone(&worker_gate);
            let counter = Arc::clone(&counter);
            async move {
                let Ok(permit) = gate.acquire().await else {
                    return Err("gate closed");
                };
                permit.forget();
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        // One task occupies the worker, one sits in the channel slot; the
        // third submit must wait for the gate to open.
        pool.submit(1).await;
        pool.submit(2).await;
        let third = tokio::time::timeout(Duration::from_millis(50), pool.submit(3));
        assert!(third.await.is_err());

        gate.add_permits(3);
        pool.submit(3).await;
        wait_for(&handled, 3).await;
        pool.stop().await;
    }
}
