//! Scheduler - the shared cooperative execution context
//!
//! One current-thread tokio runtime driven on a single dedicated OS thread.
//! Every completion's fragment-consumption task is spawned onto it, so the
//! number of OS-level execution contexts stays at one no matter how many
//! completions are in flight; tasks interleave cooperatively at their await
//! points.
//!
//! The scheduler is an explicitly-owned object passed around by handle
//! (`Arc<Scheduler>`). [`Scheduler::shared`] lazily initializes a
//! process-wide instance for callers that don't care about teardown; tests
//! that want deterministic shutdown construct their own with
//! [`Scheduler::new`].

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Result, WeftError};

pub struct Scheduler {
    handle: tokio::runtime::Handle,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Scheduler {
    /// Build a scheduler with its own driver thread.
    pub fn new() -> Result<Arc<Self>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| WeftError::SchedulerInit {
                details: e.to_string(),
            })?;
        let handle = runtime.handle().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name("weft-scheduler".to_string())
            .spawn(move || {
                // block_on drives every task spawned via the handle until
                // the shutdown signal arrives (or its sender is dropped).
                runtime.block_on(async move {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(|e| WeftError::SchedulerInit {
                details: e.to_string(),
            })?;

        debug!("scheduler thread started");

        Ok(Arc::new(Self {
            handle,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// The lazily-initialized process-wide scheduler.
    ///
    /// Initialization is idempotent and thread-safe: the first caller wins,
    /// concurrent callers block only until the context is ready.
    pub fn shared() -> Arc<Scheduler> {
        static SHARED: OnceLock<Arc<Scheduler>> = OnceLock::new();
        SHARED
            .get_or_init(|| Scheduler::new().expect("failed to start shared scheduler"))
            .clone()
    }

    /// Enqueue a task onto the shared context; returns immediately.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task);
    }

    /// Stop the driver thread. In-flight tasks are dropped at their next
    /// suspension point. Idempotent.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.lock().take() {
            // A task dropping the last handle would otherwise join itself.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn scheduled_task_runs() {
        let scheduler = Scheduler::new().unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ran);
        let (tx, rx) = std::sync::mpsc::channel();
        scheduler.schedule(async move {
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(());
        });

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ran.load(Ordering::SeqCst));
        scheduler.shutdown();
    }

    #[test]
    fn tasks_interleave_on_one_thread() {
        let scheduler = Scheduler::new().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        for i in 0..4 {
            let tx = tx.clone();
            scheduler.schedule(async move {
                // Suspend once so the tasks must take turns.
                tokio::time::sleep(Duration::from_millis(10)).await;
                let _ = tx.send(i);
            });
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let scheduler = Scheduler::new().unwrap();
        scheduler.shutdown();
        scheduler.shutdown();
    }

    #[test]
    fn shared_returns_the_same_instance() {
        let a = Scheduler::shared();
        let b = Scheduler::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
