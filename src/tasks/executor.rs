//! Maintenance Executor
//!
//! A single named worker thread that runs submitted jobs one at a time, in
//! submission order. Results come back through a oneshot channel, so callers
//! can block on them or await them from async code.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{CacheError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub struct MaintenanceExecutor {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceExecutor {
    /// Starts the worker thread.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let worker = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Maintenance job panicked");
                }
            }
        })?;

        debug!("Maintenance executor '{}' started", name);
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    // == Submit ==
    /// Queues `job` and returns a receiver for its result.
    ///
    /// The receiver errors if the job panics. Fails with
    /// [`CacheError::ExecutorClosed`] after [`shutdown`](Self::shutdown).
    pub fn submit<F, T>(&self, job: F) -> Result<oneshot::Receiver<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // Receiver may have been dropped; nothing to report then
            let _ = result_tx.send(job());
        });

        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(CacheError::ExecutorClosed)?;
        sender.send(job).map_err(|_| CacheError::ExecutorClosed)?;
        Ok(result_rx)
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    // == Shutdown ==
    /// Stops accepting jobs and waits for queued ones to finish.
    ///
    /// Idempotent. When called from the worker thread itself, returns
    /// without joining.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!("Maintenance executor '{}' exited abnormally", self.name);
        } else {
            debug!("Maintenance executor '{}' stopped", self.name);
        }
    }
}

impl Drop for MaintenanceExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
