//! Bounded pool of named worker threads.

use std::{
    fmt::{self, Debug, Formatter},
    panic::{self, AssertUnwindSafe},
    thread,
};

use flume::{Sender, TrySendError};
use tracing::{trace, warn};

use crate::{Error, Result};

type Job = Box<dyn FnOnce() + Send>;

/// Runs jobs on a fixed number of threads, with at most `max_pending` jobs queued.
///
/// Threads exit once the pool is dropped and the queue drains.
pub struct WorkerPool {
    name: String,
    sender: Sender<Job>,
}

impl Debug for WorkerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("pending", &self.sender.len())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize, max_pending: usize) -> Result<Self> {
        let (sender, receiver) = flume::bounded::<Job>(max_pending);

        for i in 0..threads.max(1) {
            let receiver = receiver.clone();

            thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!("Worker job panicked");
                        }
                    }
                })?;
        }

        Ok(Self {
            name: name.to_string(),
            sender,
        })
    }

    // === Getters ===

    /// Number of queued jobs not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    // === Public Methods ===

    /// Queue a job, failing with [Error::CapacityExceeded] if the queue is full.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                trace!(pool = %self.name, "Worker pool is saturated");
                Err(Error::CapacityExceeded)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::Shutdown),
        }
    }
}
