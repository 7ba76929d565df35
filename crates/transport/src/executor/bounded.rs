use super::{GroupExecutor, Job};
use crate::error::ExecutorError;
use crossbeam_channel::{Receiver, Sender};
use dispatch_core::InitializeThreadCallback;
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Fixed-size thread pool.
///
/// Each thread owns a current-thread tokio runtime and drives one job at a time
/// to completion, so up to `max_concurrency` jobs run truly in parallel. A job that
/// blocks (dependency wait, user code) holds its thread.
pub struct BoundedExecutor {
    name: String,
    max_concurrency: usize,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedExecutor {
    fn worker_loop(
        runtime: tokio::runtime::Runtime,
        jobs: Receiver<Job>,
        initialize_thread: Option<InitializeThreadCallback>,
    ) {
        if let Some(init) = initialize_thread {
            init();
        }
        // Disconnect only happens after stop() and once the backlog is drained.
        while let Ok(job) = jobs.recv() {
            runtime.block_on(job);
        }
        trace!("Executor thread exiting");
    }
}

impl GroupExecutor for BoundedExecutor {
    fn create(
        name: &str,
        max_concurrency: usize,
        initialize_thread: Option<InitializeThreadCallback>,
    ) -> Result<Self, ExecutorError> {
        if max_concurrency == 0 {
            return Err(ExecutorError::InvalidConcurrency(name.to_string()));
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(max_concurrency);

        for index in 0..max_concurrency {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| ExecutorError::Runtime(name.to_string(), e))?;
            let jobs = receiver.clone();
            let init = initialize_thread.clone();

            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || Self::worker_loop(runtime, jobs, init))
                .map_err(|e| ExecutorError::Spawn(name.to_string(), e))?;
            workers.push(handle);
        }

        debug!(executor = %name, max_concurrency, "Bounded executor started");

        Ok(Self {
            name: name.to_string(),
            max_concurrency,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    fn post(&self, job: Job) -> Result<(), ExecutorError> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .send(job)
                .map_err(|_| ExecutorError::Stopped(self.name.clone())),
            None => Err(ExecutorError::Stopped(self.name.clone())),
        }
    }

    fn stop(&self) {
        if self.sender.lock().take().is_some() {
            debug!(executor = %self.name, "Bounded executor stopping");
        }
    }

    fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            // A job joining its own executor would deadlock.
            if worker.thread().id() == current {
                continue;
            }
            let _ = worker.join();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}
