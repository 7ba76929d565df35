use super::{GroupExecutor, Job};
use crate::error::ExecutorError;
use dispatch_core::InitializeThreadCallback;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::LocalSet;
use tracing::{debug, trace};

/// Cooperative scheduler for one concurrency group of an asynchronous actor.
///
/// All jobs run on a single thread inside a [`LocalSet`]; they interleave only at
/// `.await` points. At most `max_concurrency` jobs are in flight, the rest wait in
/// the channel in arrival order.
pub struct FiberState {
    name: String,
    max_concurrency: usize,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FiberState {
    async fn run_fibers(mut jobs: mpsc::UnboundedReceiver<Job>, max_concurrency: usize) {
        let limiter = Arc::new(Semaphore::new(max_concurrency));

        while let Some(job) = jobs.recv().await {
            let Ok(permit) = limiter.clone().acquire_owned().await else {
                break;
            };
            tokio::task::spawn_local(async move {
                job.await;
                drop(permit);
            });
        }

        // Channel closed: let fibers already in flight finish.
        let _ = limiter.acquire_many(max_concurrency as u32).await;
        trace!("Fiber thread exiting");
    }
}

impl GroupExecutor for FiberState {
    fn create(
        name: &str,
        max_concurrency: usize,
        initialize_thread: Option<InitializeThreadCallback>,
    ) -> Result<Self, ExecutorError> {
        if max_concurrency == 0 {
            return Err(ExecutorError::InvalidConcurrency(name.to_string()));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ExecutorError::Runtime(name.to_string(), e))?;
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new()
            .name(format!("{name}-fiber"))
            .spawn(move || {
                if let Some(init) = initialize_thread {
                    init();
                }
                let local = LocalSet::new();
                local.block_on(&runtime, Self::run_fibers(receiver, max_concurrency));
            })
            .map_err(|e| ExecutorError::Spawn(name.to_string(), e))?;

        debug!(executor = %name, max_concurrency, "Fiber executor started");

        Ok(Self {
            name: name.to_string(),
            max_concurrency,
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(handle)),
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
            debug!(executor = %self.name, "Fiber executor stopping");
        }
    }

    fn join(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

impl Drop for FiberState {
    fn drop(&mut self) {
        self.stop();
    }
}
