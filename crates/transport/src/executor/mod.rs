//! Executors that run released tasks
//!
//! Two strategies sit behind [`GroupExecutor`]: [`FiberState`] interleaves tasks
//! cooperatively on one thread (asynchronous actors), [`BoundedExecutor`] runs them
//! in parallel on a fixed set of threads (synchronous actors, normal tasks).

mod bounded;
mod fiber;

pub use bounded::BoundedExecutor;
pub use fiber::FiberState;

use crate::error::ExecutorError;
use dispatch_core::InitializeThreadCallback;
use futures::future::BoxFuture;

/// A unit of work handed to an executor
pub type Job = BoxFuture<'static, ()>;

/// One concurrency group's execution lane
pub trait GroupExecutor: Send + Sync + Sized + 'static {
    /// Start the executor's threads. `initialize_thread` runs once per thread
    /// before it takes work.
    fn create(
        name: &str,
        max_concurrency: usize,
        initialize_thread: Option<InitializeThreadCallback>,
    ) -> Result<Self, ExecutorError>;

    /// Queue a job. Fails once the executor has been stopped.
    fn post(&self, job: Job) -> Result<(), ExecutorError>;

    /// Stop accepting jobs; jobs already posted still run
    fn stop(&self);

    /// Wait for the executor's threads to finish. Call after [`GroupExecutor::stop`].
    fn join(&self);

    fn name(&self) -> &str;

    fn max_concurrency(&self) -> usize;
}
