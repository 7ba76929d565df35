use crate::error::ExecutorError;
use crate::executor::{FiberState, GroupExecutor};
use dispatch_core::{DependencyWaiter, ObjectId};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Waits in flight on the resolver thread
const MAX_CONCURRENT_WAITS: usize = 1024;

/// Resolves task arguments before an ordered queue may release the task.
///
/// Waits run as fibers on a thread of their own. A finished wait runs its
/// `on_ready` hook and then wakes whoever drives the queues through
/// [`DependencyResolver::ready`].
#[derive(Clone)]
pub struct DependencyResolver {
    executor: Arc<FiberState>,
    ready: Arc<Notify>,
    cancel: CancellationToken,
}

impl DependencyResolver {
    pub fn new(name: &str) -> Result<Self, ExecutorError> {
        Ok(Self {
            executor: Arc::new(FiberState::create(name, MAX_CONCURRENT_WAITS, None)?),
            ready: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Notified once some wait finished since the last notification
    pub fn ready(&self) -> Arc<Notify> {
        self.ready.clone()
    }

    pub fn wait(
        &self,
        waiter: Arc<dyn DependencyWaiter>,
        dependencies: Vec<ObjectId>,
        on_ready: impl FnOnce() + Send + 'static,
    ) -> Result<(), ExecutorError> {
        let ready = self.ready.clone();
        let cancel = self.cancel.clone();
        self.executor.post(Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    trace!(dependencies = dependencies.len(), "Dependency wait abandoned");
                }
                _ = waiter.wait(&dependencies) => {
                    on_ready();
                    ready.notify_one();
                }
            }
        }))
    }

    /// Abandon outstanding waits and refuse new ones
    pub fn stop(&self) {
        self.cancel.cancel();
        self.executor.stop();
    }

    pub fn join(&self) {
        self.executor.join();
    }
}
