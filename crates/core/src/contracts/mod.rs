//! Contracts for the collaborators the task receiver drives but does not own

use crate::domain::{ObjectId, ReturnValue, Status, TaskSpecification, WorkerId};
use crate::messages::{BorrowedRef, ResourceMappingType};
use async_trait::async_trait;
use std::sync::Arc;

/// Output slots filled in by [`TaskHandler::execute`]
#[derive(Debug, Default)]
pub struct TaskExecutionOutputs {
    /// Ordinary returns; a `None` value means the object could not be produced
    pub return_objects: Vec<(ObjectId, Option<Arc<ReturnValue>>)>,
    pub dynamic_return_objects: Vec<(ObjectId, Arc<ReturnValue>)>,
    /// (object id, stored in the shared object store)
    pub streaming_generator_returns: Vec<(ObjectId, bool)>,
    pub borrowed_refs: Vec<BorrowedRef>,
    pub is_retryable_error: bool,
    /// Empty unless the task body raised
    pub application_error: String,
}

/// Runs user code for one task.
///
/// The returned status carries three independent signals: success/failure,
/// [`Status::is_creation_task_error`] and [`Status::should_exit_worker`].
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn execute(
        &self,
        task_spec: &TaskSpecification,
        resource_ids: Option<ResourceMappingType>,
        outputs: &mut TaskExecutionOutputs,
    ) -> Status;
}

/// Makes the given argument objects locally available before a task body runs
#[async_trait]
pub trait DependencyWaiter: Send + Sync + 'static {
    async fn wait(&self, dependencies: &[ObjectId]);
}

/// Tells the fleet manager an actor finished construction and is live
#[async_trait]
pub trait ActorCreationNotifier: Send + Sync + 'static {
    async fn actor_creation_task_done(&self) -> Status;
}

/// Cache of connections to other workers
pub trait ClientPool: Send + Sync + 'static {
    /// Drop the cached connection to `worker_id`, if any
    fn disconnect(&self, worker_id: &WorkerId);
}

/// Runs once on every executor thread before it takes work
pub type InitializeThreadCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Waiter for deployments where arguments are always inlined
#[derive(Debug, Default, Clone)]
pub struct NoopDependencyWaiter;

#[async_trait]
impl DependencyWaiter for NoopDependencyWaiter {
    async fn wait(&self, _dependencies: &[ObjectId]) {}
}
