//! Built-in collaborators for running the receiver without a cluster

use async_trait::async_trait;
use dispatch_core::{
    ActorCreationNotifier, ClientPool, ObjectId, ResourceMappingType, ReturnValue, Status,
    TaskExecutionOutputs, TaskHandler, TaskSpecification, WorkerId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Answers every task with its own function name as each return value.
///
/// With `max_calls` set, the call that reaches the limit asks the worker to exit.
#[derive(Debug, Default)]
pub struct EchoTaskHandler {
    max_calls: Option<usize>,
    calls: AtomicUsize,
}

impl EchoTaskHandler {
    pub fn new(max_calls: Option<usize>) -> Self {
        Self {
            max_calls,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskHandler for EchoTaskHandler {
    async fn execute(
        &self,
        task_spec: &TaskSpecification,
        resource_ids: Option<ResourceMappingType>,
        outputs: &mut TaskExecutionOutputs,
    ) -> Status {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            task_id = %task_spec.task_id(),
            call,
            resources = ?resource_ids,
            "Echoing task"
        );

        let payload = task_spec.function_descriptor().to_string().into_bytes();
        for _ in 0..task_spec.num_returns() {
            outputs
                .return_objects
                .push((ObjectId::new(), Some(Arc::new(ReturnValue::inline(payload.clone())))));
        }
        for object_id in task_spec.dynamic_return_ids() {
            outputs
                .dynamic_return_objects
                .push((*object_id, Arc::new(ReturnValue::inline(payload.clone()))));
        }

        match self.max_calls {
            Some(max_calls) if call >= max_calls => {
                Status::intentional_system_exit(format!("Reached max calls ({max_calls})"))
            }
            _ => Status::ok(),
        }
    }
}

/// Logs actor creation instead of reporting it to a fleet manager
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl ActorCreationNotifier for LoggingNotifier {
    async fn actor_creation_task_done(&self) -> Status {
        info!("Actor is live");
        Status::ok()
    }
}

/// Client pool with no connections to drop
#[derive(Debug, Default)]
pub struct LocalClientPool;

impl ClientPool for LocalClientPool {
    fn disconnect(&self, worker_id: &WorkerId) {
        debug!(worker_id = %worker_id, "Releasing caller connection");
    }
}
