use super::{
    cancel_released, queue_stopped_status, release, task_cancelled_status, InboundRequest,
    Released, SchedulingQueue, SendReplyCallback, TaskOutcomeHandler,
};
use crate::concurrency_group::ActorExecutors;
use dispatch_core::{DependencyWaiter, Status, TaskId, TaskSpecification};
use std::sync::Arc;
use tracing::warn;

/// Releases actor tasks as soon as they arrive; only the group executors bound
/// concurrency. Sequence numbers are ignored.
pub struct OutOfOrderActorSchedulingQueue {
    executors: ActorExecutors,
    waiter: Arc<dyn DependencyWaiter>,
    released: Vec<Released>,
    stopped: bool,
}

impl OutOfOrderActorSchedulingQueue {
    pub fn new(executors: ActorExecutors, waiter: Arc<dyn DependencyWaiter>) -> Self {
        Self {
            executors,
            waiter,
            released: Vec::new(),
            stopped: false,
        }
    }

    /// A retried task replaces an attempt still sitting in the executor backlog
    fn cancel_superseded_attempt(&mut self, task_id: TaskId) {
        let Some(index) = self.released.iter().position(|r| r.task_id == task_id) else {
            return;
        };
        let previous = self.released.swap_remove(index);
        if let Some(request) = previous.take() {
            warn!(task_id = %task_id, "Replacing queued attempt with retry");
            request.cancel(Status::invalid("Request was replaced by a retry"));
        }
    }
}

impl SchedulingQueue for OutOfOrderActorSchedulingQueue {
    fn add(
        &mut self,
        seq_no: i64,
        client_processed_up_to: i64,
        handler: Box<dyn TaskOutcomeHandler>,
        send_reply: SendReplyCallback,
        task_spec: TaskSpecification,
    ) {
        let request =
            InboundRequest::new(seq_no, client_processed_up_to, handler, send_reply, task_spec);
        if self.stopped {
            request.cancel(queue_stopped_status());
            return;
        }

        self.cancel_superseded_attempt(request.task_id());

        let spec = request.task_spec().clone();
        let executors = &self.executors;
        if let Some(released) = release(request, Some(&self.waiter), |job| executors.post(&spec, job)) {
            self.released.push(released);
        }
        self.schedule_requests();
    }

    fn schedule_requests(&mut self) {
        self.released.retain(|r| !r.is_started());
    }

    fn task_queue_empty(&self) -> bool {
        self.released.iter().all(|r| r.is_started())
    }

    fn cancel_task_if_found(&mut self, task_id: TaskId) -> bool {
        cancel_released(&mut self.released, task_id, task_cancelled_status())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.executors.stop();
    }
}
