use super::{
    cancel_released, queue_stopped_status, release, InboundRequest, Released, SchedulingQueue,
    SendReplyCallback, TaskOutcomeHandler,
};
use crate::executor::{BoundedExecutor, GroupExecutor};
use dispatch_core::{DependencyWaiter, Status, TaskId, TaskSpecification};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// FIFO of normal tasks, run one at a time on the main task thread.
///
/// A cancelled normal task is a successful RPC: the reply carries
/// `was_cancelled_before_running` and an OK status.
pub struct NormalSchedulingQueue {
    pending: VecDeque<InboundRequest>,
    executor: Arc<BoundedExecutor>,
    waiter: Arc<dyn DependencyWaiter>,
    released: Vec<Released>,
    stopped: bool,
}

impl NormalSchedulingQueue {
    pub fn new(executor: Arc<BoundedExecutor>, waiter: Arc<dyn DependencyWaiter>) -> Self {
        Self {
            pending: VecDeque::new(),
            executor,
            waiter,
            released: Vec::new(),
            stopped: false,
        }
    }
}

impl SchedulingQueue for NormalSchedulingQueue {
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
        self.pending.push_back(request);
    }

    fn schedule_requests(&mut self) {
        self.released.retain(|r| !r.is_started());
        while let Some(request) = self.pending.pop_front() {
            debug!(task_id = %request.task_id(), "Releasing normal task to main thread");
            let executor = &self.executor;
            if let Some(released) = release(request, Some(&self.waiter), |job| executor.post(job)) {
                self.released.push(released);
            }
        }
    }

    fn task_queue_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn cancel_task_if_found(&mut self, task_id: TaskId) -> bool {
        if let Some(index) = self.pending.iter().position(|r| r.task_id() == task_id) {
            if let Some(request) = self.pending.remove(index) {
                request.cancel(Status::ok());
                return true;
            }
        }
        cancel_released(&mut self.released, task_id, Status::ok())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for request in self.pending.drain(..) {
            request.cancel(queue_stopped_status());
        }
        self.executor.stop();
    }
}
