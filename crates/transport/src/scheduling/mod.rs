//! Scheduling queues: where accepted requests wait until they may run
//!
//! Every entry ends in exactly one outcome: the executor runs it through
//! [`TaskOutcomeHandler::accept`], or the queue rejects it through
//! [`TaskOutcomeHandler::cancel`].

mod dependencies;
mod in_order;
mod normal;
mod out_of_order;

pub use dependencies::DependencyResolver;
pub use in_order::ActorSchedulingQueue;
pub use normal::NormalSchedulingQueue;
pub use out_of_order::OutOfOrderActorSchedulingQueue;

use crate::concurrency_group::ActorExecutors;
use crate::error::ExecutorError;
use crate::executor::Job;
use dispatch_core::{
    DependencyWaiter, PushTaskReply, Status, TaskId, TaskSpecification,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Sends the reply of one task; consumed on use
pub type SendReplyCallback = Box<dyn FnOnce(Status, PushTaskReply) + Send + 'static>;

/// Decides what happens to a task once the queue lets go of it
pub trait TaskOutcomeHandler: Send + 'static {
    /// Run the task and send its reply
    fn accept(
        self: Box<Self>,
        task_spec: TaskSpecification,
        send_reply: SendReplyCallback,
    ) -> BoxFuture<'static, ()>;

    /// Reject the task without running it
    fn cancel(self: Box<Self>, task_spec: TaskSpecification, status: Status, send_reply: SendReplyCallback);
}

/// One queued task with everything needed to finish it
pub struct InboundRequest {
    seq_no: i64,
    client_processed_up_to: i64,
    handler: Box<dyn TaskOutcomeHandler>,
    send_reply: SendReplyCallback,
    task_spec: TaskSpecification,
}

impl InboundRequest {
    pub fn new(
        seq_no: i64,
        client_processed_up_to: i64,
        handler: Box<dyn TaskOutcomeHandler>,
        send_reply: SendReplyCallback,
        task_spec: TaskSpecification,
    ) -> Self {
        Self {
            seq_no,
            client_processed_up_to,
            handler,
            send_reply,
            task_spec,
        }
    }

    pub fn seq_no(&self) -> i64 {
        self.seq_no
    }

    pub fn client_processed_up_to(&self) -> i64 {
        self.client_processed_up_to
    }

    pub fn task_id(&self) -> TaskId {
        self.task_spec.task_id()
    }

    pub fn task_spec(&self) -> &TaskSpecification {
        &self.task_spec
    }

    pub async fn accept(self) {
        self.handler.accept(self.task_spec, self.send_reply).await
    }

    pub fn cancel(self, status: Status) {
        self.handler.cancel(self.task_spec, status, self.send_reply)
    }
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("seq_no", &self.seq_no)
            .field("client_processed_up_to", &self.client_processed_up_to)
            .field("task_id", &self.task_id())
            .finish()
    }
}

/// Capability shared by the actor and normal queues.
///
/// Queues are owned and mutated by a single driver; none of these methods block.
pub trait SchedulingQueue: Send {
    fn add(
        &mut self,
        seq_no: i64,
        client_processed_up_to: i64,
        handler: Box<dyn TaskOutcomeHandler>,
        send_reply: SendReplyCallback,
        task_spec: TaskSpecification,
    );

    /// Release whatever the ordering policy allows
    fn schedule_requests(&mut self);

    fn task_queue_empty(&self) -> bool;

    /// Cancel a task that has not started; `false` if unknown or already running
    fn cancel_task_if_found(&mut self, task_id: TaskId) -> bool;

    /// Reject buffered and future work; dispatched work still completes
    fn stop(&mut self);
}

pub(crate) fn task_cancelled_status() -> Status {
    Status::scheduling_cancelled("Task was cancelled before it started running")
}

pub(crate) fn queue_stopped_status() -> Status {
    Status::scheduling_cancelled("Scheduling queue is stopped")
}

/// A request handed to an executor but not yet picked up by it.
///
/// The executor job and the queue share the slot; whoever takes the request first
/// decides its outcome.
pub(crate) struct Released {
    task_id: TaskId,
    slot: Arc<Mutex<Option<InboundRequest>>>,
}

impl Released {
    pub(crate) fn is_started(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn take(&self) -> Option<InboundRequest> {
        self.slot.lock().take()
    }
}

/// Hand `request` to an executor through `post`.
///
/// With a `waiter`, the job first waits for the task's dependencies; without one
/// they must already be resolved. If `post` refuses the job, the request is
/// cancelled here.
pub(crate) fn release(
    request: InboundRequest,
    waiter: Option<&Arc<dyn DependencyWaiter>>,
    post: impl FnOnce(Job) -> Result<(), ExecutorError>,
) -> Option<Released> {
    let task_id = request.task_id();
    let slot = Arc::new(Mutex::new(Some(request)));

    let job_slot = slot.clone();
    let waiter = waiter.cloned();
    let job: Job = Box::pin(async move {
        let request = job_slot.lock().take();
        let Some(request) = request else {
            trace!(task_id = %task_id, "Task cancelled while in executor backlog");
            return;
        };
        if let Some(waiter) = waiter.filter(|_| !request.task_spec().dependencies().is_empty()) {
            let dependencies = request.task_spec().dependencies().to_vec();
            waiter.wait(&dependencies).await;
        }
        request.accept().await;
    });

    match post(job) {
        Ok(()) => Some(Released { task_id, slot }),
        Err(e) => {
            if let Some(request) = slot.lock().take() {
                warn!(task_id = %task_id, error = %e, "Executor refused task");
                request.cancel(e.to_status());
            }
            None
        }
    }
}

/// Cancel a released request that the executor has not started yet
pub(crate) fn cancel_released(
    released: &mut Vec<Released>,
    task_id: TaskId,
    status: Status,
) -> bool {
    let Some(index) = released.iter().position(|r| r.task_id == task_id) else {
        return false;
    };
    let entry = released.swap_remove(index);
    match entry.take() {
        Some(request) => {
            request.cancel(status);
            true
        }
        None => false,
    }
}

/// Per-caller queue of an actor, ordered or not
pub enum ActorQueue {
    InOrder(ActorSchedulingQueue),
    OutOfOrder(OutOfOrderActorSchedulingQueue),
}

impl ActorQueue {
    pub fn new(
        execute_out_of_order: bool,
        executors: ActorExecutors,
        waiter: Arc<dyn DependencyWaiter>,
        resolver: DependencyResolver,
        reorder_wait: Duration,
    ) -> Self {
        if execute_out_of_order {
            ActorQueue::OutOfOrder(OutOfOrderActorSchedulingQueue::new(executors, waiter))
        } else {
            ActorQueue::InOrder(ActorSchedulingQueue::new(
                executors,
                waiter,
                resolver,
                reorder_wait,
            ))
        }
    }

    fn inner(&mut self) -> &mut dyn SchedulingQueue {
        match self {
            ActorQueue::InOrder(queue) => queue,
            ActorQueue::OutOfOrder(queue) => queue,
        }
    }
}

impl SchedulingQueue for ActorQueue {
    fn add(
        &mut self,
        seq_no: i64,
        client_processed_up_to: i64,
        handler: Box<dyn TaskOutcomeHandler>,
        send_reply: SendReplyCallback,
        task_spec: TaskSpecification,
    ) {
        self.inner()
            .add(seq_no, client_processed_up_to, handler, send_reply, task_spec)
    }

    fn schedule_requests(&mut self) {
        self.inner().schedule_requests()
    }

    fn task_queue_empty(&self) -> bool {
        match self {
            ActorQueue::InOrder(queue) => queue.task_queue_empty(),
            ActorQueue::OutOfOrder(queue) => queue.task_queue_empty(),
        }
    }

    fn cancel_task_if_found(&mut self, task_id: TaskId) -> bool {
        self.inner().cancel_task_if_found(task_id)
    }

    fn stop(&mut self) {
        self.inner().stop()
    }
}
