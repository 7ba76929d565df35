//! Entry point for inbound tasks
//!
//! [`TaskReceiver`] turns each [`PushTaskRequest`] into a queued entry with a
//! [`TaskOutcome`] attached, routes it to the caller's actor queue or to the normal
//! queue, and owns the one-time actor setup of this worker.

use crate::concurrency_group::ActorExecutors;
use crate::config::TaskReceiverConfig;
use crate::error::{fatal, ReceiverError};
use crate::executor::{BoundedExecutor, GroupExecutor};
use crate::scheduling::{
    ActorQueue, DependencyResolver, NormalSchedulingQueue, SchedulingQueue, SendReplyCallback,
    TaskOutcomeHandler,
};
use common::OperationTimer;
use dashmap::DashMap;
use dispatch_core::{
    ActorCreationNotifier, ActorId, ClientPool, ConcurrencyGroup, DependencyWaiter,
    InitializeThreadCallback, PushTaskReply, PushTaskRequest, ResourceMappingType, ReturnObject,
    Status, StreamingGeneratorReturnId, TaskExecutionOutputs, TaskHandler, TaskId,
    TaskSpecification, WorkerAddress, WorkerId,
};
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// One-time configuration of the actor hosted by this worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorSetup {
    pub is_asyncio: bool,
    pub fiber_max_concurrency: usize,
    pub execute_out_of_order: bool,
}

/// Actor state shared between the receiver and running accept paths
struct ActorState {
    task_handler: Arc<dyn TaskHandler>,
    creation_notifier: Arc<dyn ActorCreationNotifier>,
    initialize_thread: Option<InitializeThreadCallback>,
    setup: OnceCell<ActorSetup>,
    current_actor_id: RwLock<Option<ActorId>>,
    executors: RwLock<Option<ActorExecutors>>,
    concurrency_groups_cache: DashMap<ActorId, Vec<ConcurrencyGroup>>,
    actor_repr_name: RwLock<String>,
}

impl ActorState {
    /// Build the actor's executors and report it live. Runs on the accept path
    /// of a creation task whose results validated.
    async fn finish_actor_creation(
        &self,
        task_spec: &TaskSpecification,
        status: &Status,
        reply: &mut PushTaskReply,
    ) {
        let Some(setup) = self.setup.get().copied() else {
            fatal(format!(
                "Actor creation task {} finished before the actor was set up",
                task_spec.task_id()
            ));
        };

        let max_concurrency = if task_spec.is_asyncio_actor() {
            setup.fiber_max_concurrency
        } else {
            task_spec.max_actor_concurrency()
        };
        let executors = ActorExecutors::create(
            task_spec.is_asyncio_actor(),
            task_spec.concurrency_groups(),
            max_concurrency,
            self.initialize_thread.clone(),
        )
        .unwrap_or_else(|e| fatal(format!("Failed to create actor executors: {e}")));

        {
            let mut slot = self.executors.write();
            if slot.is_some() {
                fatal("Concurrency group manager already created for this actor");
            }
            *slot = Some(executors);
        }
        if let Some(actor_id) = task_spec.actor_id() {
            self.concurrency_groups_cache
                .insert(actor_id, task_spec.concurrency_groups().to_vec());
        }

        let notified = self.creation_notifier.actor_creation_task_done().await;
        if !notified.is_ok() {
            fatal(format!("Failed to report actor creation: {notified}"));
        }

        if status.is_creation_task_error() {
            warn!(
                task_id = %task_spec.task_id(),
                error = %status,
                "Actor creation task finished with error"
            );
        } else {
            let repr_name = self.actor_repr_name.read().clone();
            if !repr_name.is_empty() {
                reply.actor_repr_name = Some(repr_name);
            }
            info!(
                task_id = %task_spec.task_id(),
                actor_id = ?task_spec.actor_id(),
                asyncio = task_spec.is_asyncio_actor(),
                max_concurrency,
                "Actor creation task finished"
            );
        }
    }
}

/// Combine the application error and the handler status into one message
fn compose_execution_error(application_error: &str, status: &Status) -> Option<String> {
    let mut message = String::new();
    if !application_error.is_empty() {
        message.push_str("User exception:\n");
        message.push_str(application_error);
    }
    if !status.is_ok() {
        if !message.is_empty() {
            message.push_str("\n\n");
        }
        message.push_str("System error:\n");
        message.push_str(&status.to_string());
    }
    (!message.is_empty()).then_some(message)
}

fn check_dynamic_returns(task_spec: &TaskSpecification, produced: usize) {
    if task_spec.returns_dynamic() {
        let expected = task_spec.dynamic_return_ids().len();
        if expected > 0 && produced != expected {
            fatal(format!(
                "Task {} reserved {expected} dynamic returns but produced {produced}",
                task_spec.task_id()
            ));
        }
    } else if produced != 0 {
        fatal(format!(
            "Task {} does not return dynamically but produced {produced} dynamic returns",
            task_spec.task_id()
        ));
    }
}

/// Accept and cancel paths of one task; owns its reply until it is sent
pub(crate) struct TaskOutcome {
    state: Arc<ActorState>,
    reply: PushTaskReply,
    resource_ids: Option<ResourceMappingType>,
}

impl TaskOutcome {
    async fn run(self, task_spec: TaskSpecification, send_reply: SendReplyCallback) {
        let TaskOutcome {
            state,
            mut reply,
            resource_ids,
        } = self;

        if task_spec.skip_execution() {
            debug!(task_id = %task_spec.task_id(), "Skipping execution");
            send_reply(Status::ok(), reply);
            return;
        }

        let mut timer = OperationTimer::new("execute_task");
        timer.add_field("task_id", task_spec.task_id().to_string());
        timer.add_field("task_type", task_spec.task_type().to_string());
        timer.add_field("name", task_spec.name());

        let mut outputs = TaskExecutionOutputs::default();
        let status = state
            .task_handler
            .execute(&task_spec, resource_ids, &mut outputs)
            .await;

        reply.borrowed_refs = std::mem::take(&mut outputs.borrowed_refs);
        reply.is_retryable_error = outputs.is_retryable_error;
        reply.is_application_error = !outputs.application_error.is_empty();
        reply.task_execution_error = compose_execution_error(&outputs.application_error, &status);
        reply.streaming_generator_return_ids = outputs
            .streaming_generator_returns
            .iter()
            .map(|(object_id, is_plasma_object)| StreamingGeneratorReturnId {
                object_id: *object_id,
                is_plasma_object: *is_plasma_object,
            })
            .collect();

        let objects_valid = outputs.return_objects.len() == task_spec.num_returns()
            && outputs.return_objects.iter().all(|(_, value)| value.is_some());

        if objects_valid {
            check_dynamic_returns(&task_spec, outputs.dynamic_return_objects.len());
            for (object_id, value) in &outputs.dynamic_return_objects {
                reply
                    .dynamic_return_objects
                    .push(ReturnObject::serialize(*object_id, value));
            }
            for (object_id, value) in &outputs.return_objects {
                if let Some(value) = value {
                    reply
                        .return_objects
                        .push(ReturnObject::serialize(*object_id, value));
                }
            }

            if task_spec.is_actor_creation_task() {
                state
                    .finish_actor_creation(&task_spec, &status, &mut reply)
                    .await;
            }
        }

        if status.is_ok() {
            timer.finish();
        } else {
            timer.finish_with_result::<()>(Err(&status));
        }

        if status.should_exit_worker() {
            reply.worker_exiting = true;
            if objects_valid {
                // The caller still needs the objects this task produced.
                send_reply(Status::ok(), reply);
            } else {
                send_reply(status, reply);
            }
        } else {
            if !objects_valid {
                fatal(format!(
                    "Task {} declared {} returns but produced {} ({} missing values)",
                    task_spec.task_id(),
                    task_spec.num_returns(),
                    outputs.return_objects.len(),
                    outputs
                        .return_objects
                        .iter()
                        .filter(|(_, value)| value.is_none())
                        .count()
                ));
            }
            send_reply(status, reply);
        }
    }
}

impl TaskOutcomeHandler for TaskOutcome {
    fn accept(
        self: Box<Self>,
        task_spec: TaskSpecification,
        send_reply: SendReplyCallback,
    ) -> BoxFuture<'static, ()> {
        Box::pin((*self).run(task_spec, send_reply))
    }

    fn cancel(
        self: Box<Self>,
        task_spec: TaskSpecification,
        status: Status,
        send_reply: SendReplyCallback,
    ) {
        let mut reply = self.reply;
        if task_spec.is_actor_task() {
            debug!(task_id = %task_spec.task_id(), %status, "Actor task cancelled");
        } else {
            reply.was_cancelled_before_running = true;
            debug!(task_id = %task_spec.task_id(), %status, "Task cancelled before running");
        }
        send_reply(status, reply);
    }
}

/// Collaborators supplied by [`TaskReceiver::init`]
struct Wiring {
    client_pool: Arc<dyn ClientPool>,
    address: WorkerAddress,
    waiter: Arc<dyn DependencyWaiter>,
    normal_queue: NormalSchedulingQueue,
}

/// Accepts tasks pushed to this worker and hands them to the right queue.
///
/// All methods run on one driver (see [`crate::ReceiverService`]); the accept
/// paths themselves run on executor threads.
pub struct TaskReceiver {
    config: TaskReceiverConfig,
    state: Arc<ActorState>,
    main_executor: Arc<BoundedExecutor>,
    resolver: DependencyResolver,
    wiring: Option<Wiring>,
    actor_queues: HashMap<WorkerId, ActorQueue>,
    stopped: bool,
}

impl TaskReceiver {
    /// Create the receiver and start the main task thread
    pub fn new(
        config: TaskReceiverConfig,
        task_handler: Arc<dyn TaskHandler>,
        creation_notifier: Arc<dyn ActorCreationNotifier>,
        initialize_thread: Option<InitializeThreadCallback>,
    ) -> Result<Self, ReceiverError> {
        let main_executor = Arc::new(BoundedExecutor::create(
            &config.main_thread_name,
            1,
            initialize_thread.clone(),
        )?);
        let resolver = DependencyResolver::new("dependency-wait")?;

        Ok(Self {
            config,
            state: Arc::new(ActorState {
                task_handler,
                creation_notifier,
                initialize_thread,
                setup: OnceCell::new(),
                current_actor_id: RwLock::new(None),
                executors: RwLock::new(None),
                concurrency_groups_cache: DashMap::new(),
                actor_repr_name: RwLock::new(String::new()),
            }),
            main_executor,
            resolver,
            wiring: None,
            actor_queues: HashMap::new(),
            stopped: false,
        })
    }

    /// Wire the collaborators; required before any task is handled
    pub fn init(
        &mut self,
        client_pool: Arc<dyn ClientPool>,
        address: WorkerAddress,
        waiter: Arc<dyn DependencyWaiter>,
    ) {
        info!(address = %address, "Task receiver initialized");
        let normal_queue = NormalSchedulingQueue::new(self.main_executor.clone(), waiter.clone());
        self.wiring = Some(Wiring {
            client_pool,
            address,
            waiter,
            normal_queue,
        });
    }

    fn wiring(&mut self) -> &mut Wiring {
        match self.wiring.as_mut() {
            Some(wiring) => wiring,
            None => fatal("TaskReceiver::init must be called before handling tasks"),
        }
    }

    pub fn address(&self) -> Option<&WorkerAddress> {
        self.wiring.as_ref().map(|w| &w.address)
    }

    /// Take one inbound task. `send_reply` is invoked exactly once, possibly on
    /// another thread.
    pub fn handle_task(&mut self, request: PushTaskRequest, send_reply: SendReplyCallback) {
        if self.wiring.is_none() {
            fatal("TaskReceiver::init must be called before handling tasks");
        }

        let resource_ids = (!request.task_spec.is_actor_task()).then(|| request.resource_ids());
        let PushTaskRequest {
            task_spec,
            sequence_number,
            client_processed_up_to,
            ..
        } = request;

        if task_spec.is_actor_creation_task() {
            let Some(actor_id) = task_spec.actor_creation_id() else {
                fatal(format!(
                    "Actor creation task {} carries no actor id",
                    task_spec.task_id()
                ));
            };
            if self.current_actor_id() == Some(actor_id) {
                info!(
                    task_id = %task_spec.task_id(),
                    actor_id = %actor_id,
                    "Ignoring duplicate actor creation task"
                );
                send_reply(Status::ok(), PushTaskReply::default());
                return;
            }
            *self.state.current_actor_id.write() = Some(actor_id);
            self.setup_actor(
                task_spec.is_asyncio_actor(),
                task_spec.max_actor_concurrency(),
                task_spec.execute_out_of_order(),
            );
        }

        let outcome = Box::new(TaskOutcome {
            state: self.state.clone(),
            reply: PushTaskReply::default(),
            resource_ids,
        });

        if task_spec.is_actor_task() {
            let caller = task_spec.caller_worker_id();
            if !self.actor_queues.contains_key(&caller) {
                let mut queue = self.new_actor_queue(&task_spec);
                debug!(caller = %caller, "Created actor scheduling queue");
                if self.stopped {
                    queue.stop();
                }
                self.actor_queues.insert(caller, queue);
            }
            if let Some(queue) = self.actor_queues.get_mut(&caller) {
                queue.add(
                    sequence_number,
                    client_processed_up_to,
                    outcome,
                    send_reply,
                    task_spec,
                );
            }
        } else {
            debug!(task_id = %task_spec.task_id(), "Adding task to normal scheduling task queue");
            self.wiring().normal_queue.add(
                sequence_number,
                client_processed_up_to,
                outcome,
                send_reply,
                task_spec,
            );
        }
    }

    fn new_actor_queue(&mut self, task_spec: &TaskSpecification) -> ActorQueue {
        let Some(actor_id) = task_spec.actor_id() else {
            fatal(format!("Actor task {} carries no actor id", task_spec.task_id()));
        };
        if !self.state.concurrency_groups_cache.contains_key(&actor_id) {
            fatal(format!(
                "Actor task {} arrived before actor {actor_id} finished creation",
                task_spec.task_id()
            ));
        }
        let Some(setup) = self.state.setup.get().copied() else {
            fatal("Actor task arrived before the actor was set up");
        };
        let Some(executors) = self.state.executors.read().clone() else {
            fatal(format!("Actor {actor_id} has no executors"));
        };

        let reorder_wait = self.config.reorder_wait();
        let waiter = self.wiring().waiter.clone();
        ActorQueue::new(
            setup.execute_out_of_order,
            executors,
            waiter,
            self.resolver.clone(),
            reorder_wait,
        )
    }

    /// Release normal tasks to the main task thread
    pub fn run_normal_tasks_from_queue(&mut self) {
        let queue = &mut self.wiring().normal_queue;
        if queue.task_queue_empty() {
            return;
        }
        queue.schedule_requests();
    }

    /// Cancel an actor task that has not started. `false` if the caller has no
    /// queue yet or the task is unknown or already running.
    pub fn cancel_queued_actor_task(&mut self, caller_worker_id: WorkerId, task_id: TaskId) -> bool {
        match self.actor_queues.get_mut(&caller_worker_id) {
            Some(queue) => queue.cancel_task_if_found(task_id),
            None => false,
        }
    }

    pub fn cancel_queued_normal_task(&mut self, task_id: TaskId) -> bool {
        self.wiring().normal_queue.cancel_task_if_found(task_id)
    }

    /// Record the actor's configuration. Panics if called twice.
    pub fn setup_actor(&self, is_asyncio: bool, fiber_max_concurrency: usize, execute_out_of_order: bool) {
        let setup = ActorSetup {
            is_asyncio,
            fiber_max_concurrency,
            execute_out_of_order,
        };
        if self.state.setup.set(setup).is_err() {
            fatal("SetupActor should only be called at most once");
        }
        debug!(?setup, "Actor set up");
    }

    pub fn actor_setup(&self) -> Option<ActorSetup> {
        self.state.setup.get().copied()
    }

    /// Stop every actor queue and release the callers' connections
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.resolver.stop();
        for (caller, queue) in self.actor_queues.iter_mut() {
            queue.stop();
            if let Some(wiring) = self.wiring.as_ref() {
                wiring.client_pool.disconnect(caller);
            }
        }
        info!(queues = self.actor_queues.len(), "Task receiver stopped");
    }

    /// Stop everything, including the main task thread, and wait for running
    /// tasks to finish. Blocks.
    pub fn shutdown(mut self) {
        self.stop();
        if let Some(wiring) = self.wiring.as_mut() {
            wiring.normal_queue.stop();
        }
        self.main_executor.stop();

        let executors = self.state.executors.read().clone();
        if let Some(executors) = executors {
            executors.stop();
            executors.join();
        }
        self.main_executor.join();
        self.resolver.join();
    }

    pub fn set_actor_repr_name(&self, name: impl Into<String>) {
        *self.state.actor_repr_name.write() = name.into();
    }

    pub fn current_actor_id(&self) -> Option<ActorId> {
        *self.state.current_actor_id.read()
    }

    pub fn concurrency_groups(&self, actor_id: &ActorId) -> Option<Vec<ConcurrencyGroup>> {
        self.state
            .concurrency_groups_cache
            .get(actor_id)
            .map(|groups| groups.clone())
    }

    pub fn actor_queue_count(&self) -> usize {
        self.actor_queues.len()
    }

    /// Notified when an actor task's dependencies resolved; the driver answers
    /// with [`TaskReceiver::schedule_actor_tasks`]
    pub fn dependencies_ready(&self) -> Arc<Notify> {
        self.resolver.ready()
    }

    /// Release whatever the actor queues allow now
    pub fn schedule_actor_tasks(&mut self) {
        for queue in self.actor_queues.values_mut() {
            queue.schedule_requests();
        }
    }

    /// Periodic work: reorder timeouts on the actor queues, then normal tasks
    pub fn tick(&mut self) {
        self.schedule_actor_tasks();
        if self.wiring.is_some() {
            self.run_normal_tasks_from_queue();
        }
    }

    pub fn config(&self) -> &TaskReceiverConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispatch_core::{ObjectId, ReturnValue, StatusCode, TaskType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Script = dyn Fn(&TaskSpecification, &mut TaskExecutionOutputs) -> Status + Send + Sync;

    struct ScriptedHandler {
        script: Box<Script>,
    }

    #[async_trait]
    impl TaskHandler for ScriptedHandler {
        async fn execute(
            &self,
            task_spec: &TaskSpecification,
            _resource_ids: Option<ResourceMappingType>,
            outputs: &mut TaskExecutionOutputs,
        ) -> Status {
            (self.script)(task_spec, outputs)
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActorCreationNotifier for CountingNotifier {
        async fn actor_creation_task_done(&self) -> Status {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Status::ok()
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl ActorCreationNotifier for FailingNotifier {
        async fn actor_creation_task_done(&self) -> Status {
            Status::io_error("fleet manager unreachable")
        }
    }

    fn returns(outputs: &mut TaskExecutionOutputs, count: usize) {
        for i in 0..count {
            outputs
                .return_objects
                .push((ObjectId::new(), Some(Arc::new(ReturnValue::inline(vec![i as u8])))));
        }
    }

    fn state_with(
        script: impl Fn(&TaskSpecification, &mut TaskExecutionOutputs) -> Status + Send + Sync + 'static,
        notifier: Arc<dyn ActorCreationNotifier>,
    ) -> Arc<ActorState> {
        Arc::new(ActorState {
            task_handler: Arc::new(ScriptedHandler {
                script: Box::new(script),
            }),
            creation_notifier: notifier,
            initialize_thread: None,
            setup: OnceCell::new(),
            current_actor_id: RwLock::new(None),
            executors: RwLock::new(None),
            concurrency_groups_cache: DashMap::new(),
            actor_repr_name: RwLock::new(String::new()),
        })
    }

    async fn run(state: Arc<ActorState>, task_spec: TaskSpecification) -> (Status, PushTaskReply) {
        let captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let outcome = TaskOutcome {
            state,
            reply: PushTaskReply::default(),
            resource_ids: None,
        };
        outcome
            .run(
                task_spec,
                Box::new(move |status, reply| {
                    *sink.lock().unwrap() = Some((status, reply));
                }),
            )
            .await;
        let result = captured.lock().unwrap().take();
        result.expect("reply was not sent")
    }

    #[test]
    fn test_compose_execution_error() {
        assert_eq!(compose_execution_error("", &Status::ok()), None);
        assert_eq!(
            compose_execution_error("boom", &Status::ok()).as_deref(),
            Some("User exception:\nboom")
        );
        assert_eq!(
            compose_execution_error("", &Status::io_error("disk")).as_deref(),
            Some("System error:\nIOError: disk")
        );
        assert_eq!(
            compose_execution_error("boom", &Status::io_error("disk")).as_deref(),
            Some("User exception:\nboom\n\nSystem error:\nIOError: disk")
        );
    }

    #[tokio::test]
    async fn test_valid_results_are_serialized_in_order() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 2);
                outputs.application_error = "ValueError".to_string();
                outputs.is_retryable_error = true;
                outputs.streaming_generator_returns.push((ObjectId::new(), true));
                Status::ok()
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal).num_returns(2).build();

        let (status, reply) = run(state, spec).await;
        assert!(status.is_ok());
        assert_eq!(reply.return_objects.len(), 2);
        assert_eq!(reply.return_objects[0].data, vec![0]);
        assert!(reply.is_application_error);
        assert!(reply.is_retryable_error);
        assert_eq!(reply.streaming_generator_return_ids.len(), 1);
        assert!(reply.streaming_generator_return_ids[0].is_plasma_object);
        assert_eq!(
            reply.task_execution_error.as_deref(),
            Some("User exception:\nValueError")
        );
        assert!(!reply.worker_exiting);
    }

    #[tokio::test]
    async fn test_skip_execution_replies_without_running() {
        let state = state_with(|_, _| panic!("must not run"), Arc::new(CountingNotifier::default()));
        let spec = TaskSpecification::builder(TaskType::Normal).skip_execution().build();

        let (status, reply) = run(state, spec).await;
        assert!(status.is_ok());
        assert_eq!(reply, PushTaskReply::default());
    }

    #[tokio::test]
    async fn test_fixed_dynamic_returns_match_reservation() {
        let state = state_with(
            |spec, outputs| {
                returns(outputs, 1);
                for id in spec.dynamic_return_ids() {
                    outputs
                        .dynamic_return_objects
                        .push((*id, Arc::new(ReturnValue::in_shared_store(4))));
                }
                Status::ok()
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal)
            .dynamic_returns(vec![ObjectId::new(), ObjectId::new()])
            .build();

        let (status, reply) = run(state, spec).await;
        assert!(status.is_ok());
        assert_eq!(reply.dynamic_return_objects.len(), 2);
        assert!(reply.dynamic_return_objects.iter().all(|r| r.in_plasma));
    }

    #[tokio::test]
    async fn test_open_dynamic_returns_accept_any_count() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                for _ in 0..3 {
                    outputs
                        .dynamic_return_objects
                        .push((ObjectId::new(), Arc::new(ReturnValue::inline(b"x".to_vec()))));
                }
                Status::ok()
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal)
            .dynamic_returns(Vec::new())
            .build();

        let (_, reply) = run(state, spec).await;
        assert_eq!(reply.dynamic_return_objects.len(), 3);
    }

    #[tokio::test]
    #[should_panic(expected = "reserved 2 dynamic returns but produced 3")]
    async fn test_dynamic_return_overflow_is_fatal() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                for _ in 0..3 {
                    outputs
                        .dynamic_return_objects
                        .push((ObjectId::new(), Arc::new(ReturnValue::inline(b"x".to_vec()))));
                }
                Status::ok()
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal)
            .dynamic_returns(vec![ObjectId::new(), ObjectId::new()])
            .build();
        run(state, spec).await;
    }

    #[tokio::test]
    #[should_panic(expected = "reserved 2 dynamic returns but produced 1")]
    async fn test_dynamic_return_shortfall_is_fatal() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                outputs
                    .dynamic_return_objects
                    .push((ObjectId::new(), Arc::new(ReturnValue::inline(b"x".to_vec()))));
                Status::ok()
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal)
            .dynamic_returns(vec![ObjectId::new(), ObjectId::new()])
            .build();
        run(state, spec).await;
    }

    #[tokio::test]
    #[should_panic(expected = "does not return dynamically")]
    async fn test_unexpected_dynamic_returns_are_fatal() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                outputs
                    .dynamic_return_objects
                    .push((ObjectId::new(), Arc::new(ReturnValue::inline(b"x".to_vec()))));
                Status::ok()
            },
            Arc::new(CountingNotifier::default()),
        );
        run(state, TaskSpecification::builder(TaskType::Normal).build()).await;
    }

    #[tokio::test]
    #[should_panic(expected = "declared 2 returns but produced 1")]
    async fn test_missing_return_without_exit_is_fatal() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                Status::ok()
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal).num_returns(2).build();
        run(state, spec).await;
    }

    #[tokio::test]
    async fn test_empty_return_slot_invalidates_results() {
        let state = state_with(
            |_, outputs| {
                outputs.return_objects.push((ObjectId::new(), None));
                Status::intentional_system_exit("max calls reached")
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal).build();

        let (status, reply) = run(state, spec).await;
        assert_eq!(status.code(), StatusCode::IntentionalSystemExit);
        assert!(reply.worker_exiting);
        assert!(reply.return_objects.is_empty());
    }

    #[tokio::test]
    async fn test_exit_with_valid_results_reports_ok() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                Status::intentional_system_exit("max calls reached")
            },
            Arc::new(CountingNotifier::default()),
        );
        let spec = TaskSpecification::builder(TaskType::Normal).build();

        let (status, reply) = run(state, spec).await;
        assert!(status.is_ok());
        assert!(reply.worker_exiting);
        assert_eq!(reply.return_objects.len(), 1);
        assert!(reply
            .task_execution_error
            .as_deref()
            .is_some_and(|e| e.starts_with("System error:\n")));
    }

    #[tokio::test]
    async fn test_creation_builds_executors_and_notifies() {
        let notifier = Arc::new(CountingNotifier::default());
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                Status::ok()
            },
            notifier.clone(),
        );
        state
            .setup
            .set(ActorSetup {
                is_asyncio: false,
                fiber_max_concurrency: 2,
                execute_out_of_order: false,
            })
            .unwrap();
        *state.actor_repr_name.write() = "Counter(7)".to_string();

        let actor_id = ActorId::new();
        let spec = TaskSpecification::builder(TaskType::ActorCreation)
            .actor(actor_id)
            .max_concurrency(2)
            .declare_concurrency_group(ConcurrencyGroup::new("io", 1))
            .build();

        let (status, reply) = run(state.clone(), spec).await;
        assert!(status.is_ok());
        assert_eq!(reply.actor_repr_name.as_deref(), Some("Counter(7)"));
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.concurrency_groups_cache.get(&actor_id).unwrap().len(), 1);

        let executors = state.executors.read().clone().unwrap();
        assert!(!executors.is_asyncio());
        executors.stop();
        executors.join();
    }

    #[tokio::test]
    async fn test_creation_error_omits_repr_name_and_exits() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                Status::creation_task_error("constructor raised")
            },
            Arc::new(CountingNotifier::default()),
        );
        state
            .setup
            .set(ActorSetup {
                is_asyncio: true,
                fiber_max_concurrency: 4,
                execute_out_of_order: false,
            })
            .unwrap();
        *state.actor_repr_name.write() = "Broken".to_string();

        let spec = TaskSpecification::builder(TaskType::ActorCreation)
            .actor(ActorId::new())
            .asyncio(true)
            .build();

        let (status, reply) = run(state.clone(), spec).await;
        assert!(status.is_ok());
        assert!(reply.worker_exiting);
        assert_eq!(reply.actor_repr_name, None);

        let executors = state.executors.read().clone().unwrap();
        assert!(executors.is_asyncio());
        executors.stop();
        executors.join();
    }

    #[tokio::test]
    #[should_panic(expected = "Failed to report actor creation")]
    async fn test_notifier_failure_is_fatal() {
        let state = state_with(
            |_, outputs| {
                returns(outputs, 1);
                Status::ok()
            },
            Arc::new(FailingNotifier),
        );
        state
            .setup
            .set(ActorSetup {
                is_asyncio: false,
                fiber_max_concurrency: 1,
                execute_out_of_order: false,
            })
            .unwrap();
        let spec = TaskSpecification::builder(TaskType::ActorCreation)
            .actor(ActorId::new())
            .build();
        run(state, spec).await;
    }

    #[test]
    fn test_cancel_reply_shape_depends_on_task_kind() {
        let state = state_with(|_, _| Status::ok(), Arc::new(CountingNotifier::default()));
        let captured = Arc::new(Mutex::new(Vec::new()));

        for task_type in [TaskType::Actor, TaskType::Normal] {
            let sink = captured.clone();
            let outcome = Box::new(TaskOutcome {
                state: state.clone(),
                reply: PushTaskReply::default(),
                resource_ids: None,
            });
            outcome.cancel(
                TaskSpecification::builder(task_type).build(),
                Status::scheduling_cancelled("cancelled"),
                Box::new(move |status, reply| sink.lock().unwrap().push((status, reply))),
            );
        }

        let captured = captured.lock().unwrap();
        assert!(captured[0].0.is_scheduling_cancelled());
        assert!(!captured[0].1.was_cancelled_before_running);
        assert!(captured[1].1.was_cancelled_before_running);
    }
}
