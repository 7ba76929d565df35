//! Collaborator doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dispatch_core::{
    ActorCreationNotifier, ActorId, ClientPool, ConcurrencyGroup, DependencyWaiter, ObjectId,
    PushTaskReply, PushTaskRequest, ResourceMappingType, ReturnValue, Status, TaskExecutionOutputs,
    TaskHandler, TaskId, TaskSpecification, TaskType, WorkerAddress, WorkerId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::sync::Semaphore;
use transport::{SendReplyCallback, TaskReceiver, TaskReceiverConfig};

/// Task handler driven by the task name:
/// `exit` asks the worker to exit, `raise` reports an application error,
/// anything else succeeds. Every call fills the declared returns.
#[derive(Default)]
pub struct TestHandler {
    pub executed: Mutex<Vec<TaskId>>,
    pub threads: Mutex<Vec<String>>,
    pub resources: Mutex<Vec<Option<ResourceMappingType>>>,
    pub delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl TestHandler {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.executed.lock().len()
    }

    pub fn executed(&self) -> Vec<TaskId> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl TaskHandler for TestHandler {
    async fn execute(
        &self,
        task_spec: &TaskSpecification,
        resource_ids: Option<ResourceMappingType>,
        outputs: &mut TaskExecutionOutputs,
    ) -> Status {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.executed.lock().push(task_spec.task_id());
        self.threads.lock().push(
            std::thread::current()
                .name()
                .unwrap_or_default()
                .to_string(),
        );
        self.resources.lock().push(resource_ids);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        for _ in 0..task_spec.num_returns() {
            outputs.return_objects.push((
                ObjectId::new(),
                Some(Arc::new(ReturnValue::inline(task_spec.name().as_bytes().to_vec()))),
            ));
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match task_spec.name() {
            "exit" => Status::intentional_system_exit("max calls reached"),
            "raise" => {
                outputs.application_error = "ValueError: bad input".to_string();
                Status::ok()
            }
            _ => Status::ok(),
        }
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ActorCreationNotifier for CountingNotifier {
    async fn actor_creation_task_done(&self) -> Status {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Status::ok()
    }
}

#[derive(Default)]
pub struct RecordingClientPool {
    pub disconnected: Mutex<Vec<WorkerId>>,
}

impl ClientPool for RecordingClientPool {
    fn disconnect(&self, worker_id: &WorkerId) {
        self.disconnected.lock().push(*worker_id);
    }
}

/// Dependency waiter that blocks until the test opens the gate
pub struct GateWaiter {
    gate: Semaphore,
    pub waited_on: Mutex<Vec<ObjectId>>,
}

impl GateWaiter {
    pub fn closed() -> Self {
        Self {
            gate: Semaphore::new(0),
            waited_on: Mutex::new(Vec::new()),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl DependencyWaiter for GateWaiter {
    async fn wait(&self, dependencies: &[ObjectId]) {
        self.waited_on.lock().extend_from_slice(dependencies);
        let _ = self.gate.acquire().await;
    }
}

/// Collects replies from any thread
pub struct ReplySink {
    sender: mpsc::Sender<(TaskId, Status, PushTaskReply)>,
    receiver: mpsc::Receiver<(TaskId, Status, PushTaskReply)>,
}

impl ReplySink {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    pub fn callback(&self, task_id: TaskId) -> SendReplyCallback {
        let sender = self.sender.clone();
        Box::new(move |status, reply| {
            let _ = sender.send((task_id, status, reply));
        })
    }

    pub fn next(&self) -> (TaskId, Status, PushTaskReply) {
        self.receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("no reply within 5s")
    }

    pub fn assert_quiet(&self) {
        assert!(
            self.receiver
                .recv_timeout(Duration::from_millis(100))
                .is_err(),
            "unexpected reply"
        );
    }
}

pub struct Fixture {
    pub receiver: TaskReceiver,
    pub handler: Arc<TestHandler>,
    pub notifier: Arc<CountingNotifier>,
    pub clients: Arc<RecordingClientPool>,
    pub replies: ReplySink,
    pub actor_id: ActorId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(TestHandler::default(), TaskReceiverConfig::default())
    }

    pub fn with(handler: TestHandler, config: TaskReceiverConfig) -> Self {
        Self::with_waiter(handler, config, Arc::new(dispatch_core::NoopDependencyWaiter))
    }

    pub fn with_waiter(
        handler: TestHandler,
        config: TaskReceiverConfig,
        waiter: Arc<dyn DependencyWaiter>,
    ) -> Self {
        let handler = Arc::new(handler);
        let notifier = Arc::new(CountingNotifier::default());
        let clients = Arc::new(RecordingClientPool::default());
        let mut receiver =
            TaskReceiver::new(config, handler.clone(), notifier.clone(), None).unwrap();
        receiver.init(clients.clone(), address(), waiter);
        Self {
            receiver,
            handler,
            notifier,
            clients,
            replies: ReplySink::new(),
            actor_id: ActorId::new(),
        }
    }

    pub fn push(&mut self, request: PushTaskRequest) -> TaskId {
        let task_id = request.task_spec.task_id();
        let callback = self.replies.callback(task_id);
        self.receiver.handle_task(request, callback);
        self.receiver.run_normal_tasks_from_queue();
        task_id
    }

    /// Block until some dependency wait finished, then let the actor queues release
    pub fn resolve_dependencies(&mut self) {
        futures::executor::block_on(self.receiver.dependencies_ready().notified());
        self.receiver.schedule_actor_tasks();
    }

    /// Create the actor and wait for its creation reply
    pub fn create_actor(&mut self, spec: TaskSpecification) -> (Status, PushTaskReply) {
        let task_id = self.push(PushTaskRequest::new(spec));
        let (id, status, reply) = self.replies.next();
        assert_eq!(id, task_id);
        (status, reply)
    }

    pub fn creation_spec(&self) -> CreationSpec {
        CreationSpec::new(self.actor_id)
    }

    pub fn actor_task(&self, caller: WorkerId) -> TaskSpecification {
        TaskSpecification::builder(TaskType::Actor)
            .actor(self.actor_id)
            .caller(caller)
            .build()
    }
}

pub fn address() -> WorkerAddress {
    WorkerAddress {
        worker_id: WorkerId::new(),
        ip_address: "127.0.0.1".to_string(),
        port: 10001,
    }
}

/// Creation task with the knobs the tests vary
pub struct CreationSpec {
    actor_id: ActorId,
    asyncio: bool,
    out_of_order: bool,
    max_concurrency: usize,
    groups: Vec<ConcurrencyGroup>,
}

impl CreationSpec {
    pub fn new(actor_id: ActorId) -> Self {
        Self {
            actor_id,
            asyncio: false,
            out_of_order: false,
            max_concurrency: 1,
            groups: Vec::new(),
        }
    }

    pub fn asyncio(mut self) -> Self {
        self.asyncio = true;
        self
    }

    pub fn out_of_order(mut self) -> Self {
        self.out_of_order = true;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn group(mut self, group: ConcurrencyGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn build(self) -> TaskSpecification {
        let mut builder = TaskSpecification::builder(TaskType::ActorCreation)
            .actor(self.actor_id)
            .asyncio(self.asyncio)
            .out_of_order(self.out_of_order)
            .max_concurrency(self.max_concurrency);
        for group in self.groups {
            builder = builder.declare_concurrency_group(group);
        }
        builder.build()
    }
}
