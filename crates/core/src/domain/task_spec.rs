//! Immutable description of one task instance

use super::{ActorId, ObjectId, TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of task, decides how the receiver routes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Stateless task, runs on the main task thread
    Normal,
    /// Constructs an actor; binds this worker to the actor
    ActorCreation,
    /// Method call on an actor already living in this worker
    Actor,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Normal => write!(f, "normal"),
            TaskType::ActorCreation => write!(f, "actor_creation"),
            TaskType::Actor => write!(f, "actor"),
        }
    }
}

/// Identifies the user function a task runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub module_name: String,
    pub class_name: String,
    pub function_name: String,
}

impl FunctionDescriptor {
    pub fn new(
        module_name: impl Into<String>,
        class_name: impl Into<String>,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            class_name: class_name.into(),
            function_name: function_name.into(),
        }
    }

    /// Descriptor for a free function (no class)
    pub fn function(module_name: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self::new(module_name, "", function_name)
    }
}

impl fmt::Display for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class_name.is_empty() {
            write!(f, "{}.{}", self.module_name, self.function_name)
        } else {
            write!(
                f,
                "{}.{}.{}",
                self.module_name, self.class_name, self.function_name
            )
        }
    }
}

/// Named execution lane declared by an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyGroup {
    pub name: String,
    pub max_concurrency: usize,
    /// Methods bound to this group without naming it at the call site
    pub function_descriptors: Vec<FunctionDescriptor>,
}

impl ConcurrencyGroup {
    pub fn new(name: impl Into<String>, max_concurrency: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrency,
            function_descriptors: Vec::new(),
        }
    }

    pub fn with_function(mut self, descriptor: FunctionDescriptor) -> Self {
        self.function_descriptors.push(descriptor);
        self
    }
}

/// Immutable description of one task instance.
///
/// Built once through [`TaskSpecBuilder`]; the only mutation allowed afterwards is
/// [`TaskSpecification::mark_skip_execution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpecification {
    task_id: TaskId,
    name: String,
    task_type: TaskType,
    function_descriptor: FunctionDescriptor,
    caller_worker_id: WorkerId,
    /// Creation id for creation tasks, target actor for actor tasks
    actor_id: Option<ActorId>,
    num_returns: usize,
    returns_dynamic: bool,
    dynamic_return_ids: Vec<ObjectId>,
    dependencies: Vec<ObjectId>,
    concurrency_group_name: String,
    concurrency_groups: Vec<ConcurrencyGroup>,
    max_actor_concurrency: usize,
    execute_out_of_order: bool,
    is_asyncio_actor: bool,
    #[serde(default)]
    skip_execution: bool,
}

impl TaskSpecification {
    pub fn builder(task_type: TaskType) -> TaskSpecBuilder {
        TaskSpecBuilder::new(task_type)
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn is_normal_task(&self) -> bool {
        self.task_type == TaskType::Normal
    }

    pub fn is_actor_creation_task(&self) -> bool {
        self.task_type == TaskType::ActorCreation
    }

    pub fn is_actor_task(&self) -> bool {
        self.task_type == TaskType::Actor
    }

    pub fn function_descriptor(&self) -> &FunctionDescriptor {
        &self.function_descriptor
    }

    pub fn caller_worker_id(&self) -> WorkerId {
        self.caller_worker_id
    }

    /// Actor this task creates; `None` unless this is a creation task
    pub fn actor_creation_id(&self) -> Option<ActorId> {
        if self.is_actor_creation_task() {
            self.actor_id
        } else {
            None
        }
    }

    /// Actor this task belongs to (creation or method call)
    pub fn actor_id(&self) -> Option<ActorId> {
        self.actor_id
    }

    pub fn num_returns(&self) -> usize {
        self.num_returns
    }

    pub fn returns_dynamic(&self) -> bool {
        self.returns_dynamic
    }

    /// Ids reserved up front for a fixed number of dynamic returns; empty otherwise
    pub fn dynamic_return_ids(&self) -> &[ObjectId] {
        &self.dynamic_return_ids
    }

    pub fn dependencies(&self) -> &[ObjectId] {
        &self.dependencies
    }

    pub fn concurrency_group_name(&self) -> &str {
        &self.concurrency_group_name
    }

    pub fn concurrency_groups(&self) -> &[ConcurrencyGroup] {
        &self.concurrency_groups
    }

    pub fn max_actor_concurrency(&self) -> usize {
        self.max_actor_concurrency
    }

    pub fn execute_out_of_order(&self) -> bool {
        self.execute_out_of_order
    }

    pub fn is_asyncio_actor(&self) -> bool {
        self.is_asyncio_actor
    }

    pub fn skip_execution(&self) -> bool {
        self.skip_execution
    }

    /// Flag the task so the accept path replies without running it
    pub fn mark_skip_execution(&mut self) {
        self.skip_execution = true;
    }
}

impl fmt::Display for TaskSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} task {} ({})",
            self.task_type, self.task_id, self.function_descriptor
        )
    }
}

/// Builder for [`TaskSpecification`]
#[derive(Debug, Clone)]
pub struct TaskSpecBuilder {
    spec: TaskSpecification,
}

impl TaskSpecBuilder {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            spec: TaskSpecification {
                task_id: TaskId::new(),
                name: String::new(),
                task_type,
                function_descriptor: FunctionDescriptor::default(),
                caller_worker_id: WorkerId::nil(),
                actor_id: None,
                num_returns: 1,
                returns_dynamic: false,
                dynamic_return_ids: Vec::new(),
                dependencies: Vec::new(),
                concurrency_group_name: String::new(),
                concurrency_groups: Vec::new(),
                max_actor_concurrency: 1,
                execute_out_of_order: false,
                is_asyncio_actor: false,
                skip_execution: false,
            },
        }
    }

    pub fn task_id(mut self, task_id: TaskId) -> Self {
        self.spec.task_id = task_id;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.spec.name = name.into();
        self
    }

    pub fn function(mut self, descriptor: FunctionDescriptor) -> Self {
        self.spec.function_descriptor = descriptor;
        self
    }

    pub fn caller(mut self, caller_worker_id: WorkerId) -> Self {
        self.spec.caller_worker_id = caller_worker_id;
        self
    }

    pub fn actor(mut self, actor_id: ActorId) -> Self {
        self.spec.actor_id = Some(actor_id);
        self
    }

    pub fn num_returns(mut self, num_returns: usize) -> Self {
        self.spec.num_returns = num_returns;
        self
    }

    /// Declare dynamic returns; a non-empty `reserved` list fixes their count
    pub fn dynamic_returns(mut self, reserved: Vec<ObjectId>) -> Self {
        self.spec.returns_dynamic = true;
        self.spec.dynamic_return_ids = reserved;
        self
    }

    pub fn dependency(mut self, object_id: ObjectId) -> Self {
        self.spec.dependencies.push(object_id);
        self
    }

    pub fn concurrency_group(mut self, name: impl Into<String>) -> Self {
        self.spec.concurrency_group_name = name.into();
        self
    }

    pub fn declare_concurrency_group(mut self, group: ConcurrencyGroup) -> Self {
        self.spec.concurrency_groups.push(group);
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.spec.max_actor_concurrency = max_concurrency;
        self
    }

    pub fn out_of_order(mut self, execute_out_of_order: bool) -> Self {
        self.spec.execute_out_of_order = execute_out_of_order;
        self
    }

    pub fn asyncio(mut self, is_asyncio_actor: bool) -> Self {
        self.spec.is_asyncio_actor = is_asyncio_actor;
        self
    }

    pub fn skip_execution(mut self) -> Self {
        self.spec.skip_execution = true;
        self
    }

    pub fn build(self) -> TaskSpecification {
        self.spec
    }
}
