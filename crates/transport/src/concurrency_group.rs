//! Per-actor executors, one per declared concurrency group plus a default group

use crate::error::ExecutorError;
use crate::executor::{BoundedExecutor, FiberState, GroupExecutor, Job};
use dispatch_core::{ConcurrencyGroup, FunctionDescriptor, InitializeThreadCallback, TaskSpecification};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the group tasks fall into when they are not bound to a declared one
pub const DEFAULT_CONCURRENCY_GROUP: &str = "_default";

/// Owns the executors of one actor.
///
/// A task is resolved by explicit group name first, then by the function
/// descriptors each group declared, then falls back to the default executor.
pub struct ConcurrencyGroupManager<E: GroupExecutor> {
    name_to_executor: HashMap<String, Arc<E>>,
    functions_to_executor: HashMap<FunctionDescriptor, Arc<E>>,
    default_executor: Arc<E>,
}

impl<E: GroupExecutor> ConcurrencyGroupManager<E> {
    pub fn new(
        groups: &[ConcurrencyGroup],
        default_max_concurrency: usize,
        initialize_thread: Option<InitializeThreadCallback>,
    ) -> Result<Self, ExecutorError> {
        let mut name_to_executor = HashMap::with_capacity(groups.len());
        let mut functions_to_executor = HashMap::new();

        for group in groups {
            let executor = Arc::new(E::create(
                &group.name,
                group.max_concurrency,
                initialize_thread.clone(),
            )?);
            for descriptor in &group.function_descriptors {
                functions_to_executor.insert(descriptor.clone(), executor.clone());
            }
            name_to_executor.insert(group.name.clone(), executor);
        }

        let default_executor = Arc::new(E::create(
            DEFAULT_CONCURRENCY_GROUP,
            default_max_concurrency.max(1),
            initialize_thread,
        )?);

        info!(
            groups = groups.len(),
            default_max_concurrency = default_executor.max_concurrency(),
            "Concurrency group manager created"
        );

        Ok(Self {
            name_to_executor,
            functions_to_executor,
            default_executor,
        })
    }

    /// Executor for a task; `None` only when `group_name` names an undeclared group
    pub fn get_executor(
        &self,
        group_name: &str,
        function_descriptor: &FunctionDescriptor,
    ) -> Option<Arc<E>> {
        if !group_name.is_empty() {
            return self.name_to_executor.get(group_name).cloned();
        }
        if let Some(executor) = self.functions_to_executor.get(function_descriptor) {
            return Some(executor.clone());
        }
        Some(self.default_executor.clone())
    }

    pub fn get_default_executor(&self) -> Arc<E> {
        self.default_executor.clone()
    }

    pub fn has_group(&self, group_name: &str) -> bool {
        self.name_to_executor.contains_key(group_name)
    }

    /// Stop every executor; posted jobs still run
    pub fn stop(&self) {
        for executor in self.all_executors() {
            executor.stop();
        }
    }

    pub fn join(&self) {
        for executor in self.all_executors() {
            executor.join();
        }
    }

    fn all_executors(&self) -> impl Iterator<Item = &Arc<E>> {
        self.name_to_executor
            .values()
            .chain(std::iter::once(&self.default_executor))
    }
}

/// The executor strategy of one actor, fixed at creation time
#[derive(Clone)]
pub enum ActorExecutors {
    /// Asynchronous actor: tasks interleave cooperatively per group
    Fiber(Arc<ConcurrencyGroupManager<FiberState>>),
    /// Synchronous actor: tasks run in parallel on bounded pools
    Pool(Arc<ConcurrencyGroupManager<BoundedExecutor>>),
}

impl ActorExecutors {
    pub fn create(
        is_asyncio: bool,
        groups: &[ConcurrencyGroup],
        max_concurrency: usize,
        initialize_thread: Option<InitializeThreadCallback>,
    ) -> Result<Self, ExecutorError> {
        Ok(if is_asyncio {
            ActorExecutors::Fiber(Arc::new(ConcurrencyGroupManager::new(
                groups,
                max_concurrency,
                initialize_thread,
            )?))
        } else {
            ActorExecutors::Pool(Arc::new(ConcurrencyGroupManager::new(
                groups,
                max_concurrency,
                initialize_thread,
            )?))
        })
    }

    /// Post `job` on the executor `task_spec` resolves to
    pub fn post(&self, task_spec: &TaskSpecification, job: Job) -> Result<(), ExecutorError> {
        let group = task_spec.concurrency_group_name();
        let descriptor = task_spec.function_descriptor();
        debug!(task_id = %task_spec.task_id(), group, "Posting task to concurrency group");

        match self {
            ActorExecutors::Fiber(manager) => manager
                .get_executor(group, descriptor)
                .ok_or_else(|| ExecutorError::UnknownGroup(group.to_string()))?
                .post(job),
            ActorExecutors::Pool(manager) => manager
                .get_executor(group, descriptor)
                .ok_or_else(|| ExecutorError::UnknownGroup(group.to_string()))?
                .post(job),
        }
    }

    pub fn is_asyncio(&self) -> bool {
        matches!(self, ActorExecutors::Fiber(_))
    }

    pub fn stop(&self) {
        match self {
            ActorExecutors::Fiber(manager) => manager.stop(),
            ActorExecutors::Pool(manager) => manager.stop(),
        }
    }

    pub fn join(&self) {
        match self {
            ActorExecutors::Fiber(manager) => manager.join(),
            ActorExecutors::Pool(manager) => manager.join(),
        }
    }
}
