//! Worker-side task dispatch
//!
//! This crate receives tasks pushed to a worker, orders and gates them per caller,
//! runs them on the right executor and sends exactly one reply per task.
//!
//! # Architecture
//!
//! - **TaskReceiver**: entry point; duplicate creation detection, one-time actor
//!   setup, routing to queues
//! - **SchedulingQueue**: in-order and out-of-order actor queues, plus the normal
//!   task queue feeding the main task thread; ordered queues resolve a task's
//!   dependencies through a **DependencyResolver** before releasing it
//! - **ConcurrencyGroupManager**: per-actor executors, one per concurrency group
//! - **FiberState / BoundedExecutor**: cooperative and thread-pool execution
//! - **ReceiverService**: driver loop that owns the receiver and serialises access
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use transport::{ReceiverService, TaskReceiver, TaskReceiverConfig};
//! # use dispatch_core::*;
//! # async fn example(
//! #     handler: Arc<dyn TaskHandler>,
//! #     notifier: Arc<dyn ActorCreationNotifier>,
//! #     clients: Arc<dyn ClientPool>,
//! #     address: WorkerAddress,
//! #     request: PushTaskRequest,
//! # ) -> anyhow::Result<()> {
//! let mut receiver = TaskReceiver::new(TaskReceiverConfig::default(), handler, notifier, None)?;
//! receiver.init(clients, address, Arc::new(NoopDependencyWaiter));
//!
//! let shutdown = CancellationToken::new();
//! let (handle, driver) = ReceiverService::spawn(receiver, shutdown.clone());
//! let (status, reply) = handle.push_task(request).await?;
//!
//! shutdown.cancel();
//! driver.await?;
//! # Ok(())
//! # }
//! ```

pub mod concurrency_group;
pub mod config;
pub mod error;
pub mod executor;
pub mod receiver;
pub mod scheduling;
pub mod service;

pub use concurrency_group::{ActorExecutors, ConcurrencyGroupManager, DEFAULT_CONCURRENCY_GROUP};
pub use config::{load_config_file, TaskReceiverConfig};
pub use error::{ExecutorError, ReceiverError};
pub use executor::{BoundedExecutor, FiberState, GroupExecutor, Job};
pub use receiver::{ActorSetup, TaskReceiver};
pub use scheduling::{
    ActorQueue, ActorSchedulingQueue, DependencyResolver, InboundRequest, NormalSchedulingQueue,
    OutOfOrderActorSchedulingQueue, SchedulingQueue, SendReplyCallback, TaskOutcomeHandler,
};
pub use service::{ReceiverCommand, ReceiverService, TaskReceiverHandle};
