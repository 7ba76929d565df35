//! Driver loop owning a [`TaskReceiver`]
//!
//! RPC threads talk to the receiver through a cloneable [`TaskReceiverHandle`];
//! every queue mutation happens on the single driver task.

use crate::error::ReceiverError;
use crate::receiver::TaskReceiver;
use crate::scheduling::SendReplyCallback;
use dispatch_core::{PushTaskReply, PushTaskRequest, Status, TaskId, WorkerId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Work posted to the driver
pub enum ReceiverCommand {
    HandleTask {
        request: Box<PushTaskRequest>,
        send_reply: SendReplyCallback,
    },
    CancelActorTask {
        caller_worker_id: WorkerId,
        task_id: TaskId,
        respond_to: oneshot::Sender<bool>,
    },
    CancelNormalTask {
        task_id: TaskId,
        respond_to: oneshot::Sender<bool>,
    },
    SetActorReprName(String),
    Stop {
        respond_to: oneshot::Sender<()>,
    },
}

impl ReceiverCommand {
    fn kind(&self) -> &'static str {
        match self {
            ReceiverCommand::HandleTask { .. } => "handle_task",
            ReceiverCommand::CancelActorTask { .. } => "cancel_actor_task",
            ReceiverCommand::CancelNormalTask { .. } => "cancel_normal_task",
            ReceiverCommand::SetActorReprName(_) => "set_actor_repr_name",
            ReceiverCommand::Stop { .. } => "stop",
        }
    }
}

/// Thread-safe entry point to a running receiver
#[derive(Clone)]
pub struct TaskReceiverHandle {
    sender: mpsc::UnboundedSender<ReceiverCommand>,
    backlog: Arc<AtomicUsize>,
    backlog_warn: usize,
}

impl TaskReceiverHandle {
    fn send(&self, command: ReceiverCommand) -> Result<(), ReceiverError> {
        let depth = self.backlog.fetch_add(1, Ordering::Relaxed) + 1;
        if depth == self.backlog_warn {
            warn!(depth, "Task receiver command backlog is growing");
        }
        self.sender.send(command).map_err(|_| {
            self.backlog.fetch_sub(1, Ordering::Relaxed);
            ReceiverError::DriverClosed
        })
    }

    /// Queue a task; `send_reply` runs exactly once
    pub fn handle_task(
        &self,
        request: PushTaskRequest,
        send_reply: SendReplyCallback,
    ) -> Result<(), ReceiverError> {
        self.send(ReceiverCommand::HandleTask {
            request: Box::new(request),
            send_reply,
        })
    }

    /// Queue a task and wait for its reply
    pub async fn push_task(
        &self,
        request: PushTaskRequest,
    ) -> Result<(Status, PushTaskReply), ReceiverError> {
        let task_id = request.task_spec.task_id();
        let (tx, rx) = oneshot::channel();
        self.handle_task(
            request,
            Box::new(move |status, reply| {
                let _ = tx.send((status, reply));
            }),
        )?;
        rx.await.map_err(|_| ReceiverError::ReplyDropped(task_id))
    }

    pub async fn cancel_queued_actor_task(
        &self,
        caller_worker_id: WorkerId,
        task_id: TaskId,
    ) -> Result<bool, ReceiverError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(ReceiverCommand::CancelActorTask {
            caller_worker_id,
            task_id,
            respond_to,
        })?;
        rx.await.map_err(|_| ReceiverError::DriverClosed)
    }

    pub async fn cancel_queued_normal_task(&self, task_id: TaskId) -> Result<bool, ReceiverError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(ReceiverCommand::CancelNormalTask {
            task_id,
            respond_to,
        })?;
        rx.await.map_err(|_| ReceiverError::DriverClosed)
    }

    pub fn set_actor_repr_name(&self, name: impl Into<String>) -> Result<(), ReceiverError> {
        self.send(ReceiverCommand::SetActorReprName(name.into()))
    }

    /// Stop the actor queues; the driver keeps running
    pub async fn stop(&self) -> Result<(), ReceiverError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(ReceiverCommand::Stop { respond_to })?;
        rx.await.map_err(|_| ReceiverError::DriverClosed)
    }
}

/// Spawns the driver for a receiver
pub struct ReceiverService;

impl ReceiverService {
    /// Run `receiver` on a tokio task until `shutdown` fires or every handle is
    /// dropped. On exit the receiver is stopped and its executors drained.
    pub fn spawn(
        receiver: TaskReceiver,
        shutdown: CancellationToken,
    ) -> (TaskReceiverHandle, JoinHandle<()>) {
        let (sender, commands) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let handle = TaskReceiverHandle {
            sender,
            backlog: backlog.clone(),
            backlog_warn: receiver.config().command_buffer_warn.max(1),
        };

        let driver = tokio::spawn(Self::run(receiver, commands, backlog, shutdown));
        (handle, driver)
    }

    async fn run(
        mut receiver: TaskReceiver,
        mut commands: mpsc::UnboundedReceiver<ReceiverCommand>,
        backlog: Arc<AtomicUsize>,
        shutdown: CancellationToken,
    ) {
        let dependencies_ready = receiver.dependencies_ready();
        let mut ticker = tokio::time::interval(receiver.config().tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            tick_interval_ms = receiver.config().tick_interval_ms,
            "Task receiver driver started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Task receiver driver shutting down");
                    break;
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("All receiver handles dropped");
                        break;
                    };
                    backlog.fetch_sub(1, Ordering::Relaxed);
                    Self::apply(&mut receiver, command);
                    receiver.run_normal_tasks_from_queue();
                }
                _ = dependencies_ready.notified() => {
                    receiver.schedule_actor_tasks();
                }
                _ = ticker.tick() => {
                    receiver.tick();
                }
            }
        }

        // Stopped queues reject whatever is still buffered, so every reply is sent.
        receiver.stop();
        commands.close();
        while let Ok(command) = commands.try_recv() {
            Self::apply(&mut receiver, command);
        }

        let joined = tokio::task::spawn_blocking(move || receiver.shutdown()).await;
        if let Err(e) = joined {
            warn!(error = %e, "Receiver shutdown did not complete cleanly");
        }
        info!("Task receiver driver stopped");
    }

    fn apply(receiver: &mut TaskReceiver, command: ReceiverCommand) {
        debug!(command = command.kind(), "Applying receiver command");
        match command {
            ReceiverCommand::HandleTask {
                request,
                send_reply,
            } => receiver.handle_task(*request, send_reply),
            ReceiverCommand::CancelActorTask {
                caller_worker_id,
                task_id,
                respond_to,
            } => {
                let _ = respond_to.send(receiver.cancel_queued_actor_task(caller_worker_id, task_id));
            }
            ReceiverCommand::CancelNormalTask {
                task_id,
                respond_to,
            } => {
                let _ = respond_to.send(receiver.cancel_queued_normal_task(task_id));
            }
            ReceiverCommand::SetActorReprName(name) => receiver.set_actor_repr_name(name),
            ReceiverCommand::Stop { respond_to } => {
                receiver.stop();
                let _ = respond_to.send(());
            }
        }
    }
}
