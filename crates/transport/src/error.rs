//! Error types for the dispatch layer

use dispatch_core::{Status, TaskId};
use tracing::error;

/// Failures creating or feeding an executor
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Executor {0} needs a max concurrency of at least 1")]
    InvalidConcurrency(String),

    #[error("Failed to build runtime for executor {0}: {1}")]
    Runtime(String, #[source] std::io::Error),

    #[error("Failed to spawn thread for executor {0}: {1}")]
    Spawn(String, #[source] std::io::Error),

    #[error("Executor {0} is stopped")]
    Stopped(String),

    #[error("Concurrency group {0} was not declared by this actor")]
    UnknownGroup(String),
}

impl ExecutorError {
    /// Status a queued task is rejected with when it cannot be handed to an executor
    pub fn to_status(&self) -> Status {
        match self {
            ExecutorError::Stopped(_) => Status::scheduling_cancelled(self.to_string()),
            ExecutorError::UnknownGroup(_) => Status::invalid(self.to_string()),
            _ => Status::io_error(self.to_string()),
        }
    }
}

/// Errors surfaced by [`crate::TaskReceiver`] and its driver handle
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Task receiver driver has shut down")]
    DriverClosed,

    #[error("Reply for task {0} was dropped without being sent")]
    ReplyDropped(TaskId),
}

/// Abort on a broken contract between the receiver and its collaborators.
///
/// Release builds are compiled with `panic = "abort"`.
#[track_caller]
pub(crate) fn fatal(message: impl AsRef<str>) -> ! {
    let message = message.as_ref();
    error!(fatal = true, "{}", message);
    panic!("{}", message)
}
