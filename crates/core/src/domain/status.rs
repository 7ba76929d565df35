//! Status values returned by task execution and attached to replies

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable status category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    Invalid,
    IoError,
    NotFound,
    /// Task was rejected by a scheduling queue before it started
    SchedulingCancelled,
    /// The actor constructor raised; the actor is dead on arrival
    CreationTaskError,
    /// The worker is exiting on purpose, e.g. a max-calls limit was reached
    IntentionalSystemExit,
    UnexpectedSystemExit,
    UnknownError,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::Invalid => "Invalid",
            StatusCode::IoError => "IOError",
            StatusCode::NotFound => "NotFound",
            StatusCode::SchedulingCancelled => "SchedulingCancelled",
            StatusCode::CreationTaskError => "CreationTaskError",
            StatusCode::IntentionalSystemExit => "IntentionalSystemExit",
            StatusCode::UnexpectedSystemExit => "UnexpectedSystemExit",
            StatusCode::UnknownError => "UnknownError",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of an operation: a code plus a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Invalid, message)
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::IoError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn scheduling_cancelled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SchedulingCancelled, message)
    }

    pub fn creation_task_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CreationTaskError, message)
    }

    pub fn intentional_system_exit(message: impl Into<String>) -> Self {
        Self::new(StatusCode::IntentionalSystemExit, message)
    }

    pub fn unexpected_system_exit(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UnexpectedSystemExit, message)
    }

    pub fn unknown_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UnknownError, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn is_invalid(&self) -> bool {
        self.code == StatusCode::Invalid
    }

    pub fn is_scheduling_cancelled(&self) -> bool {
        self.code == StatusCode::SchedulingCancelled
    }

    pub fn is_creation_task_error(&self) -> bool {
        self.code == StatusCode::CreationTaskError
    }

    /// Whether the worker must not be reused after returning this status
    pub fn should_exit_worker(&self) -> bool {
        matches!(
            self.code,
            StatusCode::IntentionalSystemExit
                | StatusCode::UnexpectedSystemExit
                | StatusCode::CreationTaskError
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            write!(f, "OK")
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}
