//! Core domain models and contracts for the worker task-dispatch core
//!
//! This crate contains the vocabulary shared by every other crate in the workspace:
//! - Identifiers: TaskId, ActorId, WorkerId, ObjectId
//! - Status codes returned by task execution and carried on replies
//! - TaskSpecification and its builder
//! - Inbound request / outbound reply records
//! - Contracts for the external collaborators: TaskHandler, DependencyWaiter,
//!   ActorCreationNotifier, ClientPool

pub mod contracts;
pub mod domain;
pub mod messages;

pub use contracts::*;
pub use domain::*;
pub use messages::*;

/// Re-export common types
pub use anyhow::{Error, Result};
pub use serde::{Deserialize, Serialize};
pub use uuid::Uuid;
