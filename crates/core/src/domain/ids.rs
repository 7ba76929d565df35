//! Unique identifiers used across the dispatch core
//!
//! Every identifier is a thin `Uuid` newtype so that a task id can never be passed
//! where an actor id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create identifier from a UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The nil identifier
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Get the underlying UUID
            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.simple())
            }
        }
    };
}

define_id!(
    /// Identifies one task instance (one attempt of one invocation)
    TaskId
);
define_id!(
    /// Identifies an actor; for creation tasks this is the actor being created
    ActorId
);
define_id!(
    /// Identifies a worker process, used to key per-caller queues
    WorkerId
);
define_id!(
    /// Identifies an object produced or consumed by a task
    ObjectId
);
