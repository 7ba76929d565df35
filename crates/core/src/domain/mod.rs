//! Domain models: identifiers, statuses, task specifications and produced objects

pub mod ids;
pub mod objects;
pub mod status;
pub mod task_spec;

pub use ids::{ActorId, ObjectId, TaskId, WorkerId};
pub use objects::ReturnValue;
pub use status::{Status, StatusCode};
pub use task_spec::{
    ConcurrencyGroup, FunctionDescriptor, TaskSpecBuilder, TaskSpecification, TaskType,
};
