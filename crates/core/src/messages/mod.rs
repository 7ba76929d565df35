//! Inbound task requests and outbound task replies
//!
//! These records are what the RPC layer hands to the receiver and what it sends back.
//! The byte-level encoding is owned by the RPC layer; here they are plain serde records.

use crate::domain::{ObjectId, ReturnValue, TaskSpecification, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource name -> list of (allocation index, quantity)
pub type ResourceMappingType = HashMap<String, Vec<(i64, f64)>>;

/// One allocated slice of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceId {
    pub index: i64,
    pub quantity: f64,
}

/// All slices of one named resource granted to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMapEntry {
    pub name: String,
    pub resource_ids: Vec<ResourceId>,
}

/// Address a worker is reachable on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerAddress {
    pub worker_id: WorkerId,
    pub ip_address: String,
    pub port: u16,
}

impl std::fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.worker_id, self.ip_address, self.port)
    }
}

/// One inbound task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushTaskRequest {
    pub task_spec: TaskSpecification,
    #[serde(default)]
    pub resource_mapping: Vec<ResourceMapEntry>,
    /// Monotonically increasing per caller
    #[serde(default)]
    pub sequence_number: i64,
    /// Highest sequence number whose reply the caller has already observed
    #[serde(default = "default_processed_up_to")]
    pub client_processed_up_to: i64,
}

fn default_processed_up_to() -> i64 {
    -1
}

impl PushTaskRequest {
    pub fn new(task_spec: TaskSpecification) -> Self {
        Self {
            task_spec,
            resource_mapping: Vec::new(),
            sequence_number: 0,
            client_processed_up_to: default_processed_up_to(),
        }
    }

    pub fn with_sequence(mut self, sequence_number: i64, client_processed_up_to: i64) -> Self {
        self.sequence_number = sequence_number;
        self.client_processed_up_to = client_processed_up_to;
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, ids: Vec<(i64, f64)>) -> Self {
        self.resource_mapping.push(ResourceMapEntry {
            name: name.into(),
            resource_ids: ids
                .into_iter()
                .map(|(index, quantity)| ResourceId { index, quantity })
                .collect(),
        });
        self
    }

    /// Flatten the wire resource mapping into the form handed to the task handler
    pub fn resource_ids(&self) -> ResourceMappingType {
        self.resource_mapping
            .iter()
            .map(|entry| {
                let ids = entry
                    .resource_ids
                    .iter()
                    .map(|id| (id.index, id.quantity))
                    .collect();
                (entry.name.clone(), ids)
            })
            .collect()
    }
}

/// Serialized form of one produced object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnObject {
    pub object_id: ObjectId,
    /// Payload lives in the shared object store; `data`/`metadata` are empty
    pub in_plasma: bool,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub nested_inlined_refs: Vec<ObjectId>,
    pub size: u64,
}

impl ReturnObject {
    pub fn serialize(object_id: ObjectId, value: &ReturnValue) -> Self {
        let mut record = Self {
            object_id,
            size: value.size(),
            nested_inlined_refs: value.nested_refs.clone(),
            ..Default::default()
        };
        if value.data.is_some() && value.in_shared_store {
            record.in_plasma = true;
        } else {
            if let Some(data) = &value.data {
                record.data = data.clone();
            }
            if let Some(metadata) = &value.metadata {
                record.metadata = metadata.clone();
            }
        }
        record
    }
}

/// Identifier of one object yielded by a streaming generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingGeneratorReturnId {
    pub object_id: ObjectId,
    pub is_plasma_object: bool,
}

/// A reference the task body borrowed and still holds, reported back to the owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowedRef {
    pub object_id: ObjectId,
    pub owner_worker_id: WorkerId,
    pub local_ref_count: u64,
}

/// Reply for one task, sent exactly once
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushTaskReply {
    pub return_objects: Vec<ReturnObject>,
    pub dynamic_return_objects: Vec<ReturnObject>,
    pub streaming_generator_return_ids: Vec<StreamingGeneratorReturnId>,
    pub borrowed_refs: Vec<BorrowedRef>,
    pub is_retryable_error: bool,
    pub is_application_error: bool,
    pub was_cancelled_before_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_execution_error: Option<String>,
    pub worker_exiting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_repr_name: Option<String>,
}
