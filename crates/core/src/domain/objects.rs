use super::ObjectId;
use serde::{Deserialize, Serialize};

/// A value produced by a task body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnValue {
    /// Inline payload; `None` when the value only lives in the shared object store
    pub data: Option<Vec<u8>>,
    pub metadata: Option<Vec<u8>>,
    /// Object references serialized inside this value
    pub nested_refs: Vec<ObjectId>,
    /// The payload was written to the shared object store instead of being inlined
    pub in_shared_store: bool,
}

impl ReturnValue {
    pub fn inline(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn in_shared_store(size: usize) -> Self {
        Self {
            data: Some(vec![0; size]),
            in_shared_store: true,
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn with_nested_ref(mut self, object_id: ObjectId) -> Self {
        self.nested_refs.push(object_id);
        self
    }

    /// Total size of payload plus metadata in bytes
    pub fn size(&self) -> u64 {
        let data = self.data.as_ref().map(|d| d.len()).unwrap_or(0);
        let metadata = self.metadata.as_ref().map(|m| m.len()).unwrap_or(0);
        (data + metadata) as u64
    }
}
