//! Storage for intermediate partitions during tree construction.
//!
//! The tree builder hands each node's partition to a [`PartitionStore`] and
//! takes it back when the node is expanded, so the whole frontier never has to
//! live on the builder's stack. [`InMemoryPartitionStore`] is the default; a
//! disk-backed store can implement the same trait.

use super::Dataset;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Handle of a stored partition.
pub type PartitionId = usize;

pub trait PartitionStore: Send + Sync {
    /// Store a partition and return its handle.
    fn put(&self, partition: Dataset) -> PartitionId;

    /// Clone of a stored partition.
    fn get(&self, id: PartitionId) -> Option<Dataset>;

    /// Remove a partition from the store and return it.
    fn take(&self, id: PartitionId) -> Option<Dataset>;

    /// Number of partitions currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPartitionStore {
    next_id: AtomicUsize,
    partitions: Mutex<HashMap<PartitionId, Dataset>>,
}

impl InMemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartitionStore for InMemoryPartitionStore {
    fn put(&self, partition: Dataset) -> PartitionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.partitions.lock().insert(id, partition);
        id
    }

    fn get(&self, id: PartitionId) -> Option<Dataset> {
        self.partitions.lock().get(&id).cloned()
    }

    fn take(&self, id: PartitionId) -> Option<Dataset> {
        self.partitions.lock().remove(&id)
    }

    fn len(&self) -> usize {
        self.partitions.lock().len()
    }
}
