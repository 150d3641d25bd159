//! In-memory storage backend.
//!
//! Keeps queued requests and checkpoints in RAM. A store built with
//! [`InMemoryStorage::recording`] also keeps an ordered log of every write so
//! callers can check what happened and in which order.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::B256;
use async_trait::async_trait;

use callrelay_core::error::StoreError;
use callrelay_core::store::{CheckpointStore, RequestQueue};
use callrelay_core::types::{Checkpoint, RequestedEvent};

/// One successful write, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Enqueue { request_hash: B256 },
    WriteCheckpoint { chain_id: u64, block_number: u64 },
}

#[derive(Default)]
pub struct InMemoryStorage {
    requests: Mutex<Vec<RequestedEvent>>,
    checkpoints: Mutex<HashMap<u64, Checkpoint>>,
    ops: Mutex<Vec<StoreOp>>,
    record_ops: bool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also logs every write, for [`ops`](Self::ops).
    pub fn recording() -> Self {
        Self {
            record_ops: true,
            ..Self::default()
        }
    }

    fn record(&self, op: StoreOp) {
        if self.record_ops {
            self.ops.lock().unwrap().push(op);
        }
    }

    /// All queued requests in arrival order, duplicates included.
    pub fn requests(&self) -> Vec<RequestedEvent> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_by_hash(&self, request_hash: B256) -> Vec<RequestedEvent> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.request_hash == request_hash)
            .cloned()
            .collect()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        let mut all: Vec<_> = self.checkpoints.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.chain_id.cmp(&b.chain_id));
        all
    }

    /// Writes in order. Always empty unless built with [`recording`](Self::recording).
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestQueue for InMemoryStorage {
    async fn enqueue(&self, event: &RequestedEvent) -> Result<(), StoreError> {
        self.requests.lock().unwrap().push(event.clone());
        self.record(StoreOp::Enqueue {
            request_hash: event.request_hash,
        });
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load_checkpoint(&self, chain_id: u64) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoints.lock().unwrap().get(&chain_id).cloned())
    }

    async fn write_checkpoint(&self, chain_id: u64, block_number: u64) -> Result<(), StoreError> {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(chain_id, Checkpoint::new(chain_id, block_number));
        self.record(StoreOp::WriteCheckpoint {
            chain_id,
            block_number,
        });
        Ok(())
    }
}
