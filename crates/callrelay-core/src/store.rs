//! Durable sink contracts: the output queue and per-chain checkpoints.
//!
//! Implementations live in `callrelay-storage` (`InMemoryStorage`,
//! `SqliteStorage`). A chain worker only ever calls [`RequestQueue::enqueue`]
//! followed by [`CheckpointStore::write_checkpoint`] for each accepted event.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Checkpoint, RequestedEvent};

/// Destination for validated requests, keyed by `request_hash`.
///
/// Duplicate inserts for the same hash are allowed; consumers deduplicate.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    async fn enqueue(&self, event: &RequestedEvent) -> Result<(), StoreError>;
}

/// Last-processed block per chain.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the stored checkpoint record, if any.
    async fn load_checkpoint(&self, chain_id: u64) -> Result<Option<Checkpoint>, StoreError>;

    /// Upsert the checkpoint. Overwrites; a lower block replaces a higher one.
    async fn write_checkpoint(&self, chain_id: u64, block_number: u64) -> Result<(), StoreError>;

    /// Last processed block, or 0 when the chain has never been checkpointed.
    async fn read_checkpoint(&self, chain_id: u64) -> Result<u64, StoreError> {
        Ok(self
            .load_checkpoint(chain_id)
            .await?
            .map(|cp| cp.block_number)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<u64, Checkpoint>>);

    #[async_trait]
    impl CheckpointStore for MapStore {
        async fn load_checkpoint(&self, chain_id: u64) -> Result<Option<Checkpoint>, StoreError> {
            Ok(self.0.lock().unwrap().get(&chain_id).cloned())
        }

        async fn write_checkpoint(&self, chain_id: u64, block_number: u64) -> Result<(), StoreError> {
            self.0
                .lock()
                .unwrap()
                .insert(chain_id, Checkpoint::new(chain_id, block_number));
            Ok(())
        }
    }

    #[tokio::test]
    async fn absent_checkpoint_reads_as_zero() {
        let store = MapStore::default();
        assert_eq!(store.read_checkpoint(84532).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_returns_last_written_block() {
        let store = MapStore::default();
        store.write_checkpoint(84532, 500).await.unwrap();
        store.write_checkpoint(84532, 450).await.unwrap();
        assert_eq!(store.read_checkpoint(84532).await.unwrap(), 450);
        assert_eq!(store.read_checkpoint(421614).await.unwrap(), 0);
    }
}
