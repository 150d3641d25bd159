//! Per-event processing shared by both acquisition modes.
//!
//! decode → validate → enqueue → write checkpoint. The checkpoint is written
//! only after the enqueue succeeds, so a crash between the two replays the
//! event rather than losing it.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use callrelay_core::error::{DecodeError, StoreError, ValidationError};
use callrelay_core::store::{CheckpointStore, RequestQueue};
use callrelay_core::types::{RawLog, RequestedEvent};
use callrelay_core::validator::RequestValidator;

use crate::decoder::Decoder;
use crate::metrics::ListenerMetrics;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

pub struct Pipeline {
    chain_id: u64,
    decoder: Arc<dyn Decoder>,
    validator: Arc<dyn RequestValidator>,
    queue: Arc<dyn RequestQueue>,
    checkpoints: Arc<dyn CheckpointStore>,
    metrics: Arc<ListenerMetrics>,
}

impl Pipeline {
    pub fn new(
        chain_id: u64,
        decoder: Arc<dyn Decoder>,
        validator: Arc<dyn RequestValidator>,
        queue: Arc<dyn RequestQueue>,
        checkpoints: Arc<dyn CheckpointStore>,
        metrics: Arc<ListenerMetrics>,
    ) -> Self {
        Self {
            chain_id,
            decoder,
            validator,
            queue,
            checkpoints,
            metrics,
        }
    }

    /// Process one log. Failures are logged and counted here; callers only
    /// need the result to decide how far their cursor may advance.
    pub async fn process(&self, log: &RawLog) -> Result<RequestedEvent, ProcessError> {
        ListenerMetrics::incr(&self.metrics.logs_received);
        let position = log.position();

        let result = self.run(log).await;
        match &result {
            Ok(event) => {
                ListenerMetrics::incr(&self.metrics.events_accepted);
                info!(
                    chain_id = self.chain_id,
                    %position,
                    request_hash = %event.request_hash,
                    destination = %event.request.destination_chain_id,
                    "request queued"
                );
            }
            Err(ProcessError::Decode(e)) => {
                ListenerMetrics::incr(&self.metrics.decode_errors);
                warn!(chain_id = self.chain_id, %position, tx = %log.transaction_hash, error = %e, "undecodable log skipped");
            }
            Err(ProcessError::Rejected(e)) => {
                ListenerMetrics::incr(&self.metrics.validation_rejections);
                warn!(chain_id = self.chain_id, %position, kind = e.kind(), error = %e, "request rejected");
            }
            Err(ProcessError::Store(e)) => {
                ListenerMetrics::incr(&self.metrics.store_errors);
                warn!(chain_id = self.chain_id, %position, error = %e, "store write failed");
            }
        }
        result
    }

    async fn run(&self, log: &RawLog) -> Result<RequestedEvent, ProcessError> {
        let event = self.decoder.decode(log)?;
        debug!(chain_id = self.chain_id, request_hash = %event.request_hash, "decoded request");
        self.validator.validate(&event)?;
        self.queue.enqueue(&event).await?;
        self.checkpoints
            .write_checkpoint(self.chain_id, event.source_block_number)
            .await?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes, B256, U256};
    use async_trait::async_trait;
    use callrelay_core::types::{Checkpoint, CrossChainRequest};
    use callrelay_storage::{InMemoryStorage, StoreOp};

    use super::*;
    use crate::decoder::{encode_request, AbiDecoder};

    struct Verdict(Option<ValidationError>);

    impl RequestValidator for Verdict {
        fn validate(&self, _event: &RequestedEvent) -> Result<(), ValidationError> {
            self.0.clone().map_or(Ok(()), Err)
        }
    }

    struct BrokenCheckpoints;

    #[async_trait]
    impl CheckpointStore for BrokenCheckpoints {
        async fn load_checkpoint(&self, _chain_id: u64) -> Result<Option<Checkpoint>, StoreError> {
            Ok(None)
        }

        async fn write_checkpoint(&self, _chain_id: u64, _block: u64) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
    }

    fn log(block: u64) -> RawLog {
        let request = CrossChainRequest {
            requester: Address::repeat_byte(1),
            calls: vec![],
            prover_contract: Address::ZERO,
            destination_chain_id: U256::from(84532u64),
            inbox_contract: Address::ZERO,
            l2_oracle: Address::ZERO,
            l2_oracle_storage_key: B256::ZERO,
            reward_asset: Address::ZERO,
            reward_amount: U256::ZERO,
            finality_delay_seconds: U256::ZERO,
            nonce: U256::ZERO,
            expiry: U256::ZERO,
            precheck_contract: Address::ZERO,
            precheck_data: Bytes::new(),
        };
        RawLog {
            address: Address::ZERO,
            topics: vec![crate::signature::event_topic(), B256::repeat_byte(9)],
            data: encode_request(&request),
            block_number: block,
            log_index: 0,
            transaction_hash: B256::ZERO,
            removed: false,
        }
    }

    fn pipeline(
        verdict: Option<ValidationError>,
        queue: Arc<InMemoryStorage>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> (Pipeline, Arc<ListenerMetrics>) {
        let metrics = Arc::new(ListenerMetrics::default());
        let p = Pipeline::new(
            421614,
            Arc::new(AbiDecoder::new()),
            Arc::new(Verdict(verdict)),
            queue,
            checkpoints,
            metrics.clone(),
        );
        (p, metrics)
    }

    #[tokio::test]
    async fn accepted_event_enqueues_then_checkpoints() {
        let store = Arc::new(InMemoryStorage::recording());
        let (p, metrics) = pipeline(None, store.clone(), store.clone());
        let event = p.process(&log(77)).await.unwrap();
        assert_eq!(event.source_block_number, 77);
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Enqueue {
                    request_hash: B256::repeat_byte(9)
                },
                StoreOp::WriteCheckpoint {
                    chain_id: 421614,
                    block_number: 77
                },
            ]
        );
        assert_eq!(metrics.snapshot().events_accepted, 1);
    }

    #[tokio::test]
    async fn rejected_event_writes_nothing() {
        let store = Arc::new(InMemoryStorage::recording());
        let reason = ValidationError::UnknownDestinationChain {
            chain_id: U256::from(999_999u64),
        };
        let (p, metrics) = pipeline(Some(reason.clone()), store.clone(), store.clone());
        match p.process(&log(5)).await {
            Err(ProcessError::Rejected(e)) => assert_eq!(e, reason),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(store.ops().is_empty());
        assert_eq!(metrics.snapshot().validation_rejections, 1);
    }

    #[tokio::test]
    async fn checkpoint_failure_is_a_store_error() {
        let store = Arc::new(InMemoryStorage::recording());
        let (p, metrics) = pipeline(None, store.clone(), Arc::new(BrokenCheckpoints));
        assert!(matches!(
            p.process(&log(8)).await,
            Err(ProcessError::Store(_))
        ));
        assert_eq!(store.request_count(), 1);
        let m = metrics.snapshot();
        assert_eq!(m.store_errors, 1);
        assert_eq!(m.events_accepted, 0);
    }
}
