//! Shared types for the relay pipeline.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

// ─── Call ────────────────────────────────────────────────────────────────────

/// One atomic action requested on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

// ─── CrossChainRequest ───────────────────────────────────────────────────────

/// The request body carried by a `CrossChainCallRequested` event.
///
/// Field order matches the on-chain struct, which is also the ABI tuple order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainRequest {
    pub requester: Address,
    pub calls: Vec<Call>,
    pub prover_contract: Address,
    pub destination_chain_id: U256,
    pub inbox_contract: Address,
    pub l2_oracle: Address,
    pub l2_oracle_storage_key: B256,
    pub reward_asset: Address,
    pub reward_amount: U256,
    pub finality_delay_seconds: U256,
    pub nonce: U256,
    pub expiry: U256,
    pub precheck_contract: Address,
    pub precheck_data: Bytes,
}

impl CrossChainRequest {
    /// Destination chain id as a registry key, or `None` if it does not fit in 64 bits.
    pub fn destination_chain(&self) -> Option<u64> {
        u64::try_from(self.destination_chain_id).ok()
    }
}

// ─── RequestedEvent ──────────────────────────────────────────────────────────

/// A decoded `CrossChainCallRequested` occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedEvent {
    /// Content-derived request id from the first indexed topic. Dedup key downstream.
    pub request_hash: B256,
    pub request: CrossChainRequest,
    pub source_block_number: u64,
    pub source_log_index: u64,
}

impl RequestedEvent {
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.source_block_number, self.source_log_index)
    }
}

// ─── RawLog ──────────────────────────────────────────────────────────────────

/// A raw EVM log as delivered by `eth_getLogs` or a `logs` subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
    /// Set by the node when the log was dropped by a reorg.
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.block_number, self.log_index)
    }
}

/// `(blockNumber, logIndex)`: the per-chain processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LogPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

// ─── Checkpoint ──────────────────────────────────────────────────────────────

/// Last source-chain block fully processed for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Decimal chain id; persisted as a string.
    pub chain_id: String,
    pub block_number: u64,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn new(chain_id: u64, block_number: u64) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            block_number,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
