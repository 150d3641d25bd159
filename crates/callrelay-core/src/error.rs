//! Error types for the relay pipeline.
//!
//! Every per-event error here is non-fatal to a chain worker: the worker logs
//! it and moves on to the next record.

use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

use crate::registry::ProverKind;

/// Trust registry lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown chain id: {0}")]
    UnknownChain(u64),
}

/// A raw log could not be turned into a `RequestedEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected {expected} topics, got {actual}")]
    TopicCount { expected: usize, actual: usize },

    #[error("unexpected event signature {actual}, expected {expected}")]
    WrongSignature { expected: B256, actual: B256 },

    #[error("invalid hex in field '{field}': {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("missing field '{0}' in raw log")]
    MissingField(&'static str),

    #[error("ABI decode failed: {reason}")]
    Abi { reason: String },

    #[error("schema mismatch at '{field}': expected {expected}")]
    SchemaMismatch {
        field: &'static str,
        expected: &'static str,
    },
}

/// Why a decoded request was refused.
///
/// Variants are listed in the order the validator checks them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("destination chain {chain_id} is not in the trust registry")]
    UnknownDestinationChain { chain_id: U256 },

    #[error("no prover mapping on source chain {source_chain} for destination {destination_chain} (prover: {prover:?})")]
    MissingProverMapping {
        source_chain: u64,
        destination_chain: u64,
        prover: Option<ProverKind>,
    },

    #[error("untrusted prover contract {actual}, expected {expected}")]
    UntrustedProverContract { expected: Address, actual: Address },

    #[error("untrusted inbox contract {actual}, expected {expected}")]
    UntrustedInboxContract { expected: Address, actual: Address },

    #[error("untrusted L2 oracle {actual}, expected {expected}")]
    UntrustedOracleAddress { expected: Address, actual: Address },

    #[error("untrusted L2 oracle storage key {actual}, expected {expected}")]
    UntrustedOracleStorageKey { expected: B256, actual: B256 },

    #[error("invalid reward: {amount} of asset {asset} does not exceed call value {value_needed:?}")]
    InvalidReward {
        asset: Address,
        amount: U256,
        /// `None` when the summed call value overflowed 256 bits.
        value_needed: Option<U256>,
    },
}

impl ValidationError {
    /// Short stable name of the rejection kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownDestinationChain { .. } => "unknown_destination_chain",
            Self::MissingProverMapping { .. } => "missing_prover_mapping",
            Self::UntrustedProverContract { .. } => "untrusted_prover_contract",
            Self::UntrustedInboxContract { .. } => "untrusted_inbox_contract",
            Self::UntrustedOracleAddress { .. } => "untrusted_oracle_address",
            Self::UntrustedOracleStorageKey { .. } => "untrusted_oracle_storage_key",
            Self::InvalidReward { .. } => "invalid_reward",
        }
    }
}

/// Durable sink failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_kind_names_are_distinct() {
        let errs = [
            ValidationError::UnknownDestinationChain { chain_id: U256::from(1) },
            ValidationError::MissingProverMapping {
                source_chain: 1,
                destination_chain: 2,
                prover: None,
            },
            ValidationError::UntrustedProverContract {
                expected: Address::ZERO,
                actual: Address::ZERO,
            },
            ValidationError::UntrustedInboxContract {
                expected: Address::ZERO,
                actual: Address::ZERO,
            },
            ValidationError::UntrustedOracleAddress {
                expected: Address::ZERO,
                actual: Address::ZERO,
            },
            ValidationError::UntrustedOracleStorageKey {
                expected: B256::ZERO,
                actual: B256::ZERO,
            },
            ValidationError::InvalidReward {
                asset: Address::ZERO,
                amount: U256::ZERO,
                value_needed: None,
            },
        ];
        let mut kinds: Vec<_> = errs.iter().map(|e| e.kind()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errs.len());
    }

    #[test]
    fn unknown_chain_message() {
        assert_eq!(
            RegistryError::UnknownChain(999_999).to_string(),
            "unknown chain id: 999999"
        );
    }
}
