//! Cross-chain trust check.
//!
//! A request is accepted only if every address and key it names matches what
//! the registry trusts for the (source, destination) pair, and the reward is
//! paid in the native asset and strictly exceeds the total call value.
//!
//! The individual checks are exposed so that each can be exercised alone;
//! [`validate`] runs them in order and stops at the first failure.

use std::sync::Arc;

use alloy_primitives::{address, Address, B256, U256};

use crate::error::{RegistryError, ValidationError};
use crate::registry::{ChainProfile, TrustRegistry};
use crate::types::{Call, CrossChainRequest, RequestedEvent};

/// Sentinel reward asset meaning "the chain's native currency".
pub const NATIVE_ASSET: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Resolve the destination profile named by the request.
pub fn check_destination<'r>(
    request: &CrossChainRequest,
    registry: &'r TrustRegistry,
) -> Result<&'r ChainProfile, ValidationError> {
    request
        .destination_chain()
        .and_then(|id| registry.lookup(id).ok())
        .ok_or(ValidationError::UnknownDestinationChain {
            chain_id: request.destination_chain_id,
        })
}

/// The prover address the source chain has deployed for the destination's prover type.
pub fn expected_prover(
    source: &ChainProfile,
    destination: &ChainProfile,
) -> Result<Address, ValidationError> {
    let missing = |prover| ValidationError::MissingProverMapping {
        source_chain: source.chain_id,
        destination_chain: destination.chain_id,
        prover,
    };
    let kind = destination.target_prover.ok_or_else(|| missing(None))?;
    source.prover_address(kind).ok_or_else(|| missing(Some(kind)))
}

pub fn check_prover(request: &CrossChainRequest, expected: Address) -> Result<(), ValidationError> {
    if request.prover_contract != expected {
        return Err(ValidationError::UntrustedProverContract {
            expected,
            actual: request.prover_contract,
        });
    }
    Ok(())
}

pub fn check_inbox(
    request: &CrossChainRequest,
    destination: &ChainProfile,
) -> Result<(), ValidationError> {
    let expected = destination.contracts.inbox;
    if request.inbox_contract != expected {
        return Err(ValidationError::UntrustedInboxContract {
            expected,
            actual: request.inbox_contract,
        });
    }
    Ok(())
}

pub fn check_oracle(
    request: &CrossChainRequest,
    destination: &ChainProfile,
) -> Result<(), ValidationError> {
    let expected = destination.l2_oracle;
    if request.l2_oracle != expected {
        return Err(ValidationError::UntrustedOracleAddress {
            expected,
            actual: request.l2_oracle,
        });
    }
    Ok(())
}

pub fn check_storage_key(
    request: &CrossChainRequest,
    destination: &ChainProfile,
) -> Result<(), ValidationError> {
    let expected: B256 = destination.l2_oracle_storage_key;
    if request.l2_oracle_storage_key != expected {
        return Err(ValidationError::UntrustedOracleStorageKey {
            expected,
            actual: request.l2_oracle_storage_key,
        });
    }
    Ok(())
}

/// Sum of all call values, or `None` if it does not fit in 256 bits.
pub fn total_call_value(calls: &[Call]) -> Option<U256> {
    calls
        .iter()
        .try_fold(U256::ZERO, |acc, call| acc.checked_add(call.value))
}

/// Reward must be native and strictly greater than the value the calls spend.
pub fn check_reward(request: &CrossChainRequest) -> Result<(), ValidationError> {
    let value_needed = total_call_value(&request.calls);
    let sufficient = match value_needed {
        Some(needed) => request.reward_amount > needed,
        None => false,
    };
    if request.reward_asset != NATIVE_ASSET || !sufficient {
        return Err(ValidationError::InvalidReward {
            asset: request.reward_asset,
            amount: request.reward_amount,
            value_needed,
        });
    }
    Ok(())
}

/// Run every check in order against `source` and the destination the request names.
pub fn validate(
    event: &RequestedEvent,
    source: &ChainProfile,
    registry: &TrustRegistry,
) -> Result<(), ValidationError> {
    let request = &event.request;
    let destination = check_destination(request, registry)?;
    let prover = expected_prover(source, destination)?;
    check_prover(request, prover)?;
    check_inbox(request, destination)?;
    check_oracle(request, destination)?;
    check_storage_key(request, destination)?;
    check_reward(request)
}

// ─── RequestValidator ────────────────────────────────────────────────────────

/// Accept/reject predicate applied to every decoded event of one source chain.
pub trait RequestValidator: Send + Sync {
    fn validate(&self, event: &RequestedEvent) -> Result<(), ValidationError>;
}

/// Production validator backed by the trust registry.
#[derive(Debug, Clone)]
pub struct TrustValidator {
    registry: Arc<TrustRegistry>,
    source: ChainProfile,
}

impl TrustValidator {
    pub fn new(registry: Arc<TrustRegistry>, source_chain: u64) -> Result<Self, RegistryError> {
        let source = registry.lookup(source_chain)?.clone();
        Ok(Self { registry, source })
    }

    pub fn source(&self) -> &ChainProfile {
        &self.source
    }
}

impl RequestValidator for TrustValidator {
    fn validate(&self, event: &RequestedEvent) -> Result<(), ValidationError> {
        validate(event, &self.source, &self.registry)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
