//! Event signature and topic0 of `CrossChainCallRequested`.
//!
//! topic0 is keccak256 of the canonical signature string: the event name
//! followed by its parameter types, tuples spelled out in parentheses, no
//! spaces and no parameter names.

use alloy_primitives::B256;
use tiny_keccak::{Hasher, Keccak};

/// Canonical signature. Field order is `CrossChainRequest`'s declaration order.
pub const EVENT_SIGNATURE: &str = "CrossChainCallRequested(bytes32,(address,(address,bytes,uint256)[],address,uint256,address,address,bytes32,address,uint256,uint256,uint256,uint256,address,bytes))";

/// keccak256 of an event signature string.
pub fn keccak256_signature(signature: &str) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    B256::from(output)
}

/// topic0 of `CrossChainCallRequested`.
pub fn event_topic() -> B256 {
    keccak256_signature(EVENT_SIGNATURE)
}
