//! `AbiDecoder`: raw log → `RequestedEvent`.
//!
//! Layout of a `CrossChainCallRequested` log:
//!
//! ```text
//! topics[0]  keccak256(EVENT_SIGNATURE)
//! topics[1]  requestHash (indexed bytes32)
//! data       abi.encode(CrossChainRequest)   one dynamic tuple parameter
//! ```

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, Bytes, B256, U256};

use callrelay_core::error::DecodeError;
use callrelay_core::types::{Call, CrossChainRequest, RawLog, RequestedEvent};

use crate::signature;

/// Turns raw outbox logs into typed events.
pub trait Decoder: Send + Sync {
    fn decode(&self, log: &RawLog) -> Result<RequestedEvent, DecodeError>;
}

/// Schema-driven decoder for `CrossChainCallRequested`.
#[derive(Debug, Clone)]
pub struct AbiDecoder {
    topic0: B256,
    params: DynSolType,
}

impl Default for AbiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AbiDecoder {
    pub fn new() -> Self {
        Self {
            topic0: signature::event_topic(),
            params: DynSolType::Tuple(vec![request_type()]),
        }
    }

    pub fn topic0(&self) -> B256 {
        self.topic0
    }
}

impl Decoder for AbiDecoder {
    fn decode(&self, log: &RawLog) -> Result<RequestedEvent, DecodeError> {
        if log.topics.len() != 2 {
            return Err(DecodeError::TopicCount {
                expected: 2,
                actual: log.topics.len(),
            });
        }
        if log.topics[0] != self.topic0 {
            return Err(DecodeError::WrongSignature {
                expected: self.topic0,
                actual: log.topics[0],
            });
        }

        let decoded = self
            .params
            .abi_decode_params(&log.data)
            .map_err(|e| DecodeError::Abi {
                reason: e.to_string(),
            })?;
        let request = match decoded.as_tuple() {
            Some([request]) => request_from_value(request)?,
            _ => return Err(mismatch("request", "tuple")),
        };

        Ok(RequestedEvent {
            request_hash: log.topics[1],
            request,
            source_block_number: log.block_number,
            source_log_index: log.log_index,
        })
    }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// `(address,bytes,uint256)`
pub fn call_type() -> DynSolType {
    DynSolType::Tuple(vec![
        DynSolType::Address,
        DynSolType::Bytes,
        DynSolType::Uint(256),
    ])
}

/// The request tuple, in declaration order.
pub fn request_type() -> DynSolType {
    DynSolType::Tuple(vec![
        DynSolType::Address,                       // requester
        DynSolType::Array(Box::new(call_type())),  // calls
        DynSolType::Address,                       // proverContract
        DynSolType::Uint(256),                     // destinationChainId
        DynSolType::Address,                       // inboxContract
        DynSolType::Address,                       // l2Oracle
        DynSolType::FixedBytes(32),                // l2OracleStorageKey
        DynSolType::Address,                       // rewardAsset
        DynSolType::Uint(256),                     // rewardAmount
        DynSolType::Uint(256),                     // finalityDelaySeconds
        DynSolType::Uint(256),                     // nonce
        DynSolType::Uint(256),                     // expiry
        DynSolType::Address,                       // precheckContract
        DynSolType::Bytes,                         // precheckData
    ])
}

/// ABI-encode a request as event data. Inverse of the decoder's data path.
pub fn encode_request(request: &CrossChainRequest) -> Bytes {
    let calls = request
        .calls
        .iter()
        .map(|c| {
            DynSolValue::Tuple(vec![
                DynSolValue::Address(c.to),
                DynSolValue::Bytes(c.data.to_vec()),
                DynSolValue::Uint(c.value, 256),
            ])
        })
        .collect();
    let value = DynSolValue::Tuple(vec![
        DynSolValue::Address(request.requester),
        DynSolValue::Array(calls),
        DynSolValue::Address(request.prover_contract),
        DynSolValue::Uint(request.destination_chain_id, 256),
        DynSolValue::Address(request.inbox_contract),
        DynSolValue::Address(request.l2_oracle),
        DynSolValue::FixedBytes(request.l2_oracle_storage_key, 32),
        DynSolValue::Address(request.reward_asset),
        DynSolValue::Uint(request.reward_amount, 256),
        DynSolValue::Uint(request.finality_delay_seconds, 256),
        DynSolValue::Uint(request.nonce, 256),
        DynSolValue::Uint(request.expiry, 256),
        DynSolValue::Address(request.precheck_contract),
        DynSolValue::Bytes(request.precheck_data.to_vec()),
    ]);
    DynSolValue::Tuple(vec![value]).abi_encode_params().into()
}

// ─── Value extraction ────────────────────────────────────────────────────────

fn mismatch(field: &'static str, expected: &'static str) -> DecodeError {
    DecodeError::SchemaMismatch { field, expected }
}

fn address(v: &DynSolValue, field: &'static str) -> Result<Address, DecodeError> {
    v.as_address().ok_or_else(|| mismatch(field, "address"))
}

fn uint(v: &DynSolValue, field: &'static str) -> Result<U256, DecodeError> {
    v.as_uint()
        .map(|(value, _)| value)
        .ok_or_else(|| mismatch(field, "uint256"))
}

fn bytes(v: &DynSolValue, field: &'static str) -> Result<Bytes, DecodeError> {
    v.as_bytes()
        .map(|b| Bytes::copy_from_slice(b))
        .ok_or_else(|| mismatch(field, "bytes"))
}

fn bytes32(v: &DynSolValue, field: &'static str) -> Result<B256, DecodeError> {
    match v.as_fixed_bytes() {
        Some((word, 32)) => Ok(B256::from_slice(word)),
        _ => Err(mismatch(field, "bytes32")),
    }
}

fn call_from_value(v: &DynSolValue) -> Result<Call, DecodeError> {
    let [to, data, value] = v.as_tuple().ok_or_else(|| mismatch("calls", "tuple"))? else {
        return Err(mismatch("calls", "(address,bytes,uint256)"));
    };
    Ok(Call {
        to: address(to, "calls.to")?,
        data: bytes(data, "calls.data")?,
        value: uint(value, "calls.value")?,
    })
}

fn request_from_value(v: &DynSolValue) -> Result<CrossChainRequest, DecodeError> {
    let fields = v.as_tuple().ok_or_else(|| mismatch("request", "tuple"))?;
    let [requester, calls, prover_contract, destination_chain_id, inbox_contract, l2_oracle, l2_oracle_storage_key, reward_asset, reward_amount, finality_delay_seconds, nonce, expiry, precheck_contract, precheck_data] =
        fields
    else {
        return Err(mismatch("request", "14-field tuple"));
    };

    let calls = calls
        .as_array()
        .ok_or_else(|| mismatch("calls", "array"))?
        .iter()
        .map(call_from_value)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CrossChainRequest {
        requester: address(requester, "requester")?,
        calls,
        prover_contract: address(prover_contract, "proverContract")?,
        destination_chain_id: uint(destination_chain_id, "destinationChainId")?,
        inbox_contract: address(inbox_contract, "inboxContract")?,
        l2_oracle: address(l2_oracle, "l2Oracle")?,
        l2_oracle_storage_key: bytes32(l2_oracle_storage_key, "l2OracleStorageKey")?,
        reward_asset: address(reward_asset, "rewardAsset")?,
        reward_amount: uint(reward_amount, "rewardAmount")?,
        finality_delay_seconds: uint(finality_delay_seconds, "finalityDelaySeconds")?,
        nonce: uint(nonce, "nonce")?,
        expiry: uint(expiry, "expiry")?,
        precheck_contract: address(precheck_contract, "precheckContract")?,
        precheck_data: bytes(precheck_data, "precheckData")?,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
