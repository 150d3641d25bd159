//! Golden fixture integration tests.
//!
//! Each fixture in `fixtures/evm/` holds an outbox log exactly as a node
//! returns it from `eth_getLogs`, plus the field values it must decode to.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};

use callrelay_core::registry::{chains, TrustRegistry};
use callrelay_core::types::RequestedEvent;
use callrelay_core::validator::{RequestValidator, TrustValidator};
use callrelay_evm::decoder::{AbiDecoder, Decoder};
use callrelay_evm::source::parse_log;

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// The fixtures live two levels above the crate root.
fn fixture_path(name: &str) -> std::path::PathBuf {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("../../fixtures/evm");
    p.push(name);
    p
}

fn load_fixture(name: &str) -> serde_json::Value {
    let content = std::fs::read_to_string(fixture_path(name)).expect("fixture not found");
    serde_json::from_str(&content).expect("invalid fixture JSON")
}

fn addr(v: &serde_json::Value) -> Address {
    v.as_str().unwrap().parse().unwrap()
}

fn bytes(v: &serde_json::Value) -> Bytes {
    v.as_str().unwrap().parse().unwrap()
}

fn uint(v: &serde_json::Value) -> U256 {
    U256::from(v.as_u64().unwrap())
}

fn decode_fixture(f: &serde_json::Value) -> RequestedEvent {
    let log = parse_log(&f["log"]).expect("fixture log must parse");
    AbiDecoder::new().decode(&log).expect("fixture log must decode")
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn golden_two_call_request_decodes() {
    let f = load_fixture("cross-chain-call-requested.json");
    let event = decode_fixture(&f);
    let exp = &f["expected"];
    let req = &event.request;

    assert_eq!(
        event.request_hash,
        exp["requestHash"].as_str().unwrap().parse::<B256>().unwrap()
    );
    assert_eq!(event.source_block_number, exp["blockNumber"].as_u64().unwrap());
    assert_eq!(event.source_log_index, exp["logIndex"].as_u64().unwrap());

    assert_eq!(req.requester, addr(&exp["requester"]));
    assert_eq!(req.prover_contract, addr(&exp["proverContract"]));
    assert_eq!(req.destination_chain_id, uint(&exp["destinationChainId"]));
    assert_eq!(req.inbox_contract, addr(&exp["inboxContract"]));
    assert_eq!(req.l2_oracle, addr(&exp["l2Oracle"]));
    assert_eq!(
        req.l2_oracle_storage_key,
        exp["l2OracleStorageKey"].as_str().unwrap().parse::<B256>().unwrap()
    );
    assert_eq!(req.reward_asset, addr(&exp["rewardAsset"]));
    assert_eq!(req.reward_amount, uint(&exp["rewardAmount"]));
    assert_eq!(req.finality_delay_seconds, uint(&exp["finalityDelaySeconds"]));
    assert_eq!(req.nonce, uint(&exp["nonce"]));
    assert_eq!(req.expiry, uint(&exp["expiry"]));
    assert_eq!(req.precheck_contract, addr(&exp["precheckContract"]));
    assert_eq!(req.precheck_data, bytes(&exp["precheckData"]));

    let calls = exp["calls"].as_array().unwrap();
    assert_eq!(req.calls.len(), calls.len());
    for (got, want) in req.calls.iter().zip(calls) {
        assert_eq!(got.to, addr(&want["to"]));
        assert_eq!(got.data, bytes(&want["data"]));
        assert_eq!(got.value, uint(&want["value"]));
    }
}

#[test]
fn golden_request_passes_testnet_trust_check() {
    let f = load_fixture("cross-chain-call-requested.json");
    let event = decode_fixture(&f);
    let source = f["sourceChainId"].as_u64().unwrap();
    assert_eq!(source, chains::ARBITRUM_SEPOLIA);

    let validator = TrustValidator::new(Arc::new(TrustRegistry::testnets()), source).unwrap();
    validator.validate(&event).expect("fixture request should be trusted");
}

#[test]
fn golden_log_emitted_by_registered_outbox() {
    let f = load_fixture("cross-chain-call-requested.json");
    let log = parse_log(&f["log"]).unwrap();
    let registry = TrustRegistry::testnets();
    let profile = registry.lookup(chains::ARBITRUM_SEPOLIA).unwrap();
    assert_eq!(Some(log.address), profile.outbox());
    assert_eq!(log.topics[0], AbiDecoder::new().topic0());
}

#[test]
fn golden_truncated_data_is_rejected() {
    let f = load_fixture("cross-chain-call-requested.json");
    let mut log = parse_log(&f["log"]).unwrap();
    log.data = Bytes::copy_from_slice(&log.data[..log.data.len() - 64]);
    assert!(AbiDecoder::new().decode(&log).is_err());
}
