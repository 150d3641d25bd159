//! Trust registry: static, per-chain trust configuration.
//!
//! A registry is built once at process start and shared read-only between
//! chain workers (`Arc<TrustRegistry>`). It is consulted for the *source*
//! chain (outbox to watch, prover addresses deployed there) and for the
//! *destination* chain named inside each request (inbox, oracle, prover type).

use std::collections::BTreeMap;

use alloy_primitives::{address, b256, Address, B256};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Prover mechanism types, by canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProverKind {
    #[serde(rename = "ArbitrumProver")]
    Arbitrum,
    #[serde(rename = "OPStackProver")]
    OpStack,
}

impl ProverKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arbitrum => "ArbitrumProver",
            Self::OpStack => "OPStackProver",
        }
    }
}

impl std::fmt::Display for ProverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Named trusted contract addresses on one chain.
///
/// `outbox` and `inbox` are zero when the chain has none; the extras exist
/// only for chains whose provers need them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contracts {
    #[serde(default)]
    pub outbox: Address,
    #[serde(default)]
    pub inbox: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_state_registry: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arb_rollup: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_message_passer: Option<Address>,
}

/// Trust configuration for one chain id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainProfile {
    pub chain_id: u64,
    /// Endpoint of the chain connection. Attached from configuration.
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub contracts: Contracts,
    /// Prover type → trusted prover address deployed on this chain.
    #[serde(default)]
    pub prover_contracts: BTreeMap<ProverKind, Address>,
    #[serde(default)]
    pub l2_oracle: Address,
    #[serde(default)]
    pub l2_oracle_storage_key: B256,
    /// Prover type this chain, as a destination, requires requesters to use.
    #[serde(default)]
    pub target_prover: Option<ProverKind>,
}

impl ChainProfile {
    /// An empty profile; every address zero, no provers.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            rpc_url: String::new(),
            contracts: Contracts::default(),
            prover_contracts: BTreeMap::new(),
            l2_oracle: Address::ZERO,
            l2_oracle_storage_key: B256::ZERO,
            target_prover: None,
        }
    }

    /// The outbox to watch, or `None` if this chain cannot be a source.
    pub fn outbox(&self) -> Option<Address> {
        (!self.contracts.outbox.is_zero()).then_some(self.contracts.outbox)
    }

    /// Trusted prover address for `kind` on this chain; zero addresses count as absent.
    pub fn prover_address(&self, kind: ProverKind) -> Option<Address> {
        self.prover_contracts
            .get(&kind)
            .copied()
            .filter(|addr| !addr.is_zero())
    }
}

/// Read-only lookup of `ChainProfile`s by chain id.
#[derive(Debug, Clone, Default)]
pub struct TrustRegistry {
    profiles: BTreeMap<u64, ChainProfile>,
}

impl TrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from profiles; later entries replace earlier ones with the same id.
    pub fn from_profiles(profiles: impl IntoIterator<Item = ChainProfile>) -> Self {
        let mut registry = Self::new();
        for profile in profiles {
            registry.insert(profile);
        }
        registry
    }

    /// Insert or replace a profile. Returns the replaced profile, if any.
    pub fn insert(&mut self, profile: ChainProfile) -> Option<ChainProfile> {
        self.profiles.insert(profile.chain_id, profile)
    }

    pub fn lookup(&self, chain_id: u64) -> Result<&ChainProfile, RegistryError> {
        self.profiles
            .get(&chain_id)
            .ok_or(RegistryError::UnknownChain(chain_id))
    }

    /// Attach an RPC endpoint to an existing profile.
    pub fn set_rpc_url(
        &mut self,
        chain_id: u64,
        url: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let profile = self
            .profiles
            .get_mut(&chain_id)
            .ok_or(RegistryError::UnknownChain(chain_id))?;
        profile.rpc_url = url.into();
        Ok(())
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.profiles.keys().copied()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &ChainProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles of the public testnet deployment (no RPC endpoints attached).
    pub fn testnets() -> Self {
        Self::from_profiles([
            chains::arbitrum_sepolia(),
            chains::base_sepolia(),
            chains::optimism_sepolia(),
            chains::sepolia(),
        ])
    }
}

/// Built-in chain profiles.
pub mod chains {
    use super::*;

    pub const ARBITRUM_SEPOLIA: u64 = 421614;
    pub const BASE_SEPOLIA: u64 = 84532;
    pub const OPTIMISM_SEPOLIA: u64 = 11155420;
    pub const SEPOLIA: u64 = 11155111;

    const OP_STACK_STORAGE_KEY: B256 =
        b256!("a6eef7e35abe7026729641147f7915573c7e97b47efa546f5f6e3230263bcb49");

    pub fn arbitrum_sepolia() -> ChainProfile {
        ChainProfile {
            contracts: Contracts {
                outbox: address!("BCd5762cF9B07EF5597014c350CE2efB2b0DB2D2"),
                inbox: address!("eE962eD1671F655a806cB22623eEA8A7cCc233bC"),
                ..Default::default()
            },
            prover_contracts: BTreeMap::from([(
                ProverKind::OpStack,
                address!("062fBdCfd17A0346D2A9d89FE233bbAdBd1DC14C"),
            )]),
            l2_oracle: address!("d80810638dbDF9081b72C1B33c65375e807281C8"),
            l2_oracle_storage_key: b256!(
                "0000000000000000000000000000000000000000000000000000000000000076"
            ),
            target_prover: Some(ProverKind::Arbitrum),
            ..ChainProfile::new(ARBITRUM_SEPOLIA)
        }
    }

    pub fn base_sepolia() -> ChainProfile {
        ChainProfile {
            contracts: Contracts {
                outbox: address!("D7a5A114A07cC4B5ebd9C5e1cD1136a99fFA3d68"),
                inbox: address!("B482b292878FDe64691d028A2237B34e91c7c7ea"),
                ..Default::default()
            },
            prover_contracts: BTreeMap::from([
                (
                    ProverKind::Arbitrum,
                    address!("49E2cDC9e81825B6C718ae8244fe0D5b062F4874"),
                ),
                (
                    ProverKind::OpStack,
                    address!("562879614C9Db8Da9379be1D5B52BAEcDD456d78"),
                ),
            ]),
            l2_oracle: address!("4C8BA32A5DAC2A720bb35CeDB51D6B067D104205"),
            l2_oracle_storage_key: OP_STACK_STORAGE_KEY,
            target_prover: Some(ProverKind::OpStack),
            ..ChainProfile::new(BASE_SEPOLIA)
        }
    }

    pub fn optimism_sepolia() -> ChainProfile {
        ChainProfile {
            contracts: Contracts {
                inbox: address!("49E2cDC9e81825B6C718ae8244fe0D5b062F4874"),
                l2_message_passer: Some(address!("4200000000000000000000000000000000000016")),
                ..Default::default()
            },
            l2_oracle: address!("218CD9489199F321E1177b56385d333c5B598629"),
            l2_oracle_storage_key: OP_STACK_STORAGE_KEY,
            target_prover: Some(ProverKind::OpStack),
            ..ChainProfile::new(OPTIMISM_SEPOLIA)
        }
    }

    pub fn sepolia() -> ChainProfile {
        ChainProfile {
            contracts: Contracts {
                anchor_state_registry: Some(address!("218CD9489199F321E1177b56385d333c5B598629")),
                arb_rollup: Some(address!("d80810638dbDF9081b72C1B33c65375e807281C8")),
                ..Default::default()
            },
            ..ChainProfile::new(SEPOLIA)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_unknown_chain_fails() {
        let registry = TrustRegistry::testnets();
        assert_eq!(
            registry.lookup(999_999).unwrap_err(),
            RegistryError::UnknownChain(999_999)
        );
    }

    #[test]
    fn testnets_have_one_profile_per_chain() {
        let registry = TrustRegistry::testnets();
        assert_eq!(registry.len(), 4);
        for id in registry.chain_ids() {
            assert_eq!(registry.lookup(id).unwrap().chain_id, id);
        }
    }

    #[test]
    fn only_rollups_with_outboxes_can_be_sources() {
        let registry = TrustRegistry::testnets();
        assert!(registry.lookup(chains::ARBITRUM_SEPOLIA).unwrap().outbox().is_some());
        assert!(registry.lookup(chains::BASE_SEPOLIA).unwrap().outbox().is_some());
        assert!(registry.lookup(chains::OPTIMISM_SEPOLIA).unwrap().outbox().is_none());
        assert!(registry.lookup(chains::SEPOLIA).unwrap().outbox().is_none());
    }

    #[test]
    fn insert_replaces_existing_profile() {
        let mut registry = TrustRegistry::testnets();
        let mut custom = ChainProfile::new(chains::BASE_SEPOLIA);
        custom.l2_oracle = Address::repeat_byte(0x01);

        let previous = registry.insert(custom).unwrap();
        assert_eq!(previous.target_prover, Some(ProverKind::OpStack));
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.lookup(chains::BASE_SEPOLIA).unwrap().l2_oracle,
            Address::repeat_byte(0x01)
        );
    }

    #[test]
    fn set_rpc_url_requires_known_chain() {
        let mut registry = TrustRegistry::testnets();
        registry
            .set_rpc_url(chains::ARBITRUM_SEPOLIA, "wss://arb.example")
            .unwrap();
        assert_eq!(
            registry.lookup(chains::ARBITRUM_SEPOLIA).unwrap().rpc_url,
            "wss://arb.example"
        );
        assert!(registry.set_rpc_url(1, "http://x").is_err());
    }

    #[test]
    fn zero_prover_address_counts_as_absent() {
        let mut profile = ChainProfile::new(1);
        profile.prover_contracts.insert(ProverKind::OpStack, Address::ZERO);
        assert_eq!(profile.prover_address(ProverKind::OpStack), None);
        assert_eq!(profile.prover_address(ProverKind::Arbitrum), None);
    }

    #[test]
    fn profile_from_yaml_uses_prover_names() {
        let yaml = r#"
chainId: 10
rpcUrl: "https://op.example"
contracts:
  outbox: "0x00000000000000000000000000000000000000aa"
proverContracts:
  OPStackProver: "0x00000000000000000000000000000000000000bb"
targetProver: ArbitrumProver
"#;
        let profile: ChainProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(profile.chain_id, 10);
        assert_eq!(profile.target_prover, Some(ProverKind::Arbitrum));
        assert!(profile.prover_address(ProverKind::OpStack).is_some());
        assert!(profile.contracts.inbox.is_zero());
    }
}
