//! `RelayConfig`: process configuration.
//!
//! Loaded from an optional YAML file, then overridden by command-line flags
//! and their environment-variable fallbacks. Every field has a default, so an
//! empty file (or none at all) is a valid configuration.
//!
//! ```yaml
//! supported_chains: [421614, 84532]
//! rpc_urls:
//!   421614: wss://arbitrum-sepolia.example/ws
//!   84532: https://base-sepolia.example
//! poll_interval_ms: 3000
//! database: ./callrelay.db
//! log:
//!   level: info
//!   components:
//!     callrelay-evm: debug
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use callrelay_core::registry::{chains, ChainProfile, TrustRegistry};
use callrelay_evm::ListenerConfig;

use crate::logging::LogConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Source chains to watch, one listener each.
    pub supported_chains: Vec<u64>,
    /// Chain id → RPC endpoint. `ws(s)://` selects push mode, `http(s)://` poll mode.
    pub rpc_urls: BTreeMap<u64, String>,
    /// 0 = poll once, never re-arm.
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub start_timeout_ms: u64,
    /// First block to scan for a chain with no checkpoint.
    pub from_block: u64,
    /// SQLite database path. Absent = in-memory store.
    pub database: Option<String>,
    pub log: LogConfig,
    /// Extra profiles, inserted over the built-in testnet ones.
    pub chains: Vec<ChainProfile>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            supported_chains: vec![chains::ARBITRUM_SEPOLIA],
            rpc_urls: BTreeMap::new(),
            poll_interval_ms: 3_000,
            poll_timeout_ms: 10_000,
            start_timeout_ms: 10_000,
            from_block: 0,
            database: None,
            log: LogConfig::default(),
            chains: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("invalid relay configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Built-in profiles, overridden by `chains`, with RPC endpoints attached.
    pub fn registry(&self) -> Result<TrustRegistry> {
        let mut registry = TrustRegistry::testnets();
        for profile in &self.chains {
            registry.insert(profile.clone());
        }
        for (&chain_id, url) in &self.rpc_urls {
            registry
                .set_rpc_url(chain_id, url.clone())
                .with_context(|| format!("rpc url given for chain {chain_id}"))?;
        }
        Ok(registry)
    }

    pub fn listener_config(&self, chain_id: u64) -> ListenerConfig {
        ListenerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            from_block: self.from_block,
            ..ListenerConfig::new(chain_id)
        }
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

// ─── Command-line overrides ──────────────────────────────────────────────────

/// Flags shared by every subcommand. Set values win over the config file.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "CALLRELAY_CONFIG")]
    pub config: Option<String>,

    /// Comma-separated source chain ids
    #[arg(long, global = true, env = "SUPPORTED_CHAINS", value_delimiter = ',')]
    pub supported_chains: Vec<u64>,

    /// Arbitrum Sepolia endpoint
    #[arg(long, global = true, env = "ARBITRUM_SEPOLIA_RPC")]
    pub arbitrum_sepolia_rpc: Option<String>,

    /// Base Sepolia endpoint
    #[arg(long, global = true, env = "BASE_SEPOLIA_RPC")]
    pub base_sepolia_rpc: Option<String>,

    /// Optimism Sepolia endpoint
    #[arg(long, global = true, env = "OPTIMISM_SEPOLIA_RPC")]
    pub optimism_sepolia_rpc: Option<String>,

    /// Sepolia endpoint
    #[arg(long, global = true, env = "SEPOLIA_RPC")]
    pub sepolia_rpc: Option<String>,

    /// Endpoint for any chain, as `<chainId>=<url>`. Repeatable.
    #[arg(long = "rpc", global = true, value_parser = parse_rpc_override)]
    pub rpc: Vec<(u64, String)>,

    /// SQLite database path
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database: Option<String>,

    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, global = true)]
    pub from_block: Option<u64>,

    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// JSON log output
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl Overrides {
    /// Load the config file (if any) and apply the flags on top.
    pub fn resolve(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(Path::new(path))?,
            None => RelayConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut RelayConfig) {
        if !self.supported_chains.is_empty() {
            config.supported_chains = self.supported_chains.clone();
        }

        let named = [
            (chains::ARBITRUM_SEPOLIA, &self.arbitrum_sepolia_rpc),
            (chains::BASE_SEPOLIA, &self.base_sepolia_rpc),
            (chains::OPTIMISM_SEPOLIA, &self.optimism_sepolia_rpc),
            (chains::SEPOLIA, &self.sepolia_rpc),
        ];
        for (chain_id, url) in named {
            if let Some(url) = url {
                config.rpc_urls.insert(chain_id, url.clone());
            }
        }
        for (chain_id, url) in &self.rpc {
            config.rpc_urls.insert(*chain_id, url.clone());
        }

        if let Some(db) = &self.database {
            config.database = Some(db.clone());
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(block) = self.from_block {
            config.from_block = block;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if self.log_json {
            config.log.json = true;
        }
    }
}

fn parse_rpc_override(s: &str) -> Result<(u64, String), String> {
    let (chain, url) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <chainId>=<url>, got '{s}'"))?;
    let chain_id = chain
        .trim()
        .parse()
        .map_err(|e| format!("invalid chain id '{chain}': {e}"))?;
    let url = url.trim();
    if url.is_empty() {
        return Err(format!("empty url for chain {chain_id}"));
    }
    Ok((chain_id, url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_default() {
        let config = RelayConfig::from_yaml("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.supported_chains, vec![421614]);
        assert_eq!(config.poll_interval_ms, 3_000);
        assert_eq!(config.start_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn yaml_fields_override_defaults() {
        let yaml = r#"
supported_chains: [421614, 84532]
rpc_urls:
  421614: wss://arb.example/ws
  84532: https://base.example
poll_interval_ms: 0
database: ./relay.db
log:
  level: debug
  json: true
"#;
        let config = RelayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.supported_chains, vec![421614, 84532]);
        assert_eq!(config.rpc_urls[&84532], "https://base.example");
        assert_eq!(config.poll_interval_ms, 0);
        assert_eq!(config.poll_timeout_ms, 10_000);
        assert_eq!(config.database.as_deref(), Some("./relay.db"));
        assert!(config.log.json);

        let lc = config.listener_config(84532);
        assert_eq!(lc.chain_id, 84532);
        assert!(lc.poll_interval.is_zero());
    }

    #[test]
    fn registry_attaches_rpc_urls() {
        let mut config = RelayConfig::default();
        config.rpc_urls.insert(421614, "wss://arb.example".into());
        let registry = config.registry().unwrap();
        assert_eq!(registry.lookup(421614).unwrap().rpc_url, "wss://arb.example");
        assert!(registry.lookup(84532).unwrap().rpc_url.is_empty());
    }

    #[test]
    fn registry_rejects_url_for_unknown_chain() {
        let mut config = RelayConfig::default();
        config.rpc_urls.insert(1, "https://mainnet.example".into());
        assert!(config.registry().is_err());
    }

    #[test]
    fn custom_profiles_replace_builtins() {
        let yaml = r#"
chains:
  - chainId: 84532
    contracts:
      outbox: "0x00000000000000000000000000000000000000aa"
  - chainId: 31337
"#;
        let config = RelayConfig::from_yaml(yaml).unwrap();
        let registry = config.registry().unwrap();
        let base = registry.lookup(84532).unwrap();
        assert!(base.outbox().is_some());
        assert!(base.target_prover.is_none());
        assert!(registry.lookup(31337).is_ok());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn flags_win_over_file() {
        let mut config = RelayConfig::default();
        config.rpc_urls.insert(84532, "https://file.example".into());
        let overrides = Overrides {
            supported_chains: vec![84532],
            base_sepolia_rpc: Some("wss://env.example".into()),
            rpc: vec![(421614, "https://flag.example".into())],
            poll_interval_ms: Some(500),
            log_json: true,
            ..Default::default()
        };
        overrides.apply(&mut config);

        assert_eq!(config.supported_chains, vec![84532]);
        assert_eq!(config.rpc_urls[&84532], "wss://env.example");
        assert_eq!(config.rpc_urls[&421614], "https://flag.example");
        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.log.json);
    }

    #[test]
    fn rpc_override_parsing() {
        assert_eq!(
            parse_rpc_override("84532=https://x.example").unwrap(),
            (84532, "https://x.example".to_string())
        );
        assert!(parse_rpc_override("84532").is_err());
        assert!(parse_rpc_override("base=https://x").is_err());
        assert!(parse_rpc_override("84532=").is_err());
    }
}
