//! CallRelay CLI: runs the cross-chain request listeners.
//!
//! # Commands
//! ```text
//! callrelay run
//! callrelay chains     [--json]
//! callrelay signature
//! callrelay checkpoint --chain <id>
//! callrelay version
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use callrelay_core::store::CheckpointStore;
use callrelay_evm::{event_topic, EVENT_SIGNATURE};
use callrelay_storage::SqliteStorage;

mod cmd_run;
mod config;
mod logging;

use config::{Overrides, RelayConfig};

#[derive(Parser)]
#[command(
    name = "callrelay",
    about = "Cross-chain call request listener",
    long_about = "
Watches each supported chain's outbox for CrossChainCallRequested events,
checks every request against the trust registry and queues the accepted ones.

ENVIRONMENT VARIABLES:
  SUPPORTED_CHAINS       Comma-separated source chain ids (default 421614)
  ARBITRUM_SEPOLIA_RPC   Arbitrum Sepolia endpoint (ws:// = push, http:// = poll)
  BASE_SEPOLIA_RPC       Base Sepolia endpoint
  OPTIMISM_SEPOLIA_RPC   Optimism Sepolia endpoint
  SEPOLIA_RPC            Sepolia endpoint
  DATABASE_URL           SQLite database path
  RUST_LOG               Log filter, overrides --log-level
",
    version
)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the listeners until SIGINT/SIGTERM
    Run,

    /// Print the effective trust registry
    Chains {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the watched event signature and its topic0
    Signature,

    /// Print the stored checkpoint of a chain
    Checkpoint {
        #[arg(long)]
        chain: u64,
    },

    /// Print version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = cli.overrides.resolve()?;
            logging::init_tracing(&config.log);
            cmd_run::run(config).await
        }
        Commands::Chains { json } => cmd_chains(&cli.overrides.resolve()?, json),
        Commands::Signature => cmd_signature(),
        Commands::Checkpoint { chain } => cmd_checkpoint(&cli.overrides.resolve()?, chain).await,
        Commands::Version => {
            println!("callrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_chains(config: &RelayConfig, as_json: bool) -> Result<()> {
    let registry = config.registry()?;

    if as_json {
        let profiles: Vec<_> = registry.profiles().collect();
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    for p in registry.profiles() {
        let watched = config.supported_chains.contains(&p.chain_id);
        println!(
            "{}{}",
            p.chain_id,
            if watched { "  (watched)" } else { "" }
        );
        match p.outbox() {
            Some(outbox) => println!("  outbox:        {outbox}"),
            None => println!("  outbox:        -"),
        }
        println!("  inbox:         {}", p.contracts.inbox);
        for (kind, addr) in &p.prover_contracts {
            println!("  prover:        {kind} {addr}");
        }
        println!("  l2 oracle:     {}", p.l2_oracle);
        println!("  storage key:   {}", p.l2_oracle_storage_key);
        match p.target_prover {
            Some(kind) => println!("  target prover: {kind}"),
            None => println!("  target prover: -"),
        }
        if !p.rpc_url.is_empty() {
            println!("  rpc:           {}", p.rpc_url);
        }
    }
    Ok(())
}

fn cmd_signature() -> Result<()> {
    println!("signature: {EVENT_SIGNATURE}");
    println!("topic0:    {}", event_topic());
    Ok(())
}

async fn cmd_checkpoint(config: &RelayConfig, chain_id: u64) -> Result<()> {
    let Some(path) = config.database.as_deref() else {
        bail!("no database configured (use --database or DATABASE_URL)");
    };
    let db = SqliteStorage::open(path)
        .await
        .with_context(|| format!("opening database {path}"))?;

    match db.load_checkpoint(chain_id).await? {
        Some(cp) => println!(
            "chain {}: block {} (updated at {})",
            cp.chain_id, cp.block_number, cp.updated_at
        ),
        None => println!("chain {chain_id}: no checkpoint"),
    }
    Ok(())
}
