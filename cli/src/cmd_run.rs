//! `callrelay run`: one listener per supported chain until shutdown.
//!
//! A chain that cannot be built or started within the start timeout is
//! logged and left out; the rest keep running. SIGINT or SIGTERM stops every
//! listener, each finishing its in-flight event first.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use callrelay_core::registry::TrustRegistry;
use callrelay_core::store::{CheckpointStore, RequestQueue};
use callrelay_evm::Listener;
use callrelay_storage::{InMemoryStorage, SqliteStorage};

use crate::config::RelayConfig;

pub struct Store {
    pub queue: Arc<dyn RequestQueue>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

/// SQLite when a database is configured, memory otherwise.
pub async fn open_store(database: Option<&str>) -> Result<Store> {
    match database {
        Some(path) => {
            let db = Arc::new(
                SqliteStorage::open(path)
                    .await
                    .with_context(|| format!("opening database {path}"))?,
            );
            info!(path, "using SQLite store");
            Ok(Store {
                queue: db.clone(),
                checkpoints: db,
            })
        }
        None => {
            warn!("no database configured, requests and checkpoints are kept in memory");
            let mem = Arc::new(InMemoryStorage::new());
            Ok(Store {
                queue: mem.clone(),
                checkpoints: mem,
            })
        }
    }
}

pub async fn run(config: RelayConfig) -> Result<()> {
    let registry = Arc::new(config.registry()?);
    let store = open_store(config.database.as_deref()).await?;

    let mut listeners = Vec::with_capacity(config.supported_chains.len());
    for &chain_id in &config.supported_chains {
        match start_chain(chain_id, &config, registry.clone(), &store).await {
            Ok(listener) => listeners.push(listener),
            Err(e) => error!(chain_id, error = %format!("{e:#}"), "chain not started"),
        }
    }
    if listeners.is_empty() {
        bail!("no listener could be started");
    }
    info!(chains = listeners.len(), "relay running");

    shutdown_signal().await;
    info!("shutdown requested");

    for listener in &mut listeners {
        let chain_id = listener.chain_id();
        if let Err(e) = listener.stop().await {
            warn!(chain_id, error = %e, "stop failed");
        }
        let metrics = serde_json::to_string(&listener.metrics()).unwrap_or_default();
        info!(chain_id, %metrics, "final listener counters");
    }
    info!("callrelay shut down");
    Ok(())
}

/// Build and start one listener, bounded by the start timeout.
async fn start_chain(
    chain_id: u64,
    config: &RelayConfig,
    registry: Arc<TrustRegistry>,
    store: &Store,
) -> Result<Listener> {
    let timeout = config.start_timeout();
    let start = async {
        let mut listener = Listener::connect(
            config.listener_config(chain_id),
            registry,
            store.queue.clone(),
            store.checkpoints.clone(),
        )
        .await?;
        listener.start().await?;
        Ok::<_, anyhow::Error>(listener)
    };
    tokio::time::timeout(timeout, start)
        .await
        .with_context(|| format!("chain {chain_id}: start timed out after {timeout:?}"))?
        .with_context(|| format!("chain {chain_id}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
