//! `EventSource`: raw log acquisition from one source chain.
//!
//! A source works in one of two modes, fixed when it is built:
//!
//! - **Push**: a `logs` subscription streams matching logs as they are mined.
//! - **Poll**: the caller periodically asks for every matching log since a block.
//!
//! Both modes can answer range queries, so a push listener can catch up on
//! history before following the live stream.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use callrelay_core::types::RawLog;
use callrelay_rpc::{
    EndpointKind, HttpRpcClient, RpcTransport, SubscriptionId, TransportError, WsClientConfig,
    WsRpcClient,
};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("malformed log: {0}")]
    MalformedLog(String),

    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Push,
    Poll,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Poll => f.write_str("poll"),
        }
    }
}

/// Logs emitted by `address` whose topic0 is `topic0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
}

impl LogFilter {
    pub fn new(address: Address, topic0: B256) -> Self {
        Self { address, topic0 }
    }

    /// `eth_subscribe("logs", ..)` filter object.
    pub fn subscription_params(&self) -> Value {
        json!({
            "address": self.address,
            "topics": [self.topic0],
        })
    }

    /// `eth_getLogs` filter from `from_block` through the chain head.
    pub fn range_params(&self, from_block: u64) -> Value {
        json!({
            "address": self.address,
            "topics": [self.topic0],
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": "latest",
        })
    }
}

/// Live log stream. `errors` reports non-terminal transport trouble.
#[derive(Debug)]
pub struct LogSubscription {
    pub id: SubscriptionId,
    pub logs: mpsc::UnboundedReceiver<RawLog>,
    pub errors: mpsc::UnboundedReceiver<SourceError>,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    fn mode(&self) -> SourceMode;

    /// Open a live subscription. Only meaningful in push mode.
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription, SourceError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SourceError>;

    /// Every matching log from `from_block` through the latest block.
    async fn logs_since(&self, filter: &LogFilter, from_block: u64)
        -> Result<Vec<RawLog>, SourceError>;
}

// ─── RpcEventSource ──────────────────────────────────────────────────────────

/// JSON-RPC backed source; the endpoint scheme picks the mode.
pub enum RpcEventSource {
    Http(HttpRpcClient),
    Ws(WsRpcClient),
}

impl RpcEventSource {
    pub async fn connect(url: &str) -> Result<Self, SourceError> {
        match EndpointKind::parse(url)? {
            EndpointKind::Http => Ok(Self::Http(HttpRpcClient::default_for(url)?)),
            EndpointKind::WebSocket => Ok(Self::Ws(
                WsRpcClient::connect(url, WsClientConfig::default()).await?,
            )),
        }
    }
}

#[async_trait]
impl EventSource for RpcEventSource {
    fn mode(&self) -> SourceMode {
        match self {
            Self::Http(_) => SourceMode::Poll,
            Self::Ws(_) => SourceMode::Push,
        }
    }

    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription, SourceError> {
        let Self::Ws(client) = self else {
            return Err(SourceError::Unsupported(
                "log subscriptions need a WebSocket endpoint",
            ));
        };
        let sub = client
            .subscribe("logs", vec![filter.subscription_params()])
            .await?;

        let id = sub.id;
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let mut notifications = sub.notifications;
        let mut errors = sub.errors;

        // Ends when the subscription is removed or the listener drops its receiver.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    note = notifications.recv() => match note {
                        Some(value) => match parse_log(&value) {
                            Ok(log) => {
                                if log_tx.send(log).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = err_tx.send(e);
                            }
                        },
                        None => break,
                    },
                    err = errors.recv() => match err {
                        Some(e) => {
                            let _ = err_tx.send(SourceError::Transport(e));
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(LogSubscription {
            id,
            logs: log_rx,
            errors: err_rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SourceError> {
        match self {
            Self::Ws(client) => Ok(client.unsubscribe(id).await?),
            Self::Http(_) => Ok(()),
        }
    }

    async fn logs_since(
        &self,
        filter: &LogFilter,
        from_block: u64,
    ) -> Result<Vec<RawLog>, SourceError> {
        let params = vec![filter.range_params(from_block)];
        let values: Vec<Value> = match self {
            Self::Http(c) => c.call("eth_getLogs", params).await?,
            Self::Ws(c) => c.call("eth_getLogs", params).await?,
        };

        let mut logs = Vec::with_capacity(values.len());
        for value in &values {
            match parse_log(value) {
                Ok(log) => logs.push(log),
                Err(e) => tracing::warn!(error = %e, from_block, "skipping malformed log"),
            }
        }
        Ok(logs)
    }
}

// ─── JSON log parsing ────────────────────────────────────────────────────────

/// Parse a log object as returned by `eth_getLogs` / `eth_subscription`.
pub fn parse_log(value: &Value) -> Result<RawLog, SourceError> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::MalformedLog(format!("missing '{name}'")))
    };
    let malformed = |name: &str, e: &dyn std::fmt::Display| {
        SourceError::MalformedLog(format!("invalid '{name}': {e}"))
    };

    let address: Address = field("address")?
        .parse()
        .map_err(|e| malformed("address", &e))?;
    let topics = value
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::MalformedLog("missing 'topics'".into()))?
        .iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| SourceError::MalformedLog("non-string topic".into()))?
                .parse::<B256>()
                .map_err(|e| malformed("topics", &e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let data_hex = field("data")?;
    let data = hex::decode(data_hex.strip_prefix("0x").unwrap_or(data_hex))
        .map_err(|e| malformed("data", &e))?;
    let transaction_hash: B256 = field("transactionHash")?
        .parse()
        .map_err(|e| malformed("transactionHash", &e))?;

    Ok(RawLog {
        address,
        topics,
        data: Bytes::from(data),
        block_number: quantity(field("blockNumber")?).map_err(|e| malformed("blockNumber", &e))?,
        log_index: quantity(field("logIndex")?).map_err(|e| malformed("logIndex", &e))?,
        transaction_hash,
        removed: value.get("removed").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Hex quantity (`0x1a`) to `u64`.
fn quantity(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16)
}
