//! WebSocket JSON-RPC client with auto-reconnect and subscription management.
//!
//! One background task owns the socket. Callers talk to it over a command
//! channel; responses come back on per-request oneshots and subscription
//! notifications on per-subscription channels. When the connection drops,
//! every subscriber is told on its error channel, in-flight calls fail, and
//! the task reconnects with backoff and re-issues each `eth_subscribe`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::subscriptions::{Subscription, SubscriptionId, SubscriptionManager};
use crate::transport::RpcTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Clone)]
pub struct WsClientConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// What to do with the response to an outstanding request.
enum Pending {
    Call(oneshot::Sender<Result<JsonRpcResponse, TransportError>>),
    /// `eth_subscribe` for a tracked subscription. `reply` is `None` for re-subscriptions.
    Subscribe {
        id: SubscriptionId,
        reply: Option<oneshot::Sender<Result<String, TransportError>>>,
    },
}

impl Pending {
    fn fail(self, error: TransportError) {
        match self {
            Self::Call(tx) => {
                let _ = tx.send(Err(error));
            }
            Self::Subscribe { reply: Some(tx), .. } => {
                let _ = tx.send(Err(error));
            }
            // Subscribers already learn about the loss through their error channel.
            Self::Subscribe { reply: None, .. } => {}
        }
    }
}

enum WsCommand {
    Send { req: JsonRpcRequest, pending: Pending },
    Close,
}

enum ConnectionExit {
    Closed,
    Lost(String),
}

pub struct WsRpcClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
    next_id: Arc<AtomicU64>,
}

impl WsRpcClient {
    /// Open the connection and start the background task.
    ///
    /// The first connect attempt is made here so that a bad endpoint surfaces
    /// as an error to the caller; later drops are handled by reconnecting.
    pub async fn connect(
        url: impl Into<String>,
        config: WsClientConfig,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        tracing::info!(url = %url, "WebSocket connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new();
        let next_id = Arc::new(AtomicU64::new(1));

        tokio::spawn(ws_task(
            url.clone(),
            stream,
            cmd_rx,
            subscriptions.clone(),
            next_id.clone(),
            config,
        ));

        Ok(Self {
            url,
            cmd_tx,
            subscriptions,
            next_id,
        })
    }

    /// `eth_subscribe(kind, ...params)`. The returned handle keeps receiving across reconnects.
    pub async fn subscribe(
        &self,
        kind: &str,
        params: Vec<Value>,
    ) -> Result<Subscription, TransportError> {
        let sub = self.subscriptions.register(kind, params.clone());
        let req = subscribe_request(self.next_id(), kind, params);
        let (tx, rx) = oneshot::channel();
        let pending = Pending::Subscribe {
            id: sub.id,
            reply: Some(tx),
        };

        if self.cmd_tx.send(WsCommand::Send { req, pending }).is_err() {
            self.subscriptions.remove(sub.id);
            return Err(TransportError::Closed);
        }
        match rx.await {
            Ok(Ok(server_id)) => {
                tracing::debug!(url = %self.url, id = %sub.id, server_id = %server_id, kind, "subscribed");
                Ok(sub)
            }
            Ok(Err(e)) => {
                self.subscriptions.remove(sub.id);
                Err(e)
            }
            Err(_) => {
                self.subscriptions.remove(sub.id);
                Err(TransportError::Closed)
            }
        }
    }

    /// Stop tracking `id` and, if it is currently live on the node, `eth_unsubscribe` it.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        if let Some(server_id) = self.subscriptions.remove(id) {
            let removed: bool = self
                .call("eth_unsubscribe", vec![Value::String(server_id.clone())])
                .await?;
            tracing::debug!(url = %self.url, %id, server_id = %server_id, removed, "unsubscribed");
        }
        Ok(())
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Send {
                req,
                pending: Pending::Call(tx),
            })
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn subscribe_request(id: u64, kind: &str, params: Vec<Value>) -> JsonRpcRequest {
    let params = std::iter::once(Value::String(kind.to_string()))
        .chain(params)
        .collect();
    JsonRpcRequest::new(id, "eth_subscribe", params)
}

async fn send_json(sink: &mut WsSink, req: &JsonRpcRequest) -> Result<(), TransportError> {
    let text = serde_json::to_string(req)?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))
}

async fn ws_task(
    url: String,
    mut stream: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: SubscriptionManager,
    next_id: Arc<AtomicU64>,
    config: WsClientConfig,
) {
    let backoff = RetryPolicy::new(RetryConfig {
        max_retries: u32::MAX,
        initial_backoff: config.reconnect_initial,
        max_backoff: config.reconnect_max,
        multiplier: 2.0,
    });

    loop {
        let reason = match run_connection(stream, &mut cmd_rx, &subscriptions, &next_id).await {
            ConnectionExit::Closed => {
                tracing::debug!(url = %url, "WebSocket client closed");
                return;
            }
            ConnectionExit::Lost(reason) => reason,
        };
        tracing::warn!(url = %url, reason = %reason, "WebSocket disconnected");
        subscriptions.connection_lost(&reason);

        let mut attempt = 0u32;
        stream = loop {
            attempt += 1;
            let delay = backoff.backoff(attempt);
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);

            // Commands issued while disconnected fail fast instead of queueing.
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = cmd_rx.recv() => match cmd {
                        None | Some(WsCommand::Close) => return,
                        Some(WsCommand::Send { pending, .. }) => {
                            pending.fail(TransportError::WebSocket("not connected".into()));
                        }
                    },
                }
            }

            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    tracing::info!(url = %url, attempt, "WebSocket reconnected");
                    break stream;
                }
                Err(e) => {
                    tracing::warn!(url = %url, attempt, error = %e, "WebSocket reconnect failed");
                }
            }
        };
    }
}

/// Drive one live connection until it drops or the client closes.
async fn run_connection(
    stream: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: &SubscriptionManager,
    next_id: &AtomicU64,
) -> ConnectionExit {
    let (mut sink, mut source) = stream.split();
    let mut pending: HashMap<u64, Pending> = HashMap::new();

    for (id, kind, params) in subscriptions.active() {
        let request_id = next_id.fetch_add(1, Ordering::Relaxed);
        let req = subscribe_request(request_id, &kind, params);
        if let Err(e) = send_json(&mut sink, &req).await {
            return ConnectionExit::Lost(e.to_string());
        }
        pending.insert(request_id, Pending::Subscribe { id, reply: None });
    }

    let reason = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None | Some(WsCommand::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    for p in pending.into_values() {
                        p.fail(TransportError::Closed);
                    }
                    return ConnectionExit::Closed;
                }
                Some(WsCommand::Send { req, pending: p }) => {
                    let Some(request_id) = req.id.as_number() else {
                        p.fail(TransportError::WebSocket("request id must be numeric".into()));
                        continue;
                    };
                    match send_json(&mut sink, &req).await {
                        Ok(()) => {
                            pending.insert(request_id, p);
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            p.fail(e);
                            break reason;
                        }
                    }
                }
            },
            msg = source.next() => match msg {
                None => break "stream ended".to_string(),
                Some(Err(e)) => break e.to_string(),
                Some(Ok(Message::Text(text))) => handle_message(&text, &mut pending, subscriptions),
                Some(Ok(Message::Close(frame))) => break format!("closed by server: {frame:?}"),
                Some(Ok(_)) => {}
            },
        }
    };

    for p in pending.into_values() {
        p.fail(TransportError::WebSocket(format!("connection lost: {reason}")));
    }
    ConnectionExit::Lost(reason)
}

fn handle_message(text: &str, pending: &mut HashMap<u64, Pending>, subscriptions: &SubscriptionManager) {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("failed to parse WS message as JSON");
        return;
    };

    if val.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = &val["params"];
        if let Some(server_id) = params["subscription"].as_str() {
            subscriptions.dispatch(server_id, params["result"].clone());
        }
        return;
    }

    let resp = match serde_json::from_value::<JsonRpcResponse>(val) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(error = %e, "unrecognised WS message");
            return;
        }
    };
    let Some(entry) = resp.id.as_number().and_then(|id| pending.remove(&id)) else {
        return;
    };

    match entry {
        Pending::Call(tx) => {
            let _ = tx.send(Ok(resp));
        }
        Pending::Subscribe { id, reply } => {
            let outcome = match resp.into_result() {
                Ok(Value::String(server_id)) => Ok(server_id),
                Ok(other) => Err(TransportError::WebSocket(format!(
                    "unexpected eth_subscribe result: {other}"
                ))),
                Err(e) => Err(TransportError::Rpc(e)),
            };
            if let Ok(server_id) = &outcome {
                if !subscriptions.bind(id, server_id.as_str()) {
                    tracing::debug!(%id, server_id = %server_id, "subscription removed before it was confirmed");
                }
            }
            match (reply, outcome) {
                (Some(tx), outcome) => {
                    let _ = tx.send(outcome);
                }
                (None, Ok(server_id)) => tracing::info!(%id, server_id = %server_id, "re-subscribed"),
                (None, Err(e)) => {
                    tracing::warn!(%id, error = %e, "re-subscribe failed");
                    subscriptions.report_error(id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    type ServerWs = WebSocketStream<TcpStream>;

    const WAIT: Duration = Duration::from_secs(5);

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(tcp).await.unwrap()
    }

    async fn next_request(ws: &mut ServerWs) -> Option<Value> {
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Text(text)) = msg {
                return Some(serde_json::from_str(&text).unwrap());
            }
        }
        None
    }

    async fn reply(ws: &mut ServerWs, req: &Value, result: Value) {
        let resp = json!({"jsonrpc": "2.0", "id": req["id"], "result": result});
        ws.send(Message::Text(resp.to_string().into())).await.unwrap();
    }

    async fn notify(ws: &mut ServerWs, server_id: &str, result: Value) {
        let msg = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {"subscription": server_id, "result": result}
        });
        ws.send(Message::Text(msg.to_string().into())).await.unwrap();
    }

    fn fast_reconnect() -> WsClientConfig {
        WsClientConfig {
            reconnect_initial: Duration::from_millis(20),
            reconnect_max: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn subscribe_receive_unsubscribe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let sub = next_request(&mut ws).await.unwrap();
            assert_eq!(sub["method"], "eth_subscribe");
            assert_eq!(sub["params"][0], "logs");
            reply(&mut ws, &sub, json!("0xabc")).await;
            notify(&mut ws, "0xabc", json!({"logIndex": "0x0"})).await;

            let unsub = next_request(&mut ws).await.unwrap();
            assert_eq!(unsub["method"], "eth_unsubscribe");
            assert_eq!(unsub["params"][0], "0xabc");
            reply(&mut ws, &unsub, json!(true)).await;
            while next_request(&mut ws).await.is_some() {}
        });

        let client = WsRpcClient::connect(url, fast_reconnect()).await.unwrap();
        let mut sub = client
            .subscribe("logs", vec![json!({"address": "0x01"})])
            .await
            .unwrap();
        let note = tokio::time::timeout(WAIT, sub.notifications.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(note["logIndex"], "0x0");

        client.unsubscribe(sub.id).await.unwrap();
        assert!(client.subscriptions().is_empty());
        drop(client);
        tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn resubscribes_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let sub = next_request(&mut ws).await.unwrap();
            reply(&mut ws, &sub, json!("0xfirst")).await;
            notify(&mut ws, "0xfirst", json!(1)).await;
            drop(ws);

            let mut ws = accept(&listener).await;
            let resub = next_request(&mut ws).await.unwrap();
            assert_eq!(resub["method"], "eth_subscribe");
            reply(&mut ws, &resub, json!("0xsecond")).await;
            notify(&mut ws, "0xsecond", json!(2)).await;
            while next_request(&mut ws).await.is_some() {}
        });

        let client = WsRpcClient::connect(url, fast_reconnect()).await.unwrap();
        let mut sub = client.subscribe("logs", vec![]).await.unwrap();

        let first = tokio::time::timeout(WAIT, sub.notifications.recv()).await.unwrap();
        assert_eq!(first, Some(json!(1)));

        let err = tokio::time::timeout(WAIT, sub.errors.recv()).await.unwrap();
        assert!(matches!(err, Some(TransportError::WebSocket(_))));

        let second = tokio::time::timeout(WAIT, sub.notifications.recv()).await.unwrap();
        assert_eq!(second, Some(json!(2)));
        assert_eq!(client.subscriptions().server_id(sub.id).as_deref(), Some("0xsecond"));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = WsRpcClient::connect(format!("ws://{addr}"), WsClientConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::WebSocket(_)));
    }
}
