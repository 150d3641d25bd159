//! The `RpcTransport` trait and endpoint classification.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Which transport an endpoint URL calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// `http://` or `https://`: request/response only.
    Http,
    /// `ws://` or `wss://`: streaming capable.
    WebSocket,
}

impl EndpointKind {
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        match scheme.as_str() {
            "http" | "https" => Ok(Self::Http),
            "ws" | "wss" => Ok(Self::WebSocket),
            _ => Err(TransportError::UnsupportedEndpoint { url: url.to_string() }),
        }
    }

    pub fn supports_subscriptions(&self) -> bool {
        matches!(self, Self::WebSocket)
    }
}

/// A JSON-RPC connection to one node.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Endpoint URL.
    fn url(&self) -> &str;

    /// Next request id for this connection.
    fn next_id(&self) -> u64;

    /// Call `method` and deserialize its result.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError>
    where
        Self: Sized,
    {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let result = self
            .send(req)
            .await?
            .into_result()
            .map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }
}
