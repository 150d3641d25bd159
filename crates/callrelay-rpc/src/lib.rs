//! callrelay-rpc: JSON-RPC transports for chain connections.
//!
//! Two transports share one [`RpcTransport`] trait:
//!
//! - [`HttpRpcClient`]: request/response only, with retry on transient errors
//! - [`WsRpcClient`]: one multiplexed connection, `eth_subscribe` streams,
//!   auto-reconnect with backoff and re-subscription
//!
//! [`EndpointKind::parse`] picks the transport from an endpoint URL scheme.

pub mod error;
pub mod http;
pub mod request;
pub mod retry;
pub mod subscriptions;
pub mod transport;
pub mod ws;

pub use error::TransportError;
pub use http::{HttpClientConfig, HttpRpcClient};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use retry::{RetryConfig, RetryPolicy};
pub use subscriptions::{Subscription, SubscriptionId, SubscriptionManager};
pub use transport::{EndpointKind, RpcTransport};
pub use ws::{WsClientConfig, WsRpcClient};
