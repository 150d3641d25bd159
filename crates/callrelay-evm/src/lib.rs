//! callrelay-evm: EVM side of the CallRelay pipeline.
//!
//! - [`signature`]: `CrossChainCallRequested` signature and topic0
//! - [`decoder`]: `AbiDecoder`: raw log → `RequestedEvent`
//! - [`source`]: `EventSource` in push (subscription) or poll (range query) mode
//! - [`poll`]: non-overlapping poll scheduling
//! - [`pipeline`]: decode → validate → enqueue → checkpoint
//! - [`listener`]: the per-chain worker with its start/stop lifecycle

pub mod decoder;
pub mod listener;
pub mod metrics;
pub mod pipeline;
pub mod poll;
pub mod signature;
pub mod source;

pub use decoder::{AbiDecoder, Decoder};
pub use listener::{ConstructionError, Listener, ListenerConfig, ListenerError, ListenerState};
pub use metrics::{ListenerMetrics, MetricsSnapshot};
pub use pipeline::{Pipeline, ProcessError};
pub use poll::{PollScheduler, PollTimer};
pub use signature::{event_topic, EVENT_SIGNATURE};
pub use source::{EventSource, LogFilter, LogSubscription, RpcEventSource, SourceError, SourceMode};
