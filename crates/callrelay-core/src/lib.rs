//! callrelay-core: data model and trust policy for the CallRelay pipeline.
//!
//! # Architecture
//!
//! ```text
//! EventSource ─► RawLog ─► Decoder ─► RequestedEvent ─► Validator ─┬─► RequestQueue::enqueue
//!                                                                  └─► CheckpointStore::write_checkpoint
//! ```
//!
//! This crate holds everything in that picture that does no I/O:
//!
//! - [`types`]: `Call`, `CrossChainRequest`, `RequestedEvent`, `RawLog`, `Checkpoint`
//! - [`registry`]: per-chain trust profiles (`TrustRegistry`)
//! - [`validator`]: the cross-chain trust check
//! - [`store`]: the durable sink contracts implemented by `callrelay-storage`

pub mod error;
pub mod registry;
pub mod store;
pub mod types;
pub mod validator;

pub use error::{DecodeError, RegistryError, StoreError, ValidationError};
pub use registry::{ChainProfile, Contracts, ProverKind, TrustRegistry};
pub use store::{CheckpointStore, RequestQueue};
pub use types::{Call, Checkpoint, CrossChainRequest, LogPosition, RawLog, RequestedEvent};
pub use validator::{RequestValidator, TrustValidator, NATIVE_ASSET};
