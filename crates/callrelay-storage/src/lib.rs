//! callrelay-storage: backends for the request queue and checkpoints.
//!
//! Backends:
//! - [`memory`]: in-process, no persistence (tests, dry runs)
//! - [`sqlite`]: SQLite via `sqlx` (single-file persistence), behind the `sqlite` feature

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{InMemoryStorage, StoreOp};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
