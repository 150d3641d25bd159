//! SQLite storage backend.
//!
//! Persists queued requests and per-chain checkpoints to a single SQLite file.
//!
//! # Usage
//! ```rust,no_run
//! use callrelay_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStorage::open("./callrelay.db").await?;
//! let memory = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use alloy_primitives::B256;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use callrelay_core::error::StoreError;
use callrelay_core::store::{CheckpointStore, RequestQueue};
use callrelay_core::types::{Checkpoint, RequestedEvent};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a database at `path`: a file path or a full `sqlite:` URL.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(backend)?;

        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await
            .map_err(backend)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Private in-memory database. Single connection, since each SQLite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;
        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        // Not unique on request_hash: duplicates are resolved by consumers.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS requests (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                request_hash        TEXT    NOT NULL,
                source_block_number INTEGER NOT NULL,
                source_log_index    INTEGER NOT NULL,
                request_json        TEXT    NOT NULL,
                created_at          INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_hash ON requests (request_hash);")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     TEXT    PRIMARY KEY,
                block_number INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    pub async fn request_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM requests")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    /// Every stored copy of one request, oldest first.
    pub async fn requests_by_hash(&self, request_hash: B256) -> Result<Vec<RequestedEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT request_json FROM requests WHERE request_hash = ? ORDER BY id",
        )
        .bind(request_hash.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|row| {
                let json: String = row.get("request_json");
                Ok(serde_json::from_str(&json)?)
            })
            .collect()
    }

    pub async fn checkpoints(&self) -> Result<Vec<Checkpoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT chain_id, block_number, updated_at FROM checkpoints ORDER BY chain_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .iter()
            .map(|r| Checkpoint {
                chain_id: r.get("chain_id"),
                block_number: r.get::<i64, _>("block_number") as u64,
                updated_at: r.get("updated_at"),
            })
            .collect())
    }
}

#[async_trait]
impl RequestQueue for SqliteStorage {
    async fn enqueue(&self, event: &RequestedEvent) -> Result<(), StoreError> {
        let json = serde_json::to_string(event)?;
        sqlx::query(
            "INSERT INTO requests
             (request_hash, source_block_number, source_log_index, request_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.request_hash.to_string())
        .bind(event.source_block_number as i64)
        .bind(event.source_log_index as i64)
        .bind(&json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        debug!(request_hash = %event.request_hash, block = event.source_block_number, "request stored");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load_checkpoint(&self, chain_id: u64) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT chain_id, block_number, updated_at FROM checkpoints WHERE chain_id = ?",
        )
        .bind(chain_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get("chain_id"),
            block_number: r.get::<i64, _>("block_number") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn write_checkpoint(&self, chain_id: u64, block_number: u64) -> Result<(), StoreError> {
        let cp = Checkpoint::new(chain_id, block_number);
        sqlx::query(
            "INSERT INTO checkpoints (chain_id, block_number, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(chain_id) DO UPDATE SET
                block_number = excluded.block_number,
                updated_at   = excluded.updated_at",
        )
        .bind(&cp.chain_id)
        .bind(cp.block_number as i64)
        .bind(cp.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        debug!(chain_id, block = block_number, "checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes, U256};
    use callrelay_core::types::{Call, CrossChainRequest};

    use super::*;

    fn event(hash: u8, block: u64) -> RequestedEvent {
        RequestedEvent {
            request_hash: B256::repeat_byte(hash),
            request: CrossChainRequest {
                requester: Address::repeat_byte(0x11),
                calls: vec![Call {
                    to: Address::repeat_byte(0x22),
                    data: Bytes::from(vec![1, 2, 3]),
                    value: U256::from(10u64).pow(U256::from(18u64)),
                }],
                prover_contract: Address::repeat_byte(0xaa),
                destination_chain_id: U256::from(84532u64),
                inbox_contract: Address::repeat_byte(0xbb),
                l2_oracle: Address::repeat_byte(0xcc),
                l2_oracle_storage_key: B256::repeat_byte(0x4b),
                reward_asset: Address::repeat_byte(0xee),
                reward_amount: U256::MAX,
                finality_delay_seconds: U256::ZERO,
                nonce: U256::from(1u64),
                expiry: U256::ZERO,
                precheck_contract: Address::ZERO,
                precheck_data: Bytes::new(),
            },
            source_block_number: block,
            source_log_index: 2,
        }
    }

    #[tokio::test]
    async fn request_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.enqueue(&event(1, 100)).await.unwrap();

        let stored = store.requests_by_hash(B256::repeat_byte(1)).await.unwrap();
        assert_eq!(stored, vec![event(1, 100)]);
        assert!(store.requests_by_hash(B256::repeat_byte(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_hashes_are_tolerated() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.enqueue(&event(1, 100)).await.unwrap();
        store.enqueue(&event(1, 100)).await.unwrap();
        assert_eq!(store.request_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_checkpoint_reads_zero() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert_eq!(store.read_checkpoint(84532).await.unwrap(), 0);
        assert!(store.load_checkpoint(84532).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_upsert_overwrites() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.write_checkpoint(421614, 1_000).await.unwrap();
        store.write_checkpoint(421614, 900).await.unwrap();
        store.write_checkpoint(84532, 5).await.unwrap();

        assert_eq!(store.read_checkpoint(421614).await.unwrap(), 900);
        let all = store.checkpoints().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].chain_id, "421614");
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!("callrelay-test-{}.db", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        {
            let store = SqliteStorage::open(&path_str).await.unwrap();
            store.write_checkpoint(84532, 77).await.unwrap();
        }
        let store = SqliteStorage::open(&path_str).await.unwrap();
        assert_eq!(store.read_checkpoint(84532).await.unwrap(), 77);
        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
