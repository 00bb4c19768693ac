//! # Redis
//!
//! Persistent record storage.
//!
//! ## Layout
//!
//! - One hash per collection: `records:users`, `records:_superusers`
//! - Field is the record id, value is the record as JSON
//! - `HLEN` gives counts without decoding anything
//!
//! ## Transactions
//!
//! Every commit is one pipeline wrapped in `MULTI`/`EXEC`, so Redis applies
//! the queued `HSET`/`HDEL` commands together or not at all. Inserts are a
//! single `HSETNX`, so concurrent inserts of one id leave exactly one record. Unique emails and
//! delete-of-missing checks are not enforced here; callers that need them
//! serialize their check-then-write themselves.
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::{debug, info};

use super::{Collection, Record, RecordStore, StoreError, Transaction, WriteOp};

const KEY_PREFIX: &str = "records";

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        info!("Connected to Redis at {redis_url}");

        Ok(Self { connection })
    }
}

fn key(collection: Collection) -> String {
    format!("{KEY_PREFIX}:{collection}")
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hlen(key(collection)).await?)
    }

    async fn find_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let mut connection = self.connection.clone();
        let values: Vec<String> = connection.hvals(key(collection)).await?;

        values
            .iter()
            .map(|value| serde_json::from_str(value).map_err(StoreError::from))
            .collect()
    }

    async fn commit(&self, transaction: Transaction) -> Result<(), StoreError> {
        if transaction.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in transaction.ops() {
            match op {
                WriteOp::Save(record) => {
                    let value = serde_json::to_string(record)?;
                    pipe.hset(key(record.collection), &record.id, value).ignore();
                }
                WriteOp::Delete { collection, id } => {
                    pipe.hdel(key(*collection), id).ignore();
                }
            }
        }

        let mut connection = self.connection.clone();
        pipe.query_async::<()>(&mut connection).await?;

        debug!("Committed {} writes", transaction.len());

        Ok(())
    }

    async fn insert(&self, record: Record) -> Result<bool, StoreError> {
        let value = serde_json::to_string(&record)?;

        let mut connection = self.connection.clone();
        let written: bool = connection
            .hset_nx(key(record.collection), &record.id, value)
            .await?;

        Ok(written)
    }
}
