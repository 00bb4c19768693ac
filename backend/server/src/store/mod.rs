//! # Record Store
//!
//! Named collections of account records with single writes and all-or-nothing
//! multi-write transactions.
//!
//! ## Collections
//!
//! - `users`: regular accounts, unique by email
//! - `_superusers`: elevated accounts, unique by email, disjoint from `users`
//!
//! ## Backends
//!
//! - [`RedisStore`]: one hash per collection, id -> JSON record. Transactions
//!   are a single `MULTI`/`EXEC` pipeline, inserts are `HSETNX`.
//! - [`MemoryStore`]: in-process tables. Transactions are applied to a staged
//!   copy that only replaces the live tables once every write succeeded.
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod database;
pub mod memory;

pub use self::{database::RedisStore, memory::MemoryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "users")]
    Users,
    #[serde(rename = "_superusers")]
    Superusers,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Superusers];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Superusers => "_superusers",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub collection: Collection,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub email_visible: bool,
    #[serde(default)]
    pub verified: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Record {
    pub fn new(collection: Collection, email: &str, password_hash: String) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().simple().to_string(),
            collection,
            email: email.to_string(),
            password_hash,
            email_visible: false,
            verified: false,
            created: now,
            updated: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Save(Record),
    Delete { collection: Collection, id: String },
}

/// Ordered writes committed together by [`RecordStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(mut self, record: Record) -> Self {
        self.ops.push(WriteOp::Save(record));
        self
    }

    pub fn delete(mut self, collection: Collection, id: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete {
            collection,
            id: id.into(),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("Corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Duplicate email {email} in {collection}")]
    Duplicate {
        collection: Collection,
        email: String,
    },

    #[error("Record {id} not found in {collection}")]
    NotFound { collection: Collection, id: String },

    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn count(&self, collection: Collection) -> Result<usize, StoreError>;

    async fn find_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;

    async fn find_by_email(
        &self,
        collection: Collection,
        email: &str,
    ) -> Result<Option<Record>, StoreError> {
        let records = self.find_all(collection).await?;

        Ok(records.into_iter().find(|record| record.email == email))
    }

    /// Applies every write of `transaction` or none of them.
    async fn commit(&self, transaction: Transaction) -> Result<(), StoreError>;

    /// Writes `record` only if its collection has no record with the same id,
    /// as one atomic step. Returns whether it was written.
    async fn insert(&self, record: Record) -> Result<bool, StoreError>;

    async fn save(&self, record: Record) -> Result<(), StoreError> {
        self.commit(Transaction::new().save(record)).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.commit(Transaction::new().delete(collection, id)).await
    }
}
