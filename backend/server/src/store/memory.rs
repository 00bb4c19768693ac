//! In-process record store.
//!
//! Used for local runs (`STORE_BACKEND=memory`) and tests. Besides plain
//! storage it can inject a commit failure part way through a transaction and
//! add artificial latency to every call, which makes partial-write and race
//! behavior observable.
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{Mutex, RwLock},
    time::sleep,
};

use super::{Collection, Record, RecordStore, StoreError, Transaction, WriteOp};

type Tables = HashMap<Collection, BTreeMap<String, Record>>;

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_after: Mutex<Option<usize>>,
    latency: Option<Duration>,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next commit fail after `writes` of its writes were staged.
    pub async fn fail_commits_after(&self, writes: usize) {
        *self.fail_after.lock().await = Some(writes);
    }

    /// Number of commits that reached the tables.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
    }
}

fn apply(tables: &mut Tables, op: &WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Save(record) => {
            let table = tables.entry(record.collection).or_default();

            let taken = table
                .values()
                .any(|existing| existing.email == record.email && existing.id != record.id);
            if taken {
                return Err(StoreError::Duplicate {
                    collection: record.collection,
                    email: record.email.clone(),
                });
            }

            table.insert(record.id.clone(), record.clone());
        }
        WriteOp::Delete { collection, id } => {
            let removed = tables
                .get_mut(collection)
                .and_then(|table| table.remove(id));

            if removed.is_none() {
                return Err(StoreError::NotFound {
                    collection: *collection,
                    id: id.clone(),
                });
            }
        }
    }

    Ok(())
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        self.pause().await;

        Ok(self
            .tables
            .read()
            .await
            .get(&collection)
            .map_or(0, BTreeMap::len))
    }

    async fn find_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        self.pause().await;

        Ok(self
            .tables
            .read()
            .await
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit(&self, transaction: Transaction) -> Result<(), StoreError> {
        self.pause().await;

        let fail_after = self.fail_after.lock().await.take();
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();

        for (applied, op) in transaction.ops().iter().enumerate() {
            if fail_after == Some(applied) {
                return Err(StoreError::Aborted(format!(
                    "injected failure after {applied} writes"
                )));
            }

            apply(&mut staged, op)?;
        }

        if fail_after == Some(transaction.len()) {
            return Err(StoreError::Aborted(format!(
                "injected failure after {} writes",
                transaction.len()
            )));
        }

        *tables = staged;
        self.commits.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn insert(&self, record: Record) -> Result<bool, StoreError> {
        self.pause().await;

        let mut tables = self.tables.write().await;
        let present = tables
            .get(&record.collection)
            .is_some_and(|table| table.contains_key(&record.id));
        if present {
            return Ok(false);
        }

        apply(&mut tables, &WriteOp::Save(record))?;
        self.commits.fetch_add(1, Ordering::SeqCst);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn superuser(email: &str) -> Record {
        Record::new(Collection::Superusers, email, "hash".to_string())
    }

    #[tokio::test]
    async fn test_save_and_count() {
        let store = MemoryStore::new();
        store.save(superuser("a@b.com")).await.unwrap();

        assert_eq!(store.count(Collection::Superusers).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Users).await.unwrap(), 0);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_collections_are_disjoint() {
        let store = MemoryStore::new();
        store.save(superuser("a@b.com")).await.unwrap();
        store
            .save(Record::new(Collection::Users, "a@b.com", "hash".to_string()))
            .await
            .unwrap();

        assert_eq!(store.count(Collection::Superusers).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Users).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.save(superuser("a@b.com")).await.unwrap();

        let err = store.save(superuser("a@b.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.count(Collection::Superusers).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_rejected() {
        let store = MemoryStore::new();

        let err = store
            .delete(Collection::Superusers, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_failed_op_rolls_back_whole_transaction() {
        let store = MemoryStore::new();
        let existing = superuser("old@b.com");
        store.save(existing.clone()).await.unwrap();

        let transaction = Transaction::new()
            .save(superuser("new@b.com"))
            .delete(Collection::Superusers, &existing.id)
            .delete(Collection::Superusers, "missing");

        assert!(store.commit(transaction).await.is_err());
        assert_eq!(
            store.find_all(Collection::Superusers).await.unwrap(),
            vec![existing]
        );
    }

    #[tokio::test]
    async fn test_insert_keeps_first_record() {
        let store = MemoryStore::new();
        let first = superuser("a@b.com");
        let mut second = superuser("a@b.com");
        second.id = first.id.clone();
        second.password_hash = "other".to_string();

        assert!(store.insert(first.clone()).await.unwrap());
        assert!(!store.insert(second).await.unwrap());
        assert_eq!(
            store.find_all(Collection::Superusers).await.unwrap(),
            vec![first]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_single_winner() {
        let store = std::sync::Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
        let record = superuser("a@b.com");

        let first = tokio::spawn({
            let store = store.clone();
            let record = record.clone();
            async move { store.insert(record).await }
        });
        let second = tokio::spawn({
            let store = store.clone();
            async move { store.insert(record).await }
        });

        let mut written = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        written.sort();
        assert_eq!(written, [false, true]);
        assert_eq!(store.count(Collection::Superusers).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let store = MemoryStore::new();
        store.fail_commits_after(1).await;

        let transaction = Transaction::new()
            .save(superuser("a@b.com"))
            .save(superuser("c@d.com"));

        let err = store.commit(transaction.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::Aborted(_)));
        assert_eq!(store.count(Collection::Superusers).await.unwrap(), 0);

        store.commit(transaction).await.unwrap();
        assert_eq!(store.count(Collection::Superusers).await.unwrap(), 2);
    }
}
