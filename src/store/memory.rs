//! # In-Process Store
//!
//! The reference [`Store`] backend: ordered `BTreeMap` namespaces behind a
//! read-write lock, with an async single-writer gate that serializes
//! transactions and standalone mutations. Readers see committed state while
//! a transaction is open; the transaction's writes become visible atomically
//! at commit.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::provider::Result;
use crate::store::{Store, Transaction, WriteContext};

type Namespaces = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// An in-process, single-writer store.
///
/// Cloning is cheap and clones share the same underlying data.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    data: Arc<RwLock<Namespaces>>,
    writer: Arc<Mutex<()>>,
}

impl MemStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn committed(&self) -> Result<std::sync::RwLockReadGuard<'_, Namespaces>> {
        self.data.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn committed_mut(&self) -> Result<std::sync::RwLockWriteGuard<'_, Namespaces>> {
        self.data.write().map_err(|_| anyhow!("store lock poisoned"))
    }
}

impl Store for MemStore {
    type Tx = MemTx;

    async fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self.committed()?;
        let Some(bucket) = data.get(namespace) else {
            tracing::warn!("namespace <{namespace}> does not exist");
            return Ok(None);
        };
        Ok(bucket.get(key).cloned())
    }

    async fn write(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let _gate = self.writer.clone().lock_owned().await;
        let mut data = self.committed_mut()?;
        data.entry(namespace.to_string()).or_default().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let _gate = self.writer.clone().lock_owned().await;
        let mut data = self.committed_mut()?;
        let Some(bucket) = data.get_mut(namespace) else {
            tracing::warn!("namespace <{namespace}> does not exist");
            return Ok(());
        };
        bucket.remove(key);
        Ok(())
    }

    async fn read_prefix(
        &self, namespace: &str, prefix: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let data = self.committed()?;
        let Some(bucket) = data.get(namespace) else {
            tracing::warn!("namespace <{namespace}> does not exist");
            return Ok(BTreeMap::new());
        };
        Ok(bucket
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn read_all_keys(&self, namespace: &str) -> Result<Vec<String>> {
        let data = self.committed()?;
        let Some(bucket) = data.get(namespace) else {
            tracing::warn!("namespace <{namespace}> does not exist");
            return Ok(vec![]);
        };
        Ok(bucket.keys().cloned().collect())
    }

    async fn write_many(&self, writes: Vec<WriteContext>) -> Result<()> {
        let _gate = self.writer.clone().lock_owned().await;
        let mut data = self.committed_mut()?;
        for WriteContext {
            namespace,
            key,
            value,
        } in writes
        {
            data.entry(namespace).or_default().insert(key, value);
        }
        Ok(())
    }

    async fn begin(&self) -> Result<MemTx> {
        Ok(MemTx {
            data: Arc::clone(&self.data),
            pending: vec![],
            _gate: self.writer.clone().lock_owned().await,
        })
    }
}

/// An open transaction on a [`MemStore`].
///
/// Holds the single-writer gate for its lifetime. Buffered writes are applied
/// under the data lock at commit; dropping the transaction discards them.
pub struct MemTx {
    data: Arc<RwLock<Namespaces>>,
    pending: Vec<WriteContext>,
    _gate: OwnedMutexGuard<()>,
}

impl Transaction for MemTx {
    fn read_tx(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        // read-your-writes: the most recent buffered write wins
        for write in self.pending.iter().rev() {
            if write.namespace == namespace && write.key == key {
                return Ok(Some(write.value.clone()));
            }
        }
        let data = self.data.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(data.get(namespace).and_then(|bucket| bucket.get(key)).cloned())
    }

    fn write_tx(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.pending.push(WriteContext::new(namespace, key, value));
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let mut data = self.data.write().map_err(|_| anyhow!("store lock poisoned"))?;
        for WriteContext {
            namespace,
            key,
            value,
        } in self.pending
        {
            data.entry(namespace).or_default().insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    #[tokio::test]
    async fn read_write_delete() {
        let store = MemStore::new();

        store.write("credential", "key-1", b"value-1".to_vec()).await.expect("should write");
        let got = store.read("credential", "key-1").await.expect("should read");
        assert_eq!(got, Some(b"value-1".to_vec()));

        store.delete("credential", "key-1").await.expect("should delete");
        assert_eq!(store.read("credential", "key-1").await.expect("should read"), None);

        // absent namespace and key are not errors
        assert_eq!(store.read("nope", "key").await.expect("should read"), None);
        store.delete("nope", "key").await.expect("should delete");
    }

    #[tokio::test]
    async fn prefix_scan_is_ordered() {
        let store = MemStore::new();
        store.write("ns", "b-2", b"2".to_vec()).await.expect("should write");
        store.write("ns", "a-1", b"1".to_vec()).await.expect("should write");
        store.write("ns", "a-3", b"3".to_vec()).await.expect("should write");

        let matched = store.read_prefix("ns", "a-").await.expect("should scan");
        assert_eq!(
            matched.keys().cloned().collect::<Vec<_>>(),
            vec!["a-1".to_string(), "a-3".to_string()]
        );

        let keys = store.read_all_keys("ns").await.expect("should list");
        assert_eq!(keys, vec!["a-1", "a-3", "b-2"]);
    }

    #[tokio::test]
    async fn transaction_read_your_writes() {
        let store = MemStore::new();
        store.write("ns", "key", b"committed".to_vec()).await.expect("should write");

        let mut tx = store.begin().await.expect("should begin");
        assert_eq!(
            tx.read_tx("ns", "key").expect("should read"),
            Some(b"committed".to_vec())
        );

        tx.write_tx("ns", "key", b"pending".to_vec()).expect("should write");
        assert_eq!(tx.read_tx("ns", "key").expect("should read"), Some(b"pending".to_vec()));

        tx.commit().expect("should commit");
        assert_eq!(
            store.read("ns", "key").await.expect("should read"),
            Some(b"pending".to_vec())
        );
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemStore::new();

        let mut tx = store.begin().await.expect("should begin");
        tx.write_tx("ns", "key", b"pending".to_vec()).expect("should write");
        drop(tx);

        assert_eq!(store.read("ns", "key").await.expect("should read"), None);
    }

    #[tokio::test]
    async fn execute_commits_on_ok_rolls_back_on_err() {
        let store = MemStore::new();

        store
            .execute(|tx| {
                tx.write_tx("ns", "key", b"one".to_vec())?;
                Ok(())
            })
            .await
            .expect("should commit");
        assert_eq!(store.read("ns", "key").await.expect("should read"), Some(b"one".to_vec()));

        let result: Result<()> = store
            .execute(|tx| {
                tx.write_tx("ns", "key", b"two".to_vec())?;
                Err(anyhow!("business logic failed"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.read("ns", "key").await.expect("should read"), Some(b"one".to_vec()));
    }

    #[tokio::test]
    async fn write_many_is_atomic() {
        let store = MemStore::new();
        store
            .write_many(vec![
                WriteContext::new("ns-1", "a", b"1".to_vec()),
                WriteContext::new("ns-2", "b", b"2".to_vec()),
            ])
            .await
            .expect("should write");

        assert_eq!(store.read("ns-1", "a").await.expect("should read"), Some(b"1".to_vec()));
        assert_eq!(store.read("ns-2", "b").await.expect("should read"), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn update_value_and_operation() {
        let store = MemStore::new();
        let record = serde_json::to_vec(&json!({"id": "cred-1", "revoked": false}))
            .expect("should serialize");
        store.write("credential", "cred-1", record).await.expect("should write");

        let mut update = Map::new();
        update.insert("revoked".into(), Value::Bool(true));

        let (updated, op) = Store::update_value_and_operation(
            &store,
            "credential",
            "cred-1",
            update,
            "status-list-credential",
            "list-1",
            |updated, _existing| {
                let parsed: Value = serde_json::from_slice(updated)?;
                assert_eq!(parsed["revoked"], Value::Bool(true));
                Ok(b"resigned list".to_vec())
            },
        )
        .await
        .expect("should update");

        let parsed: Value = serde_json::from_slice(&updated).expect("should parse");
        assert_eq!(parsed["revoked"], Value::Bool(true));
        assert_eq!(op, b"resigned list".to_vec());
        assert_eq!(
            store.read("status-list-credential", "list-1").await.expect("should read"),
            Some(b"resigned list".to_vec())
        );
    }

    #[tokio::test]
    async fn update_missing_key_fails_atomically() {
        let store = MemStore::new();
        let result = Store::update_value_and_operation(
            &store,
            "credential",
            "missing",
            Map::new(),
            "ns",
            "key",
            |_, _| Ok(vec![]),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(store.read("ns", "key").await.expect("should read"), None);
    }
}
