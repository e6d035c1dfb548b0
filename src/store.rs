//! # Key-Value Substrate
//!
//! A namespaced blob store with prefix scans and single-writer transactions.
//! Every key lives inside a string namespace; writes auto-create namespaces
//! and reads of absent namespaces or keys return `None` rather than an
//! error.
//!
//! Backends implement [`Store`] and qualify if they support
//! namespaces-or-equivalent (prefix families), ordered prefix scans, and
//! multi-key transactions with rollback. The in-process reference backend
//! lives in [`memory`].

pub mod memory;

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::bail;
use serde_json::{Map, Value};

use crate::provider::Result;

/// A prepared write: the `(namespace, key, value)` descriptor produced by a
/// component so that several writes can be bundled into one atomic batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteContext {
    /// Namespace the value is written to.
    pub namespace: String,

    /// Key within the namespace.
    pub key: String,

    /// Serialized value.
    pub value: Vec<u8>,
}

impl WriteContext {
    /// Creates a write descriptor.
    #[must_use]
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value,
        }
    }
}

/// An open transaction against a [`Store`].
///
/// Reads observe the transaction's own uncommitted writes (read-your-writes);
/// other readers continue to see committed state until [`commit`] applies the
/// buffered writes atomically. Dropping a transaction without committing
/// rolls it back, including on panic and on future cancellation.
///
/// [`commit`]: Transaction::commit
pub trait Transaction: Send {
    /// Read a value through the transaction. Returns `None` when neither the
    /// transaction nor committed state holds the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read_tx(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Buffer a write to be applied at commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn write_tx(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()>;

    /// Buffer a batch of prepared writes to be applied at commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects any write.
    fn write_many_tx(&mut self, writes: Vec<WriteContext>) -> Result<()> {
        for WriteContext {
            namespace,
            key,
            value,
        } in writes
        {
            self.write_tx(&namespace, &key, value)?;
        }
        Ok(())
    }

    /// Apply all buffered writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot commit; no writes are applied.
    fn commit(self) -> Result<()>;

    /// Discard all buffered writes. Equivalent to dropping the transaction.
    fn rollback(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// The pluggable storage contract.
///
/// All operations are scoped to a string namespace. The store is
/// single-writer: at most one transaction (or standalone mutation) is in
/// flight at a time, which makes cross-transaction isolation serializable.
/// Opening a transaction while the same task already holds one deadlocks;
/// nested transactions are forbidden.
///
/// Plain reads (`read`, `read_prefix`, `read_all_keys`) observe committed
/// state only, and backends must keep them consistent while a transaction
/// is open: committed state cannot change under an open transaction, since
/// the transaction holds the sole writer slot. A transaction's own
/// uncommitted writes are visible only through [`Transaction::read_tx`].
pub trait Store: Clone + Send + Sync {
    /// Transaction handle for this backend.
    type Tx: Transaction;

    /// Read the value at `(namespace, key)`. Absent namespaces and keys
    /// yield `None`.
    fn read(&self, namespace: &str, key: &str)
        -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Write the value at `(namespace, key)`, creating the namespace if
    /// needed.
    fn write(
        &self, namespace: &str, key: &str, value: Vec<u8>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete the key. Deleting an absent key is a no-op.
    fn delete(&self, namespace: &str, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Ordered scan of all keys in the namespace starting with `prefix`,
    /// returned with their values.
    fn read_prefix(
        &self, namespace: &str, prefix: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, Vec<u8>>>> + Send;

    /// Ordered listing of every key in the namespace.
    fn read_all_keys(&self, namespace: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Apply a batch of writes atomically: either every write lands or none
    /// do.
    fn write_many(&self, writes: Vec<WriteContext>) -> impl Future<Output = Result<()>> + Send;

    /// Open a transaction, awaiting the single-writer gate.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    /// An unwind inside `f` also rolls back (the transaction is dropped).
    fn execute<T, F>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        T: Send,
        F: FnOnce(&mut Self::Tx) -> Result<T> + Send,
    {
        async move {
            let mut tx = self.begin().await?;
            match f(&mut tx) {
                Ok(result) => {
                    tx.commit()?;
                    Ok(result)
                }
                Err(e) => {
                    tx.rollback();
                    Err(e)
                }
            }
        }
    }

    /// Within one transaction: load the JSON object at `(namespace, key)`,
    /// merge `update`'s fields into it, write it back, then pass the updated
    /// blob (and the current value at the operation key, if any) to
    /// `op_updater` to produce a second blob written at
    /// `(op_namespace, op_key)`. Fails atomically if either step fails.
    ///
    /// Returns the updated blob and the operation blob.
    fn update_value_and_operation<F>(
        &self, namespace: &str, key: &str, update: Map<String, Value>, op_namespace: &str,
        op_key: &str, op_updater: F,
    ) -> impl Future<Output = Result<(Vec<u8>, Vec<u8>)>> + Send
    where
        F: FnOnce(&[u8], Option<Vec<u8>>) -> Result<Vec<u8>> + Send,
    {
        async move {
            let mut tx = self.begin().await?;

            let Some(current) = tx.read_tx(namespace, key)? else {
                bail!("key not found: {namespace}/{key}");
            };
            let mut model: Map<String, Value> = serde_json::from_slice(&current)?;
            for (k, v) in update {
                model.insert(k, v);
            }
            let updated = serde_json::to_vec(&model)?;
            tx.write_tx(namespace, key, updated.clone())?;

            let existing = tx.read_tx(op_namespace, op_key)?;
            let op_value = op_updater(&updated, existing)?;
            tx.write_tx(op_namespace, op_key, op_value.clone())?;

            tx.commit()?;
            Ok((updated, op_value))
        }
    }
}
