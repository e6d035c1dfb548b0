//! # Status-List Index Allocator
//!
//! Hands each revocable credential a random-looking but never-repeating bit
//! position. Two records cooperate: a permutation of `1..=L` shuffled once
//! at first start, and a monotonic cursor into it. `permutation[cursor]` is
//! the next index; allocating advances the cursor by one. Indexes are
//! single-use: deleting a credential never returns its index to the pool.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::status::bitstring::MAX_ENTRIES;
use crate::store::{Store, Transaction, WriteContext};

/// Namespace holding the index pool records.
pub const STATUS_LIST_INDEX_NAMESPACE: &str = "status-list-index";

/// Key of the shuffled permutation record.
pub const STATUS_LIST_INDEXES_KEY: &str = "status-list-indexes";

/// Key of the cursor record.
pub const CURRENT_LIST_INDEX_KEY: &str = "current-list-index";

/// The cursor record: the next unconsumed position in the permutation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct StatusListIndex {
    /// 0-based position into the permutation.
    pub index: usize,
}

/// Seeds the index pool on first start.
///
/// An existing pool is left untouched so index assignment stays stable
/// across restarts.
///
/// # Errors
///
/// Returns `Error::StorageFailure` if the pool cannot be read or written.
pub async fn init<S: Store>(store: &S) -> crate::Result<()> {
    let existing = store
        .read(STATUS_LIST_INDEX_NAMESPACE, STATUS_LIST_INDEXES_KEY)
        .await
        .map_err(Error::storage)?;
    if existing.is_some() {
        tracing::debug!("status list index pool already seeded");
        return Ok(());
    }

    let mut pool: Vec<usize> = (1..=MAX_ENTRIES).collect();
    pool.shuffle(&mut rand::rng());
    let pool_bytes = serde_json::to_vec(&pool)
        .map_err(|e| Error::StorageFailure(format!("could not serialize index pool: {e}")))?;
    let cursor_bytes = serde_json::to_vec(&StatusListIndex::default())
        .map_err(|e| Error::StorageFailure(format!("could not serialize cursor: {e}")))?;

    store
        .write_many(vec![
            WriteContext::new(STATUS_LIST_INDEX_NAMESPACE, STATUS_LIST_INDEXES_KEY, pool_bytes),
            WriteContext::new(STATUS_LIST_INDEX_NAMESPACE, CURRENT_LIST_INDEX_KEY, cursor_bytes),
        ])
        .await
        .map_err(Error::storage)?;

    tracing::debug!("seeded status list index pool with {MAX_ENTRIES} entries");
    Ok(())
}

/// The next status-list index. A pure read: the cursor does not move.
///
/// # Errors
///
/// Returns `Error::Exhausted` when the pool is consumed and
/// `Error::StorageFailure` if either pool record is missing or malformed.
pub fn next_index(tx: &impl Transaction) -> crate::Result<usize> {
    let pool = read_pool(tx)?;
    let cursor = read_cursor(tx)?;

    pool.get(cursor.index).copied().ok_or_else(|| {
        Error::Exhausted(format!("no status list indexes remain (cursor {})", cursor.index))
    })
}

/// Advances the cursor by one through the transaction.
///
/// # Errors
///
/// As for [`increment_context`].
pub fn increment(tx: &mut impl Transaction) -> crate::Result<()> {
    let context = increment_context(tx)?;
    tx.write_many_tx(vec![context]).map_err(Error::storage)
}

/// Prepares the cursor advance as a write descriptor so callers can bundle
/// it with other writes in one atomic batch.
///
/// # Errors
///
/// Returns `Error::Exhausted` when the advanced cursor would pass the end of
/// the pool, and `Error::StorageFailure` if the cursor record is missing or
/// malformed.
pub fn increment_context(tx: &impl Transaction) -> crate::Result<WriteContext> {
    let cursor = read_cursor(tx)?;
    let advanced = cursor.index + 1;
    if advanced > MAX_ENTRIES {
        return Err(Error::Exhausted(format!(
            "status list index cursor cannot advance past {MAX_ENTRIES}"
        )));
    }

    let bytes = serde_json::to_vec(&StatusListIndex { index: advanced })
        .map_err(|e| Error::StorageFailure(format!("could not serialize cursor: {e}")))?;
    Ok(WriteContext::new(STATUS_LIST_INDEX_NAMESPACE, CURRENT_LIST_INDEX_KEY, bytes))
}

fn read_pool(tx: &impl Transaction) -> crate::Result<Vec<usize>> {
    let bytes = tx
        .read_tx(STATUS_LIST_INDEX_NAMESPACE, STATUS_LIST_INDEXES_KEY)
        .map_err(Error::storage)?
        .ok_or_else(|| Error::StorageFailure("status list index pool not seeded".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::StorageFailure(format!("could not deserialize index pool: {e}")))
}

fn read_cursor(tx: &impl Transaction) -> crate::Result<StatusListIndex> {
    let bytes = tx
        .read_tx(STATUS_LIST_INDEX_NAMESPACE, CURRENT_LIST_INDEX_KEY)
        .map_err(Error::storage)?
        .ok_or_else(|| Error::StorageFailure("status list cursor not seeded".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::StorageFailure(format!("could not deserialize cursor: {e}")))
}
