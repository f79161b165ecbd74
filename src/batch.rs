use crate::errors::{BatchError, StoreError};
use crate::store::{Fields, ListQuery, RawRecord, RecordStore};
use tracing::{info, warn};

/// Rows per create/destroy call; the store rejects larger batches.
pub const BATCH_SIZE: usize = 10;

/// Destroys `ids` in batches, stopping at the first failed batch.
pub async fn destroy_in_batches(
    store: &dyn RecordStore,
    table: &str,
    ids: &[String],
) -> Result<usize, BatchError> {
    let total = ids.len().div_ceil(BATCH_SIZE);
    for (index, chunk) in ids.chunks(BATCH_SIZE).enumerate() {
        store
            .destroy(table, chunk)
            .await
            .map_err(|source| batch_failed(table, "destroy", index, total, source))?;
    }
    Ok(ids.len())
}

/// Creates `rows` in batches, stopping at the first failed batch.
pub async fn create_in_batches(
    store: &dyn RecordStore,
    table: &str,
    rows: Vec<Fields>,
) -> Result<Vec<RawRecord>, BatchError> {
    let total = rows.len().div_ceil(BATCH_SIZE);
    let mut created = Vec::with_capacity(rows.len());
    for (index, chunk) in rows.chunks(BATCH_SIZE).enumerate() {
        let records = store
            .create(table, chunk.to_vec())
            .await
            .map_err(|source| batch_failed(table, "create", index, total, source))?;
        created.extend(records);
    }
    Ok(created)
}

/// Removes every row of `table`.
pub async fn clear_table(store: &dyn RecordStore, table: &str) -> Result<usize, BatchError> {
    let ids = existing_ids(store, table).await?;
    let removed = destroy_in_batches(store, table, &ids).await?;
    info!(table, removed, "cleared table");
    Ok(removed)
}

/// Swaps the contents of `table` for `rows`.
///
/// New rows are written before old ones are removed, so an interrupted run
/// leaves duplicates behind rather than an empty table.
pub async fn replace_all(
    store: &dyn RecordStore,
    table: &str,
    rows: Vec<Fields>,
) -> Result<usize, BatchError> {
    let stale = existing_ids(store, table).await?;
    let created = create_in_batches(store, table, rows).await?.len();
    destroy_in_batches(store, table, &stale).await?;
    info!(table, created, removed = stale.len(), "replaced table contents");
    Ok(created)
}

async fn existing_ids(store: &dyn RecordStore, table: &str) -> Result<Vec<String>, BatchError> {
    let rows = store
        .list(table, &ListQuery::all())
        .await
        .map_err(|source| BatchError {
            completed: 0,
            total: 0,
            source,
        })?;
    Ok(rows.into_iter().map(|row| row.id).collect())
}

fn batch_failed(table: &str, op: &str, index: usize, total: usize, source: StoreError) -> BatchError {
    warn!(table, op, batch = index + 1, total, "batch failed: {source}");
    BatchError {
        completed: index,
        total,
        source,
    }
}
