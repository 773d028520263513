//! Fixed-size batching over a pre-loaded, finite collection of records.

use std::fs;
use std::iter::FusedIterator;
use std::path::Path;

use sea_orm::JsonValue;
use tracing::debug;

use crate::error::StoreError;
use crate::row::Row;

/// A bounded group of consecutive records.
pub type Batch<T> = Vec<T>;

/// Lazy iterator of consecutive batches; the last one holds the remainder.
#[derive(Debug, Clone)]
pub struct Batches<I> {
    records: I,
    batch_size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Batch<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Batch<I::Item> = self.records.by_ref().take(self.batch_size).collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.records.size_hint();
        (
            lo.div_ceil(self.batch_size),
            hi.map(|h| h.div_ceil(self.batch_size)),
        )
    }
}

impl<I: FusedIterator> FusedIterator for Batches<I> {}

/// Re-group `source` into batches of `batch_size` records.
///
/// Nothing is copied up front; each batch is assembled when it is pulled. The final
/// batch is never padded, and an empty source yields no batches at all.
pub fn stream_in_batches<S>(
    source: S,
    batch_size: usize,
) -> Result<Batches<S::IntoIter>, StoreError>
where
    S: IntoIterator,
{
    if batch_size == 0 {
        return Err(StoreError::InvalidBatchSize { size: batch_size });
    }
    Ok(Batches {
        records: source.into_iter(),
        batch_size,
    })
}

/// Load a JSON array of objects from disk.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Row>, StoreError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let records = match serde_json::from_str::<JsonValue>(&text) {
        Ok(JsonValue::Array(items)) => items
            .into_iter()
            .map(Row::from_json)
            .collect::<Result<Vec<_>, _>>()?,
        Ok(_) => {
            return Err(StoreError::decode(format!(
                "{} must contain a JSON array of objects",
                path.display()
            )))
        }
        Err(e) => {
            return Err(StoreError::decode(format!(
                "{} is not valid JSON: {e}",
                path.display()
            )))
        }
    };

    debug!(path = %path.display(), records = records.len(), "records=loaded");
    Ok(records)
}

/// Load a record file and batch it.
pub fn stream_file_in_batches(
    path: impl AsRef<Path>,
    batch_size: usize,
) -> Result<Batches<std::vec::IntoIter<Row>>, StoreError> {
    if batch_size == 0 {
        return Err(StoreError::InvalidBatchSize { size: batch_size });
    }
    stream_in_batches(load_records(path)?, batch_size)
}

/// Flatten batches lazily, keeping the records `predicate` accepts.
pub fn matching_rows<B, T, P>(batches: B, mut predicate: P) -> impl Iterator<Item = T>
where
    B: IntoIterator<Item = Batch<T>>,
    P: FnMut(&T) -> bool,
{
    batches
        .into_iter()
        .flat_map(Vec::into_iter)
        .filter(move |record| predicate(record))
}
