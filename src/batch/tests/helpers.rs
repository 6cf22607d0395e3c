use std::collections::BTreeMap;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::batch::{BatchOptions, IndexedBatch};
use crate::index::IndexType;
use crate::store::{
    BaseIterator, MergeOperator, ReadOptions, Store, StoreError, UserComparator,
};

/// Initialize tracing controlled by `RUST_LOG`. Safe to call multiple
/// times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Batch in overwrite mode with the given index structure.
pub fn overwrite_batch_with(index_type: IndexType) -> IndexedBatch {
    init_tracing();
    IndexedBatch::new(BatchOptions {
        overwrite_key: true,
        index_type,
        ..BatchOptions::default()
    })
}

/// Batch in overwrite mode with the default index structure.
pub fn overwrite_batch() -> IndexedBatch {
    overwrite_batch_with(IndexType::default())
}

/// Batch with duplicate keys allowed.
pub fn multi_version_batch() -> IndexedBatch {
    init_tracing();
    IndexedBatch::new(BatchOptions::default())
}

// ------------------------------------------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------------------------------------------

/// `BTreeMap`-backed [`Store`] with optional merge operator, standing
/// in for a real engine.
#[derive(Default)]
pub struct MemStore {
    columns: BTreeMap<u32, BTreeMap<Vec<u8>, Vec<u8>>>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merge_operator(operator: Arc<dyn MergeOperator>) -> Self {
        Self {
            columns: BTreeMap::new(),
            merge_operator: Some(operator),
        }
    }

    pub fn insert(&mut self, column_id: u32, key: &[u8], value: &[u8]) {
        self.columns
            .entry(column_id)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
    }
}

impl Store for MemStore {
    fn get(
        &self,
        _options: &ReadOptions,
        column_id: u32,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .columns
            .get(&column_id)
            .and_then(|column| column.get(key))
            .cloned())
    }

    fn new_iterator(&self, _options: &ReadOptions, column_id: u32) -> Box<dyn BaseIterator + '_> {
        let entries = self
            .columns
            .get(&column_id)
            .map(|column| {
                column
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Box::new(MemStoreIterator {
            entries,
            position: None,
        })
    }

    fn column_user_comparator(&self, _column_id: u32) -> Option<Arc<dyn UserComparator>> {
        None
    }

    fn column_merge_operator(&self, _column_id: u32) -> Option<Arc<dyn MergeOperator>> {
        self.merge_operator.clone()
    }
}

/// Iterator over a materialized snapshot of one column.
pub struct MemStoreIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
}

impl BaseIterator for MemStoreIterator {
    fn seek_to_first(&mut self) {
        self.position = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.position = self.entries.len().checked_sub(1);
    }

    fn seek(&mut self, key: &[u8]) {
        let index = self
            .entries
            .partition_point(|(entry_key, _)| entry_key.as_slice() < key);
        self.position = (index < self.entries.len()).then_some(index);
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        let index = self
            .entries
            .partition_point(|(entry_key, _)| entry_key.as_slice() <= key);
        self.position = index.checked_sub(1);
    }

    fn next(&mut self) {
        if let Some(position) = self.position {
            self.position = (position + 1 < self.entries.len()).then_some(position + 1);
        }
    }

    fn prev(&mut self) {
        self.position = self.position.and_then(|position| position.checked_sub(1));
    }

    fn valid(&self) -> bool {
        self.position.is_some()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.position.expect("key() on invalid iterator")].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.position.expect("value() on invalid iterator")].1
    }

    fn status(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Merge operators
// ------------------------------------------------------------------------------------------------

/// Sums decimal integers: existing value plus each operand (an operand
/// may carry a leading `+`).
pub struct IntegerSumMerge;

impl MergeOperator for IntegerSumMerge {
    fn name(&self) -> &'static str {
        "integer-sum"
    }

    fn full_merge(
        &self,
        _key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Option<Vec<u8>> {
        fn parse(bytes: &[u8]) -> Option<i64> {
            let text = std::str::from_utf8(bytes).ok()?;
            text.strip_prefix('+').unwrap_or(text).parse().ok()
        }
        let mut total = match existing {
            Some(value) => parse(value)?,
            None => 0,
        };
        for operand in operands {
            total += parse(operand)?;
        }
        Some(total.to_string().into_bytes())
    }
}

/// A store whose `get` always fails, for error-propagation tests.
pub struct FailingStore;

impl Store for FailingStore {
    fn get(
        &self,
        _options: &ReadOptions,
        _column_id: u32,
        _key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Io("disk on fire".into()))
    }

    fn new_iterator(&self, _options: &ReadOptions, _column_id: u32) -> Box<dyn BaseIterator + '_> {
        Box::new(MemStoreIterator {
            entries: Vec::new(),
            position: None,
        })
    }

    fn column_user_comparator(&self, _column_id: u32) -> Option<Arc<dyn UserComparator>> {
        None
    }

    fn column_merge_operator(&self, _column_id: u32) -> Option<Arc<dyn MergeOperator>> {
        None
    }
}
