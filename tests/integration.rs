//! End-to-end scenarios: an indexed batch working against an in-memory
//! store through the public API only.

use std::collections::BTreeMap;
use std::sync::Arc;

use tabula::batch::{BatchError, BatchGetResult, BatchOptions, IndexedBatch};
use tabula::store::{
    BaseIterator, MergeOperator, ReadOptions, Store, StoreError, UserComparator,
};

// ------------------------------------------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------------------------------------------

#[derive(Default)]
struct MemStore {
    columns: BTreeMap<u32, BTreeMap<Vec<u8>, Vec<u8>>>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl MemStore {
    fn insert(&mut self, column_id: u32, key: &[u8], value: &[u8]) {
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
        Box::new(SnapshotIterator {
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

struct SnapshotIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
}

impl BaseIterator for SnapshotIterator {
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

struct IntegerSumMerge;

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

fn overwrite_batch() -> IndexedBatch {
    IndexedBatch::new(BatchOptions {
        overwrite_key: true,
        ..BatchOptions::default()
    })
}

// ------------------------------------------------------------------------------------------------
// Scenarios
// ------------------------------------------------------------------------------------------------

/// Overwrite mode folds repeated writes into one slot; collapse drops
/// the superseded record from the shipped log.
#[test]
fn basic_overwrite_and_collapse() {
    let mut batch = overwrite_batch();
    batch.put(b"a", b"1").unwrap();
    batch.put(b"a", b"2").unwrap();
    batch.put(b"b", b"3").unwrap();

    assert_eq!(
        batch.get_from_batch(b"a").unwrap(),
        BatchGetResult::Found(b"2".to_vec()),
    );
    assert_eq!(
        batch.get_from_batch(b"b").unwrap(),
        BatchGetResult::Found(b"3".to_vec()),
    );

    assert!(batch.collapse().unwrap());
    assert_eq!(batch.len(), 2);
    assert_eq!(
        batch.get_from_batch(b"a").unwrap(),
        BatchGetResult::Found(b"2".to_vec()),
    );
}

/// A merged scan masks deleted base keys and shadows updated ones.
#[test]
fn tombstone_masking_over_a_store_view() {
    let mut store = MemStore::default();
    store.insert(0, b"a", b"X");
    store.insert(0, b"b", b"Y");
    store.insert(0, b"c", b"Z");

    let mut batch = overwrite_batch();
    batch.delete(b"b").unwrap();
    batch.put(b"c", b"Z2").unwrap();

    let options = ReadOptions::default();
    let base = store.new_iterator(&options, 0);
    let mut merged = batch.new_merged_iterator(base).unwrap();

    let mut scanned = Vec::new();
    merged.seek_to_first();
    while merged.valid() {
        scanned.push((merged.key().to_vec(), merged.value().to_vec()));
        merged.next();
    }
    assert_eq!(
        scanned,
        vec![
            (b"a".to_vec(), b"X".to_vec()),
            (b"c".to_vec(), b"Z2".to_vec()),
        ],
    );
    merged.status().unwrap();
}

/// Direction reversal across a batch key interleaved between two store
/// keys.
#[test]
fn direction_flip_over_interleaved_keys() {
    let mut store = MemStore::default();
    store.insert(0, b"k", b"a");
    store.insert(0, b"n", b"b");

    let mut batch = overwrite_batch();
    batch.put(b"m", b"v").unwrap();

    let options = ReadOptions::default();
    let mut merged = batch
        .new_merged_iterator(store.new_iterator(&options, 0))
        .unwrap();

    merged.seek_to_first();
    assert_eq!(merged.key(), b"k");
    merged.next();
    assert_eq!(merged.key(), b"m");
    merged.next();
    assert_eq!(merged.key(), b"n");
    merged.prev();
    assert_eq!(merged.key(), b"m");
    merged.prev();
    assert_eq!(merged.key(), b"k");
    merged.status().unwrap();
}

/// Rolling back to a save point rebuilds the index from the surviving
/// records.
#[test]
fn rollback_rebuilds_the_index() {
    let mut batch = overwrite_batch();
    batch.put(b"x", b"1").unwrap();
    batch.set_save_point();
    batch.put(b"y", b"2").unwrap();
    batch.delete(b"x").unwrap();

    batch.rollback_to_save_point().unwrap();
    assert_eq!(
        batch.get_from_batch(b"x").unwrap(),
        BatchGetResult::Found(b"1".to_vec()),
    );
    assert_eq!(batch.get_from_batch(b"y").unwrap(), BatchGetResult::NotFound);
}

/// Batch operands compose with the store's value through the merge
/// operator.
#[test]
fn merge_resolves_over_the_store() {
    let mut store = MemStore {
        merge_operator: Some(Arc::new(IntegerSumMerge)),
        ..MemStore::default()
    };
    store.insert(0, b"k", b"10");

    let mut batch = IndexedBatch::new(BatchOptions::default());
    batch.merge(b"k", b"+5").unwrap();
    batch.merge(b"k", b"+2").unwrap();

    assert_eq!(
        batch
            .get_from_batch_and_store(&store, &ReadOptions::default(), b"k")
            .unwrap(),
        Some(b"17".to_vec()),
    );
}

/// In overwrite mode a second merge on the same key is refused unless
/// explicitly allowed.
#[test]
fn duplicate_merge_is_rejected() {
    let mut batch = overwrite_batch();
    batch.merge(b"k", b"a").unwrap();

    let result = batch.merge(b"k", b"b");
    assert!(matches!(result, Err(BatchError::Unsupported(_))));
}

/// The shipped log round-trips through clear and reuse.
#[test]
fn batch_lifecycle() {
    let mut batch = overwrite_batch();
    batch.put(b"k", b"v").unwrap();
    let shipped = batch.record_log().data().to_vec();
    assert!(!shipped.is_empty());

    batch.clear();
    assert!(batch.is_empty());

    batch.put(b"k2", b"v2").unwrap();
    assert_eq!(
        batch.get_from_batch(b"k2").unwrap(),
        BatchGetResult::Found(b"v2".to_vec()),
    );
    assert_eq!(batch.get_from_batch(b"k").unwrap(), BatchGetResult::NotFound);
}
