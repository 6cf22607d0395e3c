use tracing_subscriber::EnvFilter;

use crate::batch::{BatchOptions, IndexedBatch};
use crate::iterator::MergedIterator;
use crate::store::{BaseIterator, StoreError};

/// Initialize tracing controlled by `RUST_LOG`. Safe to call multiple
/// times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh batch in overwrite mode (merged iterators require it).
pub fn overwrite_batch() -> IndexedBatch {
    init_tracing();
    IndexedBatch::new(BatchOptions {
        overwrite_key: true,
        ..BatchOptions::default()
    })
}

/// Fresh batch with duplicate keys allowed.
pub fn multi_version_batch() -> IndexedBatch {
    init_tracing();
    IndexedBatch::new(BatchOptions::default())
}

/// In-memory base iterator over a pre-sorted entry list, standing in
/// for a store's point-in-time view.
pub struct VecBaseIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
}

impl VecBaseIterator {
    /// Build from `(key, value)` pairs; sorts them bytewise.
    pub fn new(mut entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        entries.sort();
        Self {
            entries,
            position: None,
        }
    }

    pub fn from_pairs(pairs: &[(&[u8], &[u8])]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(key, value)| (key.to_vec(), value.to_vec()))
                .collect(),
        )
    }
}

impl BaseIterator for VecBaseIterator {
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

/// Forward-scan a merged iterator to exhaustion.
pub fn collect_forward(iter: &mut MergedIterator<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    out
}

/// Backward-scan a merged iterator to exhaustion.
pub fn collect_backward(iter: &mut MergedIterator<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    iter.seek_to_last();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.prev();
    }
    out
}

/// Shorthand for building an owned pair list in expectations.
pub fn pairs(expected: &[(&[u8], &[u8])]) -> Vec<(Vec<u8>, Vec<u8>)> {
    expected
        .iter()
        .map(|(key, value)| (key.to_vec(), value.to_vec()))
        .collect()
}
