//! # Indexed batch façade
//!
//! [`IndexedBatch`] owns the three pieces that make a batch readable by
//! key: the append-only [`RecordLog`], the [`Arena`] of index entries,
//! and the [`OrderedIndex`] over them. Every mutation appends a record
//! and then either redirects an existing index entry in place (overwrite
//! mode) or allocates and inserts a fresh one.
//!
//! ## Overwrite mode
//!
//! With `overwrite_key` on, each `(column, key)` keeps a single live
//! index entry; superseded records stay in the log with their offsets
//! parked in `obsolete_offsets` until [`IndexedBatch::collapse`]
//! physically rewrites the log without them. Overwrite mode is also the
//! prerequisite for merged iterators.
//!
//! ## Save points
//!
//! [`IndexedBatch::set_save_point`] snapshots the log;
//! [`IndexedBatch::rollback_to_save_point`] truncates back to the
//! snapshot and rebuilds the index from the surviving records, since
//! entry offsets past the snapshot are gone.
//!
//! ## Reads
//!
//! Point lookups scan the batch's records for the key newest-first
//! ([`IndexedBatch::get_from_batch`]), optionally falling through to a
//! [`Store`] and resolving accumulated merge operands
//! ([`IndexedBatch::get_from_batch_and_store`]). Ordered reads go
//! through [`IndexedBatch::new_iterator`] (batch only) or
//! [`IndexedBatch::new_merged_iterator`] (batch overlaid on a store
//! view).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::index::{
    Arena, EntryComparator, IndexContext, IndexEntry, IndexType, OrderedIndex,
};
use crate::iterator::{BatchIterator, MergedIterator};
use crate::record::{
    self, Record, RecordKind, RecordLog, RecordLogError, LOG_HEADER_SIZE,
};
use crate::store::{
    BaseIterator, BytewiseComparator, ReadOptions, Store, StoreError, UserComparator,
};

/// Column id of the default column.
pub const DEFAULT_COLUMN: u32 = 0;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by batch operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Failure at the record log layer (size cap, missing save point).
    #[error("record log error: {0}")]
    Log(#[from] RecordLogError),

    /// The log bytes no longer decode to what the index promises.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The call is malformed for the batch's configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not supported in the batch's current mode.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Pending merge operands cannot be resolved from the batch alone.
    #[error("merge in progress: operand history is incomplete")]
    MergeInProgress,

    /// Failure forwarded from the underlying store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`IndexedBatch`], fixed at construction.
pub struct BatchOptions {
    /// Comparator for any column without an explicit registration.
    pub default_comparator: Arc<dyn UserComparator>,

    /// Initial log capacity in bytes.
    pub reserved_bytes: usize,

    /// Hard cap on the log size; 0 disables the cap. A mutation that
    /// would exceed it fails without touching log or index.
    pub max_bytes: usize,

    /// Keep a single live index entry per `(column, key)`, redirecting
    /// it in place on re-writes. Required for merged iterators.
    pub overwrite_key: bool,

    /// Ordered structure backing the index.
    pub index_type: IndexType,

    /// Allow `merge` to overwrite an existing entry for the same key.
    /// Off by default: overwriting silently discards the operand the
    /// new one would have to compose with.
    pub allow_duplicate_merge: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            default_comparator: Arc::new(BytewiseComparator),
            reserved_bytes: 0,
            max_bytes: 0,
            overwrite_key: false,
            index_type: IndexType::default(),
            allow_duplicate_merge: false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Point lookup result
// ------------------------------------------------------------------------------------------------

/// Outcome of a batch-only point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchGetResult {
    /// The batch's newest record for the key is a put with this value.
    Found(Vec<u8>),

    /// The batch's newest record for the key is a tombstone.
    Deleted,

    /// The batch holds no record for the key.
    NotFound,

    /// The batch holds only merge operands for the key, in application
    /// (oldest-first) order; resolution needs the store's value.
    MergeInProgress {
        /// Accumulated operands, oldest first.
        operands: Vec<Vec<u8>>,
    },
}

// ------------------------------------------------------------------------------------------------
// Indexed batch
// ------------------------------------------------------------------------------------------------

/// An in-memory write batch with a secondary ordered index.
///
/// Single-writer: `&mut self` mutations, `&self` reads. Iterators borrow
/// the batch immutably, so the borrow checker enforces the
/// no-mutation-while-iterating contract.
pub struct IndexedBatch {
    /// Append-only log of encoded records; shipped verbatim on commit.
    log: RecordLog,

    /// Storage for index entries.
    arena: Arena,

    /// Ordered index over the arena's entries.
    index: OrderedIndex,

    /// Entry ordering, with per-column user comparator overrides.
    comparator: EntryComparator,

    /// See [`BatchOptions::overwrite_key`].
    overwrite_key: bool,

    /// See [`BatchOptions::allow_duplicate_merge`].
    allow_duplicate_merge: bool,

    /// Structure to recreate on index rebuilds.
    index_type: IndexType,

    /// Offset of the record appended by the mutation in progress.
    last_entry_offset: usize,

    /// Offsets of records superseded by overwrite-mode updates; removed
    /// from the log by [`IndexedBatch::collapse`].
    obsolete_offsets: Vec<usize>,
}

impl IndexedBatch {
    /// Create an empty batch.
    pub fn new(options: BatchOptions) -> Self {
        Self {
            log: RecordLog::new(options.reserved_bytes, options.max_bytes),
            arena: Arena::new(),
            index: OrderedIndex::new(options.index_type),
            comparator: EntryComparator::new(options.default_comparator),
            overwrite_key: options.overwrite_key,
            allow_duplicate_merge: options.allow_duplicate_merge,
            index_type: options.index_type,
            last_entry_offset: 0,
            obsolete_offsets: Vec::new(),
        }
    }

    /// Whether overwrite mode is on.
    pub fn overwrite_key(&self) -> bool {
        self.overwrite_key
    }

    /// The structure backing the index.
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// Number of key-bearing records in the log.
    pub fn len(&self) -> usize {
        self.log.count() as usize
    }

    /// Whether the batch holds no key-bearing records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw record log, for shipment to a store.
    pub fn record_log(&self) -> &RecordLog {
        &self.log
    }

    /// Register the user comparator for one column. Takes effect for
    /// all subsequent comparisons; must be called before the column's
    /// first mutation to keep the index order consistent.
    pub fn set_comparator_for_column(
        &mut self,
        column_id: u32,
        comparator: Arc<dyn UserComparator>,
    ) {
        self.comparator
            .set_comparator_for_column(column_id, comparator);
    }

    // --------------------------------------------------------------------------------------------
    // Mutations
    // --------------------------------------------------------------------------------------------

    /// Stage a put in the default column.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BatchError> {
        self.put_in_column(DEFAULT_COLUMN, key, value)
    }

    /// Stage a put in the given column.
    pub fn put_in_column(
        &mut self,
        column_id: u32,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BatchError> {
        trace!(column_id, key = %HexKey(key), "put");
        self.last_entry_offset = self.log.size();
        self.log.append_record(&Record::Put {
            column_id,
            key,
            value,
        })?;
        self.add_or_update_index(column_id)?;
        Ok(())
    }

    /// Stage a point deletion in the default column.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), BatchError> {
        self.delete_in_column(DEFAULT_COLUMN, key)
    }

    /// Stage a point deletion in the given column.
    pub fn delete_in_column(&mut self, column_id: u32, key: &[u8]) -> Result<(), BatchError> {
        trace!(column_id, key = %HexKey(key), "delete");
        self.last_entry_offset = self.log.size();
        self.log.append_record(&Record::Delete { column_id, key })?;
        self.add_or_update_index(column_id)?;
        Ok(())
    }

    /// Stage a single-delete in the default column.
    pub fn single_delete(&mut self, key: &[u8]) -> Result<(), BatchError> {
        self.single_delete_in_column(DEFAULT_COLUMN, key)
    }

    /// Stage a single-delete in the given column.
    pub fn single_delete_in_column(
        &mut self,
        column_id: u32,
        key: &[u8],
    ) -> Result<(), BatchError> {
        trace!(column_id, key = %HexKey(key), "single_delete");
        self.last_entry_offset = self.log.size();
        self.log
            .append_record(&Record::SingleDelete { column_id, key })?;
        self.add_or_update_index(column_id)?;
        Ok(())
    }

    /// Stage a range deletion of `[begin_key, end_key)` in the default
    /// column.
    pub fn delete_range(&mut self, begin_key: &[u8], end_key: &[u8]) -> Result<(), BatchError> {
        self.delete_range_in_column(DEFAULT_COLUMN, begin_key, end_key)
    }

    /// Stage a range deletion of `[begin_key, end_key)` in the given
    /// column. The record is indexed under `begin_key`.
    pub fn delete_range_in_column(
        &mut self,
        column_id: u32,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<(), BatchError> {
        trace!(column_id, begin = %HexKey(begin_key), end = %HexKey(end_key), "delete_range");
        self.last_entry_offset = self.log.size();
        self.log.append_record(&Record::DeleteRange {
            column_id,
            begin_key,
            end_key,
        })?;
        self.add_or_update_index(column_id)?;
        Ok(())
    }

    /// Stage a merge operand in the default column.
    pub fn merge(&mut self, key: &[u8], value: &[u8]) -> Result<(), BatchError> {
        self.merge_in_column(DEFAULT_COLUMN, key, value)
    }

    /// Stage a merge operand in the given column.
    ///
    /// In overwrite mode a merge that would supersede an existing entry
    /// for the key fails with `Unsupported` unless
    /// [`BatchOptions::allow_duplicate_merge`] is set: the in-place
    /// overwrite would silently discard the operand the new one must
    /// compose with.
    pub fn merge_in_column(
        &mut self,
        column_id: u32,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BatchError> {
        trace!(column_id, key = %HexKey(key), "merge");
        self.last_entry_offset = self.log.size();
        self.log.append_record(&Record::Merge {
            column_id,
            key,
            value,
        })?;
        let updated = self.add_or_update_index(column_id)?;
        if updated && !self.allow_duplicate_merge {
            return Err(BatchError::Unsupported(
                "duplicate key with merge value".into(),
            ));
        }
        Ok(())
    }

    /// Append an opaque blob alongside the mutations. Never indexed and
    /// not counted as a record.
    pub fn put_log_data(&mut self, blob: &[u8]) -> Result<(), BatchError> {
        self.log.append_record(&Record::LogData { blob })?;
        Ok(())
    }

    /// Drop every staged mutation and reset the index.
    pub fn clear(&mut self) {
        self.log.clear();
        self.clear_index();
        self.obsolete_offsets.clear();
    }

    /// Change the log's size cap; 0 disables it.
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.log.set_max_bytes(max_bytes);
    }

    // --------------------------------------------------------------------------------------------
    // Save points
    // --------------------------------------------------------------------------------------------

    /// Snapshot the log for a later rollback.
    pub fn set_save_point(&mut self) {
        self.log.set_save_point();
    }

    /// Discard every mutation staged since the most recent save point
    /// and rebuild the index from the surviving log.
    pub fn rollback_to_save_point(&mut self) -> Result<(), BatchError> {
        self.log.rollback_to_save_point()?;
        debug!(size = self.log.size(), count = self.log.count(), "rolled back to save point");
        self.rebuild_index()
    }

    /// Drop the most recent save point without rolling back.
    pub fn pop_save_point(&mut self) -> Result<(), BatchError> {
        self.log.pop_save_point()?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Collapse & rebuild
    // --------------------------------------------------------------------------------------------

    /// Physically remove superseded records from the log.
    ///
    /// Returns `Ok(false)` without touching anything when no record has
    /// been superseded. Otherwise rewrites the log keeping only live
    /// records, resets the obsolete list, rebuilds the index against the
    /// new offsets, and returns `Ok(true)`.
    pub fn collapse(&mut self) -> Result<bool, BatchError> {
        if self.obsolete_offsets.is_empty() {
            return Ok(false);
        }
        self.obsolete_offsets.sort_unstable();

        let (collapsed, count) = {
            let data = self.log.data();
            let mut collapsed = Vec::with_capacity(data.len());
            collapsed.extend_from_slice(&data[..LOG_HEADER_SIZE]);
            let mut count: u32 = 0;
            let mut obsolete_index = 0;
            let mut cursor = LOG_HEADER_SIZE;
            while cursor < data.len() {
                let record_offset = cursor;
                let record = record::read_record(data, &mut cursor)
                    .map_err(|error| BatchError::Corruption(error.to_string()))?;
                if obsolete_index < self.obsolete_offsets.len()
                    && self.obsolete_offsets[obsolete_index] == record_offset
                {
                    obsolete_index += 1;
                    continue;
                }
                if record.kind().is_key_bearing() {
                    count += 1;
                }
                collapsed.extend_from_slice(&data[record_offset..cursor]);
            }
            (collapsed, count)
        };

        debug!(
            dropped = self.obsolete_offsets.len(),
            remaining = count,
            "collapsed record log"
        );
        self.log.install(collapsed, count);
        self.rebuild_index()?;
        Ok(true)
    }

    /// Rebuild arena and index by re-reading every record in the log.
    ///
    /// The obsolete list is recomputed along the way: records shadowed
    /// by a later record for the same key are parked again, exactly as
    /// if the surviving log had been staged mutation by mutation.
    fn rebuild_index(&mut self) -> Result<(), BatchError> {
        self.clear_index();
        self.obsolete_offsets.clear();
        if self.log.count() == 0 {
            return Ok(());
        }

        let mut found: u32 = 0;
        let mut cursor = LOG_HEADER_SIZE;
        while cursor < self.log.size() {
            self.last_entry_offset = cursor;
            let (kind, column_id) = {
                let record = record::read_record(self.log.data(), &mut cursor)
                    .map_err(|error| BatchError::Corruption(error.to_string()))?;
                (record.kind(), record.column_id())
            };
            if kind.is_key_bearing() {
                found += 1;
                self.add_or_update_index(column_id)?;
            }
        }

        if found != self.log.count() {
            return Err(BatchError::Corruption(
                "record log has wrong count".into(),
            ));
        }
        debug!(records = found, "rebuilt index");
        Ok(())
    }

    fn clear_index(&mut self) {
        self.arena.clear();
        self.index = OrderedIndex::new(self.index_type);
        self.last_entry_offset = 0;
    }

    // --------------------------------------------------------------------------------------------
    // Index maintenance
    // --------------------------------------------------------------------------------------------

    /// Index the record at `last_entry_offset`: redirect the existing
    /// entry for the key in overwrite mode, or insert a fresh one.
    ///
    /// Returns whether an existing entry was updated in place.
    fn add_or_update_index(&mut self, column_id: u32) -> Result<bool, BatchError> {
        let mut cursor = self.last_entry_offset;
        let (key_offset, key_length) =
            record::read_key_from_record(self.log.data(), &mut cursor, column_id != 0)
                .map_err(|error| BatchError::Corruption(error.to_string()))?;
        if self.update_existing_entry(column_id, key_offset, key_length) {
            return Ok(true);
        }
        let entry_ref = self.arena.alloc(IndexEntry {
            column_id,
            log_offset: self.last_entry_offset,
            key_offset,
            key_length,
        });
        let ctx = IndexContext {
            log: self.log.data(),
            arena: &self.arena,
            comparator: &self.comparator,
        };
        self.index.insert(entry_ref, &ctx);
        Ok(false)
    }

    /// In overwrite mode, redirect the live entry for the key at
    /// `(key_offset, key_length)` to `last_entry_offset`, parking the
    /// superseded record's offset in the obsolete list.
    fn update_existing_entry(
        &mut self,
        column_id: u32,
        key_offset: usize,
        key_length: usize,
    ) -> bool {
        if !self.overwrite_key {
            return false;
        }
        let found = {
            let data = self.log.data();
            let key = &data[key_offset..key_offset + key_length];
            let mut iter = BatchIterator::new(
                column_id,
                &self.log,
                &self.arena,
                &self.index,
                &self.comparator,
            );
            iter.seek(key);
            if iter.valid() {
                let entry = self.arena.entry(iter.raw_entry_ref());
                if self
                    .comparator
                    .compare_user_keys(column_id, key, entry.key(data))
                    == Ordering::Equal
                {
                    Some(iter.raw_entry_ref())
                } else {
                    None
                }
            } else {
                None
            }
        };
        let Some(entry_ref) = found else {
            return false;
        };
        let old_offset = self.arena.entry(entry_ref).log_offset;
        self.obsolete_offsets.push(old_offset);
        self.arena.entry_mut(entry_ref).log_offset = self.last_entry_offset;
        true
    }

    // --------------------------------------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------------------------------------

    /// Ordered iterator over the batch's default column.
    pub fn new_iterator(&self) -> BatchIterator<'_> {
        self.new_iterator_in_column(DEFAULT_COLUMN)
    }

    /// Ordered iterator over one column of the batch.
    pub fn new_iterator_in_column(&self, column_id: u32) -> BatchIterator<'_> {
        BatchIterator::new(
            column_id,
            &self.log,
            &self.arena,
            &self.index,
            &self.comparator,
        )
    }

    /// Overlay the batch's default-column delta on a store iterator.
    pub fn new_merged_iterator<'a>(
        &'a self,
        base: Box<dyn BaseIterator + 'a>,
    ) -> Result<MergedIterator<'a>, BatchError> {
        self.new_merged_iterator_in_column(base, DEFAULT_COLUMN)
    }

    /// Overlay the batch's delta for `column_id` on a store iterator.
    ///
    /// Requires overwrite mode: with duplicate records allowed per key,
    /// their order relative to the base entry is ambiguous without a
    /// merge operator.
    pub fn new_merged_iterator_in_column<'a>(
        &'a self,
        base: Box<dyn BaseIterator + 'a>,
        column_id: u32,
    ) -> Result<MergedIterator<'a>, BatchError> {
        if !self.overwrite_key {
            return Err(BatchError::Unsupported(
                "merged iterators require overwrite mode".into(),
            ));
        }
        let comparator = Arc::clone(self.comparator.comparator_for_column(column_id));
        Ok(MergedIterator::new(
            base,
            self.new_iterator_in_column(column_id),
            comparator,
        ))
    }

    /// Point lookup against the batch alone, in the default column.
    pub fn get_from_batch(&self, key: &[u8]) -> Result<BatchGetResult, BatchError> {
        self.get_from_batch_in_column(DEFAULT_COLUMN, key)
    }

    /// Point lookup against the batch alone.
    ///
    /// Scans the batch's records for the key newest-first: the first
    /// tombstone wins as `Deleted`, the first put wins as `Found`, merge
    /// operands accumulate; with only operands seen the result is
    /// `MergeInProgress`.
    pub fn get_from_batch_in_column(
        &self,
        column_id: u32,
        key: &[u8],
    ) -> Result<BatchGetResult, BatchError> {
        let mut iter = self.new_iterator_in_column(column_id);
        iter.seek_for_prev(key);
        let mut operands: Vec<Vec<u8>> = Vec::new();
        while iter.valid() {
            let entry = iter
                .entry()
                .map_err(|error| BatchError::Corruption(error.to_string()))?;
            if self
                .comparator
                .compare_user_keys(column_id, entry.key, key)
                != Ordering::Equal
            {
                break;
            }
            match entry.kind {
                RecordKind::Put => return Ok(BatchGetResult::Found(entry.value.to_vec())),
                RecordKind::Delete | RecordKind::SingleDelete => {
                    return Ok(BatchGetResult::Deleted)
                }
                // A range tombstone indexed here starts exactly at the
                // looked-up key, which it therefore covers.
                RecordKind::DeleteRange => return Ok(BatchGetResult::Deleted),
                RecordKind::Merge => operands.push(entry.value.to_vec()),
                _ => {
                    return Err(BatchError::Corruption(
                        "non-indexable record reached through the index".into(),
                    ))
                }
            }
            iter.prev();
        }
        if operands.is_empty() {
            Ok(BatchGetResult::NotFound)
        } else {
            // Collected newest-first; hand back in application order.
            operands.reverse();
            Ok(BatchGetResult::MergeInProgress { operands })
        }
    }

    /// Point lookup through the batch and then the store, in the
    /// default column. `Ok(None)` means not found or deleted.
    pub fn get_from_batch_and_store<S: Store + ?Sized>(
        &self,
        store: &S,
        options: &ReadOptions,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, BatchError> {
        self.get_from_batch_and_store_in_column(store, options, DEFAULT_COLUMN, key)
    }

    /// Point lookup through the batch and then the store.
    ///
    /// The batch shadows the store; accumulated merge operands are
    /// resolved against the store's value with the column's merge
    /// operator. In overwrite mode pending operands cannot be resolved —
    /// earlier operands for the key may already have been overwritten —
    /// so the lookup fails with [`BatchError::MergeInProgress`].
    pub fn get_from_batch_and_store_in_column<S: Store + ?Sized>(
        &self,
        store: &S,
        options: &ReadOptions,
        column_id: u32,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, BatchError> {
        let operands = match self.get_from_batch_in_column(column_id, key)? {
            BatchGetResult::Found(value) => return Ok(Some(value)),
            BatchGetResult::Deleted => return Ok(None),
            BatchGetResult::MergeInProgress { .. } if self.overwrite_key => {
                return Err(BatchError::MergeInProgress)
            }
            BatchGetResult::MergeInProgress { operands } => operands,
            BatchGetResult::NotFound => Vec::new(),
        };

        let existing = store.get(options, column_id, key)?;
        if operands.is_empty() {
            return Ok(existing);
        }
        let Some(operator) = store.column_merge_operator(column_id) else {
            return Err(BatchError::InvalidArgument(
                "a merge operator must be configured for columns with merge operands".into(),
            ));
        };
        match operator.full_merge(key, existing.as_deref(), &operands) {
            Some(value) => Ok(Some(value)),
            None => Err(BatchError::Corruption(
                "merge operator failed to apply operands".into(),
            )),
        }
    }
}

impl Default for IndexedBatch {
    fn default() -> Self {
        Self::new(BatchOptions::default())
    }
}

// ------------------------------------------------------------------------------------------------
// Tracing Helper
// ------------------------------------------------------------------------------------------------

struct HexKey<'a>(&'a [u8]);

impl<'a> std::fmt::Display for HexKey<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = self.0.len().min(24);
        for byte in &self.0[..shown] {
            write!(f, "{byte:02x}")?;
        }
        if self.0.len() > shown {
            write!(f, "..+{}", self.0.len() - shown)?;
        }
        Ok(())
    }
}
