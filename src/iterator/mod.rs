//! Batch-local and merged iterators.
//!
//! [`BatchIterator`] walks the ordered index within a single column and
//! decodes records on demand — it is the *delta* view of the batch.
//! [`MergedIterator`] overlays that delta on a store-provided base
//! iterator, masking tombstones and keeping both sides aligned through
//! direction reversals.
//!
//! Iterators are read-only observers: they borrow the batch immutably,
//! so the borrow checker already rules out mutating the batch while one
//! is live.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

mod merged;

use crate::index::{Arena, EntryComparator, EntryRef, IndexContext, IndexCursor, OrderedIndex, Probe};
use crate::record::{RecordLog, RecordLogError, WriteEntry};

pub use merged::MergedIterator;

// ------------------------------------------------------------------------------------------------
// Batch iterator
// ------------------------------------------------------------------------------------------------

/// Ordered iterator over one column of an indexed batch.
///
/// Positions follow the index order `(user_key ASC, log_offset ASC)`;
/// with overwrite mode off, equal keys are visited oldest record first.
/// The iterator is `valid()` only while the underlying cursor points at
/// an entry of its own column.
pub struct BatchIterator<'a> {
    /// Column this iterator is scoped to.
    column_id: u32,

    /// Cursor over the shared ordered index.
    cursor: IndexCursor<'a>,

    /// The batch's record log, for key resolution and record decoding.
    log: &'a RecordLog,

    /// The batch's entry arena.
    arena: &'a Arena,

    /// The batch's entry comparator.
    comparator: &'a EntryComparator,
}

impl<'a> BatchIterator<'a> {
    pub(crate) fn new(
        column_id: u32,
        log: &'a RecordLog,
        arena: &'a Arena,
        index: &'a OrderedIndex,
        comparator: &'a EntryComparator,
    ) -> Self {
        Self {
            column_id,
            cursor: index.cursor(),
            log,
            arena,
            comparator,
        }
    }

    fn ctx(&self) -> IndexContext<'a> {
        IndexContext {
            log: self.log.data(),
            arena: self.arena,
            comparator: self.comparator,
        }
    }

    /// The column this iterator is scoped to.
    pub fn column_id(&self) -> u32 {
        self.column_id
    }

    /// Whether the iterator points at an entry of its column.
    pub fn valid(&self) -> bool {
        self.cursor.valid() && self.arena.entry(self.cursor.entry_ref()).column_id == self.column_id
    }

    /// Position at the first entry of the column.
    pub fn seek_to_first(&mut self) {
        let ctx = self.ctx();
        self.cursor.seek(&Probe::min(self.column_id), &ctx);
    }

    /// Position at the last entry of the column.
    pub fn seek_to_last(&mut self) {
        let ctx = self.ctx();
        // Land just past the column, then step back onto its last entry.
        self.cursor.seek(&Probe::max(self.column_id), &ctx);
        if !self.cursor.valid() {
            self.cursor.seek_to_last();
        } else {
            self.cursor.prev(&ctx);
        }
    }

    /// Position at the first entry with key `>= key`.
    ///
    /// With overwrite mode off this is the *oldest* record of an equal
    /// key.
    pub fn seek(&mut self, key: &[u8]) {
        let ctx = self.ctx();
        self.cursor.seek(&Probe::key(self.column_id, key), &ctx);
    }

    /// Position at the last entry with key `<= key`.
    ///
    /// With overwrite mode off this is the *newest* record of an equal
    /// key.
    pub fn seek_for_prev(&mut self, key: &[u8]) {
        let ctx = self.ctx();
        self.cursor
            .seek_for_prev(&Probe::key(self.column_id, key), &ctx);
    }

    /// Advance to the next entry. Only legal while `valid()`.
    pub fn next(&mut self) {
        self.cursor.next();
    }

    /// Step back to the previous entry. Only legal while `valid()`.
    pub fn prev(&mut self) {
        let ctx = self.ctx();
        self.cursor.prev(&ctx);
    }

    /// Decode the record at the current position.
    ///
    /// Only key-bearing records are ever indexed, so a decode failure
    /// here means the log bytes under the index were corrupted.
    pub fn entry(&self) -> Result<WriteEntry<'a>, RecordLogError> {
        debug_assert!(self.valid());
        let index_entry = self.arena.entry(self.cursor.entry_ref());
        WriteEntry::decode_at(self.log.data(), index_entry.log_offset)
    }

    /// First error the iterator has hit.
    ///
    /// The batch iterator reads purely in-memory state and never fails
    /// outside of [`BatchIterator::entry`] decode errors, so this is
    /// always `Ok`.
    pub fn status(&self) -> Result<(), RecordLogError> {
        Ok(())
    }

    /// Handle of the current index entry, for in-place offset updates.
    pub(crate) fn raw_entry_ref(&self) -> EntryRef {
        self.cursor.entry_ref()
    }
}
