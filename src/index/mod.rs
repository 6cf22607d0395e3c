//! Secondary ordered index over the record log.
//!
//! Every key-bearing record appended to the log gets an [`IndexEntry`]
//! descriptor allocated in the [`Arena`] and inserted into the
//! [`OrderedIndex`], which keeps entries sorted by
//! `(column_id, user_key, log_offset)`. The index stores only [`EntryRef`]
//! handles; keys are never copied — the comparator resolves them through
//! the entry's `(key_offset, key_length)` slice into the log buffer.
//!
//! Two interchangeable index structures are provided, selected by
//! [`IndexType`] at batch construction:
//!
//! - [`SkipListIndex`] — probabilistic tower list, cheap inserts, `prev`
//!   by re-descending from the top.
//! - [`RbTreeIndex`] — vec-backed red-black tree with parent links,
//!   `next`/`prev` by successor walks. The default.
//!
//! Because the structures hold handles rather than references, every
//! comparison needs the log bytes, the arena, and the comparator at
//! hand; callers bundle those in an [`IndexContext`] per operation.
//!
//! # Ordering and ties
//!
//! Within one `(column_id, user_key)` pair, entries order by ascending
//! `log_offset` — insertion order. A forward scan therefore visits the
//! oldest record for a key first. Search probes compare on
//! `(column_id, user_key)` only, so `seek` lands on the oldest entry of
//! an equal key and `seek_for_prev` on the newest.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod arena;
mod rbtree;
mod skiplist;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::UserComparator;

pub use arena::{Arena, EntryRef};
pub use rbtree::RbTreeIndex;
pub use skiplist::SkipListIndex;

// ------------------------------------------------------------------------------------------------
// Index entries
// ------------------------------------------------------------------------------------------------

/// Fixed-size descriptor of one indexed record.
///
/// Immutable after allocation except for `log_offset`, which the batch
/// redirects in place when overwrite mode supersedes the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Logical keyspace the record belongs to.
    pub column_id: u32,

    /// Byte offset of the encoded record within the log.
    pub log_offset: usize,

    /// Byte offset of the user key within the log.
    pub key_offset: usize,

    /// Length of the user key in bytes.
    pub key_length: usize,
}

impl IndexEntry {
    /// Resolve the user key slice against the log buffer.
    pub fn key<'a>(&self, log: &'a [u8]) -> &'a [u8] {
        &log[self.key_offset..self.key_offset + self.key_length]
    }
}

// ------------------------------------------------------------------------------------------------
// Search probes
// ------------------------------------------------------------------------------------------------

/// Key position a probe targets within its column.
#[derive(Debug, Clone, Copy)]
pub enum ProbeKey<'a> {
    /// Before every key of the column.
    Min,
    /// At the given user key.
    Key(&'a [u8]),
    /// After every key of the column.
    Max,
}

/// A search target for [`IndexCursor::seek`] / `seek_for_prev`.
///
/// Probes compare on `(column_id, key)` only — never on log offset — so
/// equal-key entries all compare equal to a `Key` probe.
#[derive(Debug, Clone, Copy)]
pub struct Probe<'a> {
    /// Column the probe addresses.
    pub column_id: u32,
    /// Position within the column.
    pub key: ProbeKey<'a>,
}

impl<'a> Probe<'a> {
    /// Probe before every key of `column_id`.
    pub fn min(column_id: u32) -> Self {
        Probe {
            column_id,
            key: ProbeKey::Min,
        }
    }

    /// Probe at `key` within `column_id`.
    pub fn key(column_id: u32, key: &'a [u8]) -> Self {
        Probe {
            column_id,
            key: ProbeKey::Key(key),
        }
    }

    /// Probe after every key of `column_id`.
    pub fn max(column_id: u32) -> Self {
        Probe {
            column_id,
            key: ProbeKey::Max,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Entry comparator
// ------------------------------------------------------------------------------------------------

/// Resolves index entries into a total order.
///
/// Entries order by `(column_id, user_key, log_offset)`; the user-key
/// comparison delegates to the column's registered comparator, falling
/// back to the batch-wide default. The override map is written only by
/// [`EntryComparator::set_comparator_for_column`] and read on every
/// comparison.
pub struct EntryComparator {
    /// Comparator for columns without an explicit registration.
    default_comparator: Arc<dyn UserComparator>,

    /// Per-column overrides.
    overrides: HashMap<u32, Arc<dyn UserComparator>>,
}

impl EntryComparator {
    /// Create a comparator with the given default user comparator.
    pub fn new(default_comparator: Arc<dyn UserComparator>) -> Self {
        Self {
            default_comparator,
            overrides: HashMap::new(),
        }
    }

    /// Register (or replace) the user comparator for one column.
    pub fn set_comparator_for_column(&mut self, column_id: u32, comparator: Arc<dyn UserComparator>) {
        self.overrides.insert(column_id, comparator);
    }

    /// The comparator governing `column_id`.
    pub fn comparator_for_column(&self, column_id: u32) -> &Arc<dyn UserComparator> {
        self.overrides
            .get(&column_id)
            .unwrap_or(&self.default_comparator)
    }

    /// Compare two user keys under `column_id`'s ordering.
    pub fn compare_user_keys(&self, column_id: u32, a: &[u8], b: &[u8]) -> Ordering {
        self.comparator_for_column(column_id).compare(a, b)
    }

    /// Total order between two index entries.
    pub fn compare_entries(&self, log: &[u8], a: &IndexEntry, b: &IndexEntry) -> Ordering {
        a.column_id
            .cmp(&b.column_id)
            .then_with(|| self.compare_user_keys(a.column_id, a.key(log), b.key(log)))
            .then_with(|| a.log_offset.cmp(&b.log_offset))
    }

    /// Order of `entry` relative to `probe`.
    pub fn compare_entry_to_probe(
        &self,
        log: &[u8],
        entry: &IndexEntry,
        probe: &Probe<'_>,
    ) -> Ordering {
        entry
            .column_id
            .cmp(&probe.column_id)
            .then_with(|| match probe.key {
                ProbeKey::Min => Ordering::Greater,
                ProbeKey::Max => Ordering::Less,
                ProbeKey::Key(key) => {
                    self.compare_user_keys(entry.column_id, entry.key(log), key)
                }
            })
    }
}

// ------------------------------------------------------------------------------------------------
// Comparison context
// ------------------------------------------------------------------------------------------------

/// Everything an index structure needs to compare two handles.
///
/// Bundled per operation so the structures themselves stay free of
/// self-references into the batch.
#[derive(Clone, Copy)]
pub struct IndexContext<'a> {
    /// Raw log bytes for key resolution.
    pub log: &'a [u8],
    /// Arena the entry handles point into.
    pub arena: &'a Arena,
    /// The entry comparator.
    pub comparator: &'a EntryComparator,
}

impl<'a> IndexContext<'a> {
    /// Resolve a handle to its entry.
    pub fn entry(&self, entry_ref: EntryRef) -> &'a IndexEntry {
        self.arena.entry(entry_ref)
    }

    fn compare_refs(&self, a: EntryRef, b: EntryRef) -> Ordering {
        self.comparator
            .compare_entries(self.log, self.entry(a), self.entry(b))
    }

    fn compare_ref_to_probe(&self, entry_ref: EntryRef, probe: &Probe<'_>) -> Ordering {
        self.comparator
            .compare_entry_to_probe(self.log, self.entry(entry_ref), probe)
    }
}

// ------------------------------------------------------------------------------------------------
// Index type selection
// ------------------------------------------------------------------------------------------------

/// Which ordered structure backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    /// Probabilistic skip list.
    SkipList,
    /// Red-black tree.
    #[default]
    RbTree,
}

impl IndexType {
    /// Resolve a configuration name; recognizes `"skiplist"` and
    /// `"rbtree"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "skiplist" => Some(IndexType::SkipList),
            "rbtree" => Some(IndexType::RbTree),
            _ => None,
        }
    }

    /// The configuration name of this index type.
    pub fn name(self) -> &'static str {
        match self {
            IndexType::SkipList => "skiplist",
            IndexType::RbTree => "rbtree",
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Ordered index
// ------------------------------------------------------------------------------------------------

/// Ordered multiset of entry handles, pluggable between the two
/// structures.
#[derive(Debug)]
pub enum OrderedIndex {
    /// Skip-list backed index.
    SkipList(SkipListIndex),
    /// Red-black-tree backed index.
    RbTree(RbTreeIndex),
}

impl OrderedIndex {
    /// Create an empty index of the given type.
    pub fn new(index_type: IndexType) -> Self {
        match index_type {
            IndexType::SkipList => OrderedIndex::SkipList(SkipListIndex::new()),
            IndexType::RbTree => OrderedIndex::RbTree(RbTreeIndex::new()),
        }
    }

    /// Insert a handle at its sorted position.
    pub fn insert(&mut self, entry: EntryRef, ctx: &IndexContext<'_>) {
        match self {
            OrderedIndex::SkipList(index) => index.insert(entry, ctx),
            OrderedIndex::RbTree(index) => index.insert(entry, ctx),
        }
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        match self {
            OrderedIndex::SkipList(index) => index.len(),
            OrderedIndex::RbTree(index) => index.len(),
        }
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open an unpositioned cursor; call a seek method before reading.
    pub fn cursor(&self) -> IndexCursor<'_> {
        match self {
            OrderedIndex::SkipList(index) => IndexCursor {
                inner: CursorInner::SkipList(index.cursor()),
            },
            OrderedIndex::RbTree(index) => IndexCursor {
                inner: CursorInner::RbTree(index.cursor()),
            },
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Index cursor
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
enum CursorInner<'a> {
    SkipList(skiplist::Cursor<'a>),
    RbTree(rbtree::Cursor<'a>),
}

/// Bidirectional cursor over an [`OrderedIndex`].
///
/// Positioning methods that involve key comparisons take the
/// [`IndexContext`]; `next`/`prev` on an invalid cursor are debug
/// assertions, matching the iterator layer's contract that callers check
/// `valid()` first.
#[derive(Debug)]
pub struct IndexCursor<'a> {
    inner: CursorInner<'a>,
}

impl<'a> IndexCursor<'a> {
    /// Whether the cursor points at an entry.
    pub fn valid(&self) -> bool {
        match &self.inner {
            CursorInner::SkipList(cursor) => cursor.valid(),
            CursorInner::RbTree(cursor) => cursor.valid(),
        }
    }

    /// Handle of the current entry. Only valid while `valid()`.
    pub fn entry_ref(&self) -> EntryRef {
        match &self.inner {
            CursorInner::SkipList(cursor) => cursor.entry_ref(),
            CursorInner::RbTree(cursor) => cursor.entry_ref(),
        }
    }

    /// Position at the first entry `>=` the probe.
    pub fn seek(&mut self, probe: &Probe<'_>, ctx: &IndexContext<'_>) {
        match &mut self.inner {
            CursorInner::SkipList(cursor) => cursor.seek(probe, ctx),
            CursorInner::RbTree(cursor) => cursor.seek(probe, ctx),
        }
    }

    /// Position at the last entry `<=` the probe.
    pub fn seek_for_prev(&mut self, probe: &Probe<'_>, ctx: &IndexContext<'_>) {
        match &mut self.inner {
            CursorInner::SkipList(cursor) => cursor.seek_for_prev(probe, ctx),
            CursorInner::RbTree(cursor) => cursor.seek_for_prev(probe, ctx),
        }
    }

    /// Position at the first entry of the whole index.
    pub fn seek_to_first(&mut self) {
        match &mut self.inner {
            CursorInner::SkipList(cursor) => cursor.seek_to_first(),
            CursorInner::RbTree(cursor) => cursor.seek_to_first(),
        }
    }

    /// Position at the last entry of the whole index.
    pub fn seek_to_last(&mut self) {
        match &mut self.inner {
            CursorInner::SkipList(cursor) => cursor.seek_to_last(),
            CursorInner::RbTree(cursor) => cursor.seek_to_last(),
        }
    }

    /// Advance to the next entry.
    pub fn next(&mut self) {
        match &mut self.inner {
            CursorInner::SkipList(cursor) => cursor.next(),
            CursorInner::RbTree(cursor) => cursor.next(),
        }
    }

    /// Step back to the previous entry.
    pub fn prev(&mut self, ctx: &IndexContext<'_>) {
        match &mut self.inner {
            CursorInner::SkipList(cursor) => cursor.prev(ctx),
            CursorInner::RbTree(cursor) => cursor.prev(),
        }
    }
}
