//! External store contracts.
//!
//! An indexed batch never talks to a concrete storage engine; it only
//! consumes the narrow traits defined here. A store hands out point
//! lookups ([`Store::get`]), point-in-time iterators
//! ([`Store::new_iterator`]), and the per-column comparator and merge
//! operator the batch needs to line its delta up with the store's view.
//!
//! Everything is object-safe: batches hold `Arc<dyn UserComparator>` /
//! `Arc<dyn MergeOperator>` and merged iterators hold
//! `Box<dyn BaseIterator>`, so adapters for real engines stay one `impl`
//! away.

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Failures forwarded from the underlying store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// I/O failure inside the store, rendered as text.
    #[error("store I/O error: {0}")]
    Io(String),

    /// The store detected corrupted data while serving the request.
    #[error("store corruption: {0}")]
    Corruption(String),

    /// Any other store-side failure.
    #[error("store error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Read options
// ------------------------------------------------------------------------------------------------

/// Options passed through to the store on reads.
///
/// The batch never interprets these; they exist so a caller can pin
/// batch-and-store reads to the same store snapshot its base iterator
/// was opened on.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Opaque snapshot handle, if the store supports snapshots.
    pub snapshot: Option<u64>,
}

// ------------------------------------------------------------------------------------------------
// Comparators
// ------------------------------------------------------------------------------------------------

/// User-key ordering for one column.
pub trait UserComparator: Send + Sync {
    /// Identifier used in diagnostics.
    fn name(&self) -> &'static str;

    /// Three-way comparison of two user keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Byte-lexicographic ordering; the default for every column.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl UserComparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "bytewise"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

// ------------------------------------------------------------------------------------------------
// Merge operator
// ------------------------------------------------------------------------------------------------

/// Resolves accumulated merge operands into a final value.
pub trait MergeOperator: Send + Sync {
    /// Identifier used in diagnostics.
    fn name(&self) -> &'static str;

    /// Combine `existing` (the store's value, if any) with `operands`
    /// in application order (oldest first).
    ///
    /// Returns `None` when the operands cannot be applied, which readers
    /// surface as corruption.
    fn full_merge(
        &self,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Option<Vec<u8>>;
}

// ------------------------------------------------------------------------------------------------
// Base iterator
// ------------------------------------------------------------------------------------------------

/// A point-in-time ordered iterator over one column of the store.
///
/// The contract mirrors the batch-side iterators: positioning methods
/// plus `key`/`value` accessors that may only be called while `valid()`.
pub trait BaseIterator {
    /// Position at the first entry of the column.
    fn seek_to_first(&mut self);

    /// Position at the last entry of the column.
    fn seek_to_last(&mut self);

    /// Position at the first entry with key `>= key`.
    fn seek(&mut self, key: &[u8]);

    /// Position at the last entry with key `<= key`.
    fn seek_for_prev(&mut self, key: &[u8]);

    /// Advance to the next entry.
    fn next(&mut self);

    /// Step back to the previous entry.
    fn prev(&mut self);

    /// Whether the iterator currently points at an entry.
    fn valid(&self) -> bool;

    /// Key at the current position.
    fn key(&self) -> &[u8];

    /// Value at the current position.
    fn value(&self) -> &[u8];

    /// First error the iterator has hit, if any.
    fn status(&self) -> Result<(), StoreError>;
}

// ------------------------------------------------------------------------------------------------
// Store
// ------------------------------------------------------------------------------------------------

/// The minimal surface an indexed batch needs from a storage engine.
pub trait Store {
    /// Point lookup in `column_id`; `Ok(None)` means not found.
    fn get(
        &self,
        options: &ReadOptions,
        column_id: u32,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Open a point-in-time iterator over `column_id`.
    fn new_iterator(&self, options: &ReadOptions, column_id: u32) -> Box<dyn BaseIterator + '_>;

    /// The column's user comparator, if it differs from bytewise.
    fn column_user_comparator(&self, column_id: u32) -> Option<Arc<dyn UserComparator>>;

    /// The column's merge operator, if one is configured.
    fn column_merge_operator(&self, column_id: u32) -> Option<Arc<dyn MergeOperator>>;
}
