//! Base ⊕ delta merged iterator.
//!
//! Overlays a [`BatchIterator`] (the batch's pending mutations, the
//! *delta*) on a store-provided [`BaseIterator`] (a point-in-time view,
//! the *base*), presenting one ordered key view:
//!
//! - A delta `Put`/`Merge` at a key shadows the base's entry.
//! - A delta `Delete`/`SingleDelete` masks the base's entry entirely.
//! - `DeleteRange` and merge resolution are **not** interpreted here;
//!   the raw delta kind is surfaced via [`MergedIterator::record_kind`]
//!   and point lookups own that logic.
//!
//! # Positioning invariant
//!
//! With both sides valid and `sign = +1` forward / `-1` reverse, after
//! every reposition:
//!
//! - resting on the base ⇒ `sign · cmp(delta.key, base.key) > 0`
//! - resting on the delta ⇒ `sign · cmp(delta.key, base.key) ≤ 0`
//! - `keys_equal` ⇔ the two keys compare equal
//!
//! The invariant is checked after every reposition in debug builds.
//!
//! Merged iterators exist only for overwrite-mode batches: with
//! duplicate deltas allowed at one key, their order relative to the base
//! entry is ambiguous without a merge operator.

use std::sync::Arc;

use crate::batch::BatchError;
use crate::record::{RecordKind, WriteEntry};
use crate::store::{BaseIterator, UserComparator};

use super::BatchIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Base,
    Delta,
}

/// Single ordered view over *(batch delta) ⊕ (store base)*.
pub struct MergedIterator<'a> {
    /// Traversal direction set by the last seek.
    direction: Direction,

    /// Which side holds the currently exposed key.
    current_side: Side,

    /// Both sides valid and pointing at the same key.
    keys_equal: bool,

    /// Sticky error; cleared only by seeks.
    status: Option<BatchError>,

    /// The store's point-in-time iterator.
    base: Box<dyn BaseIterator + 'a>,

    /// The batch's delta iterator.
    delta: BatchIterator<'a>,

    /// User comparator of the iterated column.
    comparator: Arc<dyn UserComparator>,

    /// Decoded delta record, kept while resting on the delta side.
    current_delta: Option<WriteEntry<'a>>,
}

impl<'a> MergedIterator<'a> {
    pub(crate) fn new(
        base: Box<dyn BaseIterator + 'a>,
        delta: BatchIterator<'a>,
        comparator: Arc<dyn UserComparator>,
    ) -> Self {
        Self {
            direction: Direction::Forward,
            current_side: Side::Base,
            keys_equal: false,
            status: None,
            base,
            delta,
            comparator,
            current_delta: None,
        }
    }

    /// Whether the iterator points at an entry.
    pub fn valid(&self) -> bool {
        match self.current_side {
            Side::Base => self.base.valid(),
            Side::Delta => self.delta.valid(),
        }
    }

    /// Position at the first merged entry.
    pub fn seek_to_first(&mut self) {
        self.direction = Direction::Forward;
        self.status = None;
        self.base.seek_to_first();
        self.delta.seek_to_first();
        self.update_current();
    }

    /// Position at the last merged entry.
    pub fn seek_to_last(&mut self) {
        self.direction = Direction::Reverse;
        self.status = None;
        self.base.seek_to_last();
        self.delta.seek_to_last();
        self.update_current();
    }

    /// Position at the first merged entry with key `>= key`.
    pub fn seek(&mut self, key: &[u8]) {
        self.direction = Direction::Forward;
        self.status = None;
        self.base.seek(key);
        self.delta.seek(key);
        self.update_current();
    }

    /// Position at the last merged entry with key `<= key`.
    pub fn seek_for_prev(&mut self, key: &[u8]) {
        self.direction = Direction::Reverse;
        self.status = None;
        self.base.seek_for_prev(key);
        self.delta.seek_for_prev(key);
        self.update_current();
    }

    /// Advance to the next merged entry.
    pub fn next(&mut self) {
        if !self.valid() {
            self.status = Some(BatchError::Unsupported(
                "next() on an invalid merged iterator".into(),
            ));
            return;
        }
        if self.direction == Direction::Reverse {
            // Turn around: the lagging side sits one position past the
            // current key in the old direction and must be brought over.
            self.direction = Direction::Forward;
            self.keys_equal = false;
            if !self.base.valid() {
                debug_assert!(self.delta.valid());
                self.base.seek_to_first();
            } else if !self.delta.valid() {
                self.delta.seek_to_first();
            } else if self.current_side == Side::Base {
                self.advance_delta();
            } else {
                self.advance_base();
            }
            self.recheck_keys_equal();
        }
        self.advance();
    }

    /// Step back to the previous merged entry.
    pub fn prev(&mut self) {
        if !self.valid() {
            self.status = Some(BatchError::Unsupported(
                "prev() on an invalid merged iterator".into(),
            ));
            return;
        }
        if self.direction == Direction::Forward {
            self.direction = Direction::Reverse;
            self.keys_equal = false;
            if !self.base.valid() {
                debug_assert!(self.delta.valid());
                self.base.seek_to_last();
            } else if !self.delta.valid() {
                self.delta.seek_to_last();
            } else if self.current_side == Side::Base {
                self.advance_delta();
            } else {
                self.advance_base();
            }
            self.recheck_keys_equal();
        }
        self.advance();
    }

    /// Key at the current position. Only valid while `valid()`.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        match self.current_side {
            Side::Base => self.base.key(),
            Side::Delta => self.current_delta.map(|entry| entry.key).unwrap_or(&[]),
        }
    }

    /// Value at the current position. Only valid while `valid()`.
    ///
    /// When the current entry is a delta `DeleteRange`, the value slot
    /// carries the range's end key, mirroring the record layout.
    pub fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        match self.current_side {
            Side::Base => self.base.value(),
            Side::Delta => self.current_delta.map(|entry| entry.value).unwrap_or(&[]),
        }
    }

    /// Kind of the current entry: the raw record kind when resting on
    /// the delta, `Put` for plain base entries.
    pub fn record_kind(&self) -> RecordKind {
        debug_assert!(self.valid());
        match self.current_side {
            Side::Base => RecordKind::Put,
            Side::Delta => self
                .current_delta
                .map(|entry| entry.kind)
                .unwrap_or(RecordKind::Put),
        }
    }

    /// First non-ok status among (sticky, base, delta).
    pub fn status(&self) -> Result<(), BatchError> {
        if let Some(error) = &self.status {
            return Err(error.clone());
        }
        self.base.status()?;
        self.delta.status()?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn sign(&self) -> i32 {
        match self.direction {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }

    fn advance_base(&mut self) {
        match self.direction {
            Direction::Forward => self.base.next(),
            Direction::Reverse => self.base.prev(),
        }
    }

    fn advance_delta(&mut self) {
        match self.direction {
            Direction::Forward => self.delta.next(),
            Direction::Reverse => self.delta.prev(),
        }
    }

    /// Decode the current delta record, downgrading decode failures to a
    /// sticky corruption status.
    fn decode_delta(&mut self) -> Option<WriteEntry<'a>> {
        match self.delta.entry() {
            Ok(entry) => Some(entry),
            Err(error) => {
                if self.status.is_none() {
                    self.status = Some(BatchError::Corruption(error.to_string()));
                }
                None
            }
        }
    }

    fn recheck_keys_equal(&mut self) {
        if self.base.valid() && self.delta.valid() {
            if let Some(entry) = self.decode_delta() {
                if self.comparator.compare(entry.key, self.base.key()) == std::cmp::Ordering::Equal
                {
                    self.keys_equal = true;
                }
            }
        }
    }

    /// Move past the current key on whichever side(s) expose it, then
    /// re-resolve the resting side.
    fn advance(&mut self) {
        if self.keys_equal {
            debug_assert!(self.base.valid() && self.delta.valid());
            self.advance_base();
            self.advance_delta();
        } else {
            match self.current_side {
                Side::Base => {
                    debug_assert!(self.base.valid());
                    self.advance_base();
                }
                Side::Delta => {
                    debug_assert!(self.delta.valid());
                    self.advance_delta();
                }
            }
        }
        self.update_current();
    }

    /// Re-establish the positioning invariant, skipping delta tombstones
    /// (and the base entries they mask) along the way.
    fn update_current(&mut self) {
        self.current_delta = None;
        loop {
            self.keys_equal = false;
            if !self.base.valid() {
                if !self.delta.valid() {
                    // Both exhausted.
                    self.current_side = Side::Base;
                    break;
                }
                let Some(entry) = self.decode_delta() else {
                    self.current_side = Side::Base;
                    break;
                };
                if entry.kind.is_tombstone() {
                    self.advance_delta();
                    continue;
                }
                self.current_delta = Some(entry);
                self.current_side = Side::Delta;
                break;
            }
            if !self.delta.valid() {
                self.current_side = Side::Base;
                break;
            }
            let Some(entry) = self.decode_delta() else {
                self.current_side = Side::Base;
                break;
            };
            let compare =
                self.sign() * ordering_to_i32(self.comparator.compare(entry.key, self.base.key()));
            if compare > 0 {
                // The delta is past the base in traversal order.
                self.current_side = Side::Base;
                break;
            }
            self.keys_equal = compare == 0;
            if !entry.kind.is_tombstone() {
                self.current_delta = Some(entry);
                self.current_side = Side::Delta;
                break;
            }
            // Tombstone: skip it, and the base entry it masks.
            let masked_base = self.keys_equal;
            self.advance_delta();
            if masked_base {
                self.advance_base();
            }
        }
        self.assert_invariants();
    }

    #[cfg(debug_assertions)]
    fn assert_invariants(&mut self) {
        if !self.valid() {
            return;
        }
        if !self.base.valid() {
            assert!(self.current_side == Side::Delta && self.delta.valid());
            return;
        }
        if !self.delta.valid() {
            assert!(self.current_side == Side::Base);
            return;
        }
        let Some(entry) = self.decode_delta() else {
            return;
        };
        assert!(entry.kind.is_key_bearing());
        let compare =
            self.sign() * ordering_to_i32(self.comparator.compare(entry.key, self.base.key()));
        match self.current_side {
            Side::Base => assert!(compare > 0),
            Side::Delta => assert!(compare <= 0),
        }
        assert_eq!(self.keys_equal, compare == 0);
    }

    #[cfg(not(debug_assertions))]
    fn assert_invariants(&mut self) {}
}

fn ordering_to_i32(ordering: std::cmp::Ordering) -> i32 {
    match ordering {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}
