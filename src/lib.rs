//! # Tabula
//!
//! An embeddable, in-memory **indexed write batch** for key-value
//! stores. Mutations are staged into an append-only record log while a
//! secondary ordered index keeps the batch readable by key — including
//! as a live overlay on top of a store's own point-in-time view.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       IndexedBatch                        │
//! │  ┌──────────────┐   ┌─────────┐   ┌────────────────────┐  │
//! │  │  RecordLog   │   │  Arena  │   │   OrderedIndex     │  │
//! │  │  (wire-      │◄──┤  Index  │◄──┤  skiplist | rbtree │  │
//! │  │   format     │   │  Entry  │   │  (cf, key, offset) │  │
//! │  │   buffer)    │   │  slots  │   │                    │  │
//! │  └──────┬───────┘   └─────────┘   └─────────┬──────────┘  │
//! │         │ ship verbatim                     │ read by key │
//! │         ▼                                   ▼             │
//! │   store commit                        BatchIterator       │
//! │                                             │             │
//! │                                             ▼             │
//! │                         MergedIterator (base ⊕ delta)     │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`batch`] | The [`IndexedBatch`](batch::IndexedBatch) façade — mutations, point lookups, save points, collapse |
//! | [`record`] | Append-only record log and the tagged wire format it is made of |
//! | [`index`] | Arena-backed index entries, entry comparator, skip-list and red-black-tree orderings |
//! | [`iterator`] | Column-scoped batch iterator and the base ⊕ delta merged iterator |
//! | [`store`] | Narrow contracts a real store implements: `Store`, `BaseIterator`, comparators, merge operators |
//!
//! ## Key Features
//!
//! - **Read-your-writes** — every staged mutation is immediately visible
//!   through point lookups and ordered iteration, before anything is
//!   committed to the store.
//! - **Overwrite mode** — repeated writes to one key collapse into a
//!   single index slot; superseded records are physically removed from
//!   the log by `collapse()` just before shipment.
//! - **Merged reads** — a batch in overwrite mode overlays any store
//!   iterator, masking deleted keys and shadowing updated ones, with
//!   full bidirectional traversal.
//! - **Save points** — nested log snapshots with rollback; the index is
//!   rebuilt from the surviving records.
//! - **Pluggable ordering** — per-column user comparators; the index
//!   structure is selectable between a skip list and a red-black tree.
//!
//! ## Quick Start
//!
//! ```rust
//! use tabula::batch::{BatchGetResult, BatchOptions, IndexedBatch};
//!
//! let mut batch = IndexedBatch::new(BatchOptions {
//!     overwrite_key: true,
//!     ..BatchOptions::default()
//! });
//!
//! // Stage mutations; the newest write per key wins.
//! batch.put(b"a", b"1").unwrap();
//! batch.put(b"a", b"2").unwrap();
//! batch.put(b"b", b"3").unwrap();
//!
//! assert_eq!(
//!     batch.get_from_batch(b"a").unwrap(),
//!     BatchGetResult::Found(b"2".to_vec()),
//! );
//!
//! // Read the batch back in key order.
//! {
//!     let mut iter = batch.new_iterator();
//!     iter.seek_to_first();
//!     let mut keys = Vec::new();
//!     while iter.valid() {
//!         keys.push(iter.entry().unwrap().key.to_vec());
//!         iter.next();
//!     }
//!     assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
//! }
//!
//! // Drop the superseded record before shipping the log.
//! assert!(batch.collapse().unwrap());
//! assert_eq!(batch.len(), 2);
//! ```

pub mod batch;
pub mod index;
pub mod iterator;
pub mod record;
pub mod store;
