use std::sync::Arc;

use crate::index::{
    Arena, EntryComparator, IndexContext, IndexEntry, OrderedIndex,
};
use crate::record::{read_key_from_record, Record, RecordLog};
use crate::store::BytewiseComparator;

/// Log + arena + comparator bundle for driving an [`OrderedIndex`]
/// directly, without a full batch.
pub struct IndexFixture {
    pub log: RecordLog,
    pub arena: Arena,
    pub comparator: EntryComparator,
}

impl IndexFixture {
    pub fn new() -> Self {
        Self {
            log: RecordLog::new(0, 0),
            arena: Arena::new(),
            comparator: EntryComparator::new(Arc::new(BytewiseComparator)),
        }
    }

    pub fn ctx(&self) -> IndexContext<'_> {
        IndexContext {
            log: self.log.data(),
            arena: &self.arena,
            comparator: &self.comparator,
        }
    }

    /// Append a put record for `key` and index it. Returns the record's
    /// log offset.
    pub fn push(&mut self, index: &mut OrderedIndex, column_id: u32, key: &[u8]) -> usize {
        let offset = self
            .log
            .append_record(&Record::Put {
                column_id,
                key,
                value: b"v",
            })
            .unwrap();
        let mut cursor = offset;
        let (key_offset, key_length) =
            read_key_from_record(self.log.data(), &mut cursor, column_id != 0).unwrap();
        let entry_ref = self.arena.alloc(IndexEntry {
            column_id,
            log_offset: offset,
            key_offset,
            key_length,
        });
        let ctx = IndexContext {
            log: self.log.data(),
            arena: &self.arena,
            comparator: &self.comparator,
        };
        index.insert(entry_ref, &ctx);
        offset
    }

    /// Keys visited by a full forward walk, in index order.
    pub fn forward_keys(&self, index: &OrderedIndex) -> Vec<Vec<u8>> {
        let ctx = self.ctx();
        let mut cursor = index.cursor();
        cursor.seek_to_first();
        let mut keys = Vec::new();
        while cursor.valid() {
            let entry = ctx.entry(cursor.entry_ref());
            keys.push(entry.key(self.log.data()).to_vec());
            cursor.next();
        }
        keys
    }

    /// Keys visited by a full backward walk, newest position first.
    pub fn backward_keys(&self, index: &OrderedIndex) -> Vec<Vec<u8>> {
        let ctx = self.ctx();
        let mut cursor = index.cursor();
        cursor.seek_to_last();
        let mut keys = Vec::new();
        while cursor.valid() {
            let entry = ctx.entry(cursor.entry_ref());
            keys.push(entry.key(self.log.data()).to_vec());
            cursor.prev(&ctx);
        }
        keys
    }
}
