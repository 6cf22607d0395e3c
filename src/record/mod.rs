//! Mutation record log and wire format.
//!
//! This module implements the **append-only byte log** that backs an
//! indexed batch, together with the tagged record wire format the log is
//! made of. The buffer is shipped verbatim to the consuming store at
//! commit time, so the format here *is* the interchange format.
//!
//! # On-wire layout
//!
//! ```text
//! [SEQUENCE_LE_U64][COUNT_LE_U32]            <- 12-byte fixed header
//! [TAG][COLUMN_ID_LE_U32?][PAYLOAD]          <- record
//! [TAG][COLUMN_ID_LE_U32?][PAYLOAD]
//! ...
//! ```
//!
//! - **Header** — `sequence` is reserved for the consuming store and is
//!   written as zero; `count` is the number of key-bearing records in the
//!   log, maintained on append, truncate, and rollback.
//! - **Tag byte** — the low 7 bits carry the [`RecordKind`]; bit `0x80`
//!   is set iff a 4-byte column id follows. Records in the default
//!   column (id 0) omit the column id entirely.
//! - **Payload** — byte strings are `[u32 len][bytes]`, little-endian.
//!   `Put`/`Merge` carry key then value; `Delete`/`SingleDelete` carry a
//!   key; `DeleteRange` carries the begin key in the key slot and the end
//!   key in the value slot; `LogData` and the transaction markers that
//!   need one carry a single opaque blob.
//!
//! All multi-byte integers are **little-endian** with fixed widths, so
//! the same logical log always produces the same bytes.
//!
//! # Save points
//!
//! The log keeps a stack of `(size, count)` snapshots. Rolling back
//! truncates the buffer to the snapshot; the caller owning a secondary
//! index must rebuild it afterwards, since record offsets past the
//! snapshot are gone.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

/// Size of the fixed log header: `[u64 sequence][u32 count]`.
pub const LOG_HEADER_SIZE: usize = 12;

/// Byte offset of the record count within the header.
const COUNT_OFFSET: usize = 8;

/// Tag bit marking that a 4-byte column id follows the tag byte.
const COLUMN_ID_FLAG: u8 = 0x80;

const U32_SIZE: usize = std::mem::size_of::<u32>();

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by record log operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordLogError {
    /// Appending the record would push the log past its configured cap.
    #[error("record log size limit exceeded ({attempted} > {max_bytes} bytes)")]
    SizeLimit {
        /// Log size the append would have produced.
        attempted: usize,
        /// Configured hard cap.
        max_bytes: usize,
    },

    /// `rollback_to_save_point` / `pop_save_point` with an empty stack.
    #[error("no save point to roll back to")]
    NoSavePoint,

    /// The buffer ended in the middle of a record.
    #[error("truncated record at offset {offset}")]
    UnexpectedEnd {
        /// Offset of the field that could not be read.
        offset: usize,
    },

    /// A tag byte did not decode to a known record kind.
    #[error("unknown record tag 0x{tag:02x} at offset {offset}")]
    UnknownTag {
        /// The raw tag byte.
        tag: u8,
        /// Offset of the tag byte.
        offset: usize,
    },

    /// A key was requested from a record kind that does not carry one.
    #[error("record at offset {offset} carries no key")]
    NotKeyBearing {
        /// Offset of the record.
        offset: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Record kinds
// ------------------------------------------------------------------------------------------------

/// Logical kind of a single log record.
///
/// The first five kinds carry a user key and participate in the
/// secondary index. `LogData` and the transaction markers are opaque to
/// the index and are skipped when it is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Padding / placeholder record.
    Noop = 0,
    /// Insert or update a key.
    Put = 1,
    /// Point deletion.
    Delete = 2,
    /// Point deletion of a key written at most once.
    SingleDelete = 3,
    /// Range deletion of `[begin, end)`.
    DeleteRange = 4,
    /// Merge operand, resolved lazily on read.
    Merge = 5,
    /// Opaque caller blob carried alongside the mutations.
    LogData = 6,
    /// Two-phase-commit markers, opaque to the index.
    BeginPrepare = 7,
    /// End of a prepared section; carries the transaction id.
    EndPrepare = 8,
    /// Commit marker; carries the transaction id.
    Commit = 9,
    /// Rollback marker; carries the transaction id.
    Rollback = 10,
}

impl RecordKind {
    fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => RecordKind::Noop,
            1 => RecordKind::Put,
            2 => RecordKind::Delete,
            3 => RecordKind::SingleDelete,
            4 => RecordKind::DeleteRange,
            5 => RecordKind::Merge,
            6 => RecordKind::LogData,
            7 => RecordKind::BeginPrepare,
            8 => RecordKind::EndPrepare,
            9 => RecordKind::Commit,
            10 => RecordKind::Rollback,
            _ => return None,
        })
    }

    /// Whether records of this kind carry a user key and are indexed.
    pub fn is_key_bearing(self) -> bool {
        matches!(
            self,
            RecordKind::Put
                | RecordKind::Delete
                | RecordKind::SingleDelete
                | RecordKind::DeleteRange
                | RecordKind::Merge
        )
    }

    /// Whether records of this kind mask a base entry for the same key.
    pub fn is_tombstone(self) -> bool {
        matches!(self, RecordKind::Delete | RecordKind::SingleDelete)
    }
}

// ------------------------------------------------------------------------------------------------
// Records
// ------------------------------------------------------------------------------------------------

/// A single log record, borrowed from the caller (append) or from the
/// log buffer (decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// Insert or update `key` with `value`.
    Put {
        column_id: u32,
        key: &'a [u8],
        value: &'a [u8],
    },

    /// Delete `key`.
    Delete { column_id: u32, key: &'a [u8] },

    /// Delete `key`, promising it was written at most once.
    SingleDelete { column_id: u32, key: &'a [u8] },

    /// Delete every key in `[begin_key, end_key)`.
    DeleteRange {
        column_id: u32,
        begin_key: &'a [u8],
        end_key: &'a [u8],
    },

    /// Merge operand for `key`.
    Merge {
        column_id: u32,
        key: &'a [u8],
        value: &'a [u8],
    },

    /// Opaque caller blob, never indexed.
    LogData { blob: &'a [u8] },

    /// Start of a prepared section.
    BeginPrepare,

    /// End of a prepared section.
    EndPrepare { xid: &'a [u8] },

    /// Commit of a prepared section.
    Commit { xid: &'a [u8] },

    /// Rollback of a prepared section.
    Rollback { xid: &'a [u8] },

    /// Padding record.
    Noop,
}

impl<'a> Record<'a> {
    /// The kind tag of this record.
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Put { .. } => RecordKind::Put,
            Record::Delete { .. } => RecordKind::Delete,
            Record::SingleDelete { .. } => RecordKind::SingleDelete,
            Record::DeleteRange { .. } => RecordKind::DeleteRange,
            Record::Merge { .. } => RecordKind::Merge,
            Record::LogData { .. } => RecordKind::LogData,
            Record::BeginPrepare => RecordKind::BeginPrepare,
            Record::EndPrepare { .. } => RecordKind::EndPrepare,
            Record::Commit { .. } => RecordKind::Commit,
            Record::Rollback { .. } => RecordKind::Rollback,
            Record::Noop => RecordKind::Noop,
        }
    }

    /// Column id for key-bearing records; 0 for everything else.
    pub fn column_id(&self) -> u32 {
        match self {
            Record::Put { column_id, .. }
            | Record::Delete { column_id, .. }
            | Record::SingleDelete { column_id, .. }
            | Record::DeleteRange { column_id, .. }
            | Record::Merge { column_id, .. } => *column_id,
            _ => 0,
        }
    }

    /// The indexed user key, if this record carries one.
    ///
    /// For `DeleteRange` this is the begin key, which is also the key the
    /// record is indexed under.
    pub fn key(&self) -> Option<&'a [u8]> {
        match *self {
            Record::Put { key, .. }
            | Record::Delete { key, .. }
            | Record::SingleDelete { key, .. }
            | Record::Merge { key, .. } => Some(key),
            Record::DeleteRange { begin_key, .. } => Some(begin_key),
            _ => None,
        }
    }

    fn encoded_len(&self) -> usize {
        let column_id_len = |column_id: &u32| {
            if *column_id != 0 {
                U32_SIZE
            } else {
                0
            }
        };
        1 + match self {
            Record::Put {
                column_id,
                key,
                value,
            }
            | Record::Merge {
                column_id,
                key,
                value,
            } => column_id_len(column_id) + 2 * U32_SIZE + key.len() + value.len(),
            Record::Delete { column_id, key } | Record::SingleDelete { column_id, key } => {
                column_id_len(column_id) + U32_SIZE + key.len()
            }
            Record::DeleteRange {
                column_id,
                begin_key,
                end_key,
            } => column_id_len(column_id) + 2 * U32_SIZE + begin_key.len() + end_key.len(),
            Record::LogData { blob } => U32_SIZE + blob.len(),
            Record::EndPrepare { xid } | Record::Commit { xid } | Record::Rollback { xid } => {
                U32_SIZE + xid.len()
            }
            Record::BeginPrepare | Record::Noop => 0,
        }
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        let kind = self.kind();
        let column_id = self.column_id();
        let mut tag = kind as u8;
        if column_id != 0 {
            tag |= COLUMN_ID_FLAG;
        }
        buf.push(tag);
        if column_id != 0 {
            buf.extend_from_slice(&column_id.to_le_bytes());
        }
        let put_bytes = |buf: &mut Vec<u8>, bytes: &[u8]| {
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        };
        match self {
            Record::Put { key, value, .. } | Record::Merge { key, value, .. } => {
                put_bytes(buf, key);
                put_bytes(buf, value);
            }
            Record::Delete { key, .. } | Record::SingleDelete { key, .. } => {
                put_bytes(buf, key);
            }
            Record::DeleteRange {
                begin_key, end_key, ..
            } => {
                put_bytes(buf, begin_key);
                put_bytes(buf, end_key);
            }
            Record::LogData { blob } => put_bytes(buf, blob),
            Record::EndPrepare { xid } | Record::Commit { xid } | Record::Rollback { xid } => {
                put_bytes(buf, xid)
            }
            Record::BeginPrepare | Record::Noop => {}
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Decoded entry view
// ------------------------------------------------------------------------------------------------

/// A key-bearing record decoded from the log, as surfaced by iterators.
///
/// For `DeleteRange` the begin key occupies `key` and the end key
/// occupies `value`; for point tombstones `value` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEntry<'a> {
    /// The record kind; always one of the five key-bearing kinds.
    pub kind: RecordKind,
    /// The user key.
    pub key: &'a [u8],
    /// The value slot (value, merge operand, or range end key).
    pub value: &'a [u8],
}

impl<'a> WriteEntry<'a> {
    /// Decode the record starting at `offset` into an entry view.
    ///
    /// Fails with [`RecordLogError::NotKeyBearing`] when the record is a
    /// log-data or transaction-control record; those must never be
    /// reachable through the index.
    pub fn decode_at(data: &'a [u8], offset: usize) -> Result<Self, RecordLogError> {
        let mut cursor = offset;
        let record = read_record(data, &mut cursor)?;
        let entry = match record {
            Record::Put { key, value, .. } => WriteEntry {
                kind: RecordKind::Put,
                key,
                value,
            },
            Record::Delete { key, .. } => WriteEntry {
                kind: RecordKind::Delete,
                key,
                value: &[],
            },
            Record::SingleDelete { key, .. } => WriteEntry {
                kind: RecordKind::SingleDelete,
                key,
                value: &[],
            },
            Record::DeleteRange {
                begin_key, end_key, ..
            } => WriteEntry {
                kind: RecordKind::DeleteRange,
                key: begin_key,
                value: end_key,
            },
            Record::Merge { key, value, .. } => WriteEntry {
                kind: RecordKind::Merge,
                key,
                value,
            },
            _ => return Err(RecordLogError::NotKeyBearing { offset }),
        };
        Ok(entry)
    }
}

// ------------------------------------------------------------------------------------------------
// Cursor decoding helpers
// ------------------------------------------------------------------------------------------------

fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8, RecordLogError> {
    let byte = *data
        .get(*cursor)
        .ok_or(RecordLogError::UnexpectedEnd { offset: *cursor })?;
    *cursor += 1;
    Ok(byte)
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, RecordLogError> {
    let end = *cursor + U32_SIZE;
    let bytes = data
        .get(*cursor..end)
        .ok_or(RecordLogError::UnexpectedEnd { offset: *cursor })?;
    // The slice is exactly 4 bytes; the conversion cannot fail.
    let value = u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]));
    *cursor = end;
    Ok(value)
}

fn read_bytes<'a>(data: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], RecordLogError> {
    let len = read_u32(data, cursor)? as usize;
    let end = *cursor + len;
    let bytes = data
        .get(*cursor..end)
        .ok_or(RecordLogError::UnexpectedEnd { offset: *cursor })?;
    *cursor = end;
    Ok(bytes)
}

/// Decode one record starting at `*cursor`, advancing the cursor past it.
pub fn read_record<'a>(data: &'a [u8], cursor: &mut usize) -> Result<Record<'a>, RecordLogError> {
    let tag_offset = *cursor;
    let tag = read_u8(data, cursor)?;
    let kind = RecordKind::from_u8(tag & !COLUMN_ID_FLAG).ok_or(RecordLogError::UnknownTag {
        tag,
        offset: tag_offset,
    })?;
    let column_id = if tag & COLUMN_ID_FLAG != 0 {
        read_u32(data, cursor)?
    } else {
        0
    };
    let record = match kind {
        RecordKind::Put => {
            let key = read_bytes(data, cursor)?;
            let value = read_bytes(data, cursor)?;
            Record::Put {
                column_id,
                key,
                value,
            }
        }
        RecordKind::Delete => Record::Delete {
            column_id,
            key: read_bytes(data, cursor)?,
        },
        RecordKind::SingleDelete => Record::SingleDelete {
            column_id,
            key: read_bytes(data, cursor)?,
        },
        RecordKind::DeleteRange => {
            let begin_key = read_bytes(data, cursor)?;
            let end_key = read_bytes(data, cursor)?;
            Record::DeleteRange {
                column_id,
                begin_key,
                end_key,
            }
        }
        RecordKind::Merge => {
            let key = read_bytes(data, cursor)?;
            let value = read_bytes(data, cursor)?;
            Record::Merge {
                column_id,
                key,
                value,
            }
        }
        RecordKind::LogData => Record::LogData {
            blob: read_bytes(data, cursor)?,
        },
        RecordKind::BeginPrepare => Record::BeginPrepare,
        RecordKind::EndPrepare => Record::EndPrepare {
            xid: read_bytes(data, cursor)?,
        },
        RecordKind::Commit => Record::Commit {
            xid: read_bytes(data, cursor)?,
        },
        RecordKind::Rollback => Record::Rollback {
            xid: read_bytes(data, cursor)?,
        },
        RecordKind::Noop => Record::Noop,
    };
    Ok(record)
}

/// Locate the user key of the record starting at `*cursor` without
/// decoding the rest of the payload.
///
/// Returns the key's `(offset, length)` within `data` and leaves the
/// cursor just past the key bytes. `has_column_id` tells whether a
/// column id sits between the tag byte and the key; callers derive it
/// from the record's column (non-zero columns are always encoded).
pub fn read_key_from_record(
    data: &[u8],
    cursor: &mut usize,
    has_column_id: bool,
) -> Result<(usize, usize), RecordLogError> {
    let tag_offset = *cursor;
    let tag = read_u8(data, cursor)?;
    let kind = RecordKind::from_u8(tag & !COLUMN_ID_FLAG).ok_or(RecordLogError::UnknownTag {
        tag,
        offset: tag_offset,
    })?;
    if !kind.is_key_bearing() {
        return Err(RecordLogError::NotKeyBearing { offset: tag_offset });
    }
    if has_column_id {
        read_u32(data, cursor)?;
    }
    let key_len = read_u32(data, cursor)? as usize;
    let key_offset = *cursor;
    if data.len() < key_offset + key_len {
        return Err(RecordLogError::UnexpectedEnd { offset: key_offset });
    }
    *cursor = key_offset + key_len;
    Ok((key_offset, key_len))
}

// ------------------------------------------------------------------------------------------------
// Record Log
// ------------------------------------------------------------------------------------------------

/// Save point snapshot: buffer size and record count at the time of
/// `set_save_point`.
#[derive(Debug, Clone, Copy)]
struct SavePoint {
    size: usize,
    count: u32,
}

/// Append-only byte log of encoded mutation records.
///
/// The buffer always starts with the fixed 12-byte header and only ever
/// grows between save points. The record count lives inside the header so
/// the buffer can be handed to a store verbatim via [`RecordLog::data`].
#[derive(Debug)]
pub struct RecordLog {
    /// Header followed by concatenated encoded records.
    buf: Vec<u8>,

    /// Hard cap on the buffer size in bytes; 0 disables the cap.
    max_bytes: usize,

    /// Save point stack, innermost last.
    save_points: Vec<SavePoint>,
}

impl RecordLog {
    /// Create an empty log.
    ///
    /// `reserved_bytes` pre-sizes the buffer; `max_bytes` caps it
    /// (0 = unlimited).
    pub fn new(reserved_bytes: usize, max_bytes: usize) -> Self {
        let mut buf = Vec::with_capacity(reserved_bytes.max(LOG_HEADER_SIZE));
        buf.resize(LOG_HEADER_SIZE, 0);
        Self {
            buf,
            max_bytes,
            save_points: Vec::new(),
        }
    }

    /// Append one encoded record, returning the offset it starts at.
    ///
    /// The size cap is checked before the buffer is touched: a failed
    /// append leaves the log byte-identical to before the call.
    pub fn append_record(&mut self, record: &Record<'_>) -> Result<usize, RecordLogError> {
        let offset = self.buf.len();
        let attempted = offset + record.encoded_len();
        if self.max_bytes > 0 && attempted > self.max_bytes {
            return Err(RecordLogError::SizeLimit {
                attempted,
                max_bytes: self.max_bytes,
            });
        }
        record.encode_to(&mut self.buf);
        if record.kind().is_key_bearing() {
            self.set_count(self.count() + 1);
        }
        Ok(offset)
    }

    /// Total size of the log in bytes, header included.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// The raw log bytes, ready for shipment to a store.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Number of key-bearing records currently in the log.
    pub fn count(&self) -> u32 {
        let bytes: [u8; 4] = self.buf[COUNT_OFFSET..LOG_HEADER_SIZE]
            .try_into()
            .unwrap_or([0; 4]);
        u32::from_le_bytes(bytes)
    }

    fn set_count(&mut self, count: u32) {
        self.buf[COUNT_OFFSET..LOG_HEADER_SIZE].copy_from_slice(&count.to_le_bytes());
    }

    /// Replace the log contents wholesale (collapse rewrite).
    ///
    /// `buf` must be a well-formed log buffer including the header;
    /// `count` is stamped into it. Save points are discarded, since the
    /// offsets they captured no longer address record boundaries.
    pub(crate) fn install(&mut self, buf: Vec<u8>, count: u32) {
        debug_assert!(buf.len() >= LOG_HEADER_SIZE);
        self.buf = buf;
        self.set_count(count);
        self.save_points.clear();
    }

    /// Cut the log back to `size` bytes and recount the remaining
    /// records.
    pub fn truncate(&mut self, size: usize) -> Result<(), RecordLogError> {
        self.buf.truncate(size.max(LOG_HEADER_SIZE));
        let mut cursor = LOG_HEADER_SIZE;
        let mut count = 0u32;
        while cursor < self.buf.len() {
            if read_record(&self.buf, &mut cursor)?.kind().is_key_bearing() {
                count += 1;
            }
        }
        self.set_count(count);
        Ok(())
    }

    /// Reset the log to empty, dropping all records and save points.
    pub fn clear(&mut self) {
        self.buf.truncate(LOG_HEADER_SIZE);
        self.buf[..LOG_HEADER_SIZE].fill(0);
        self.save_points.clear();
    }

    /// Record the current size and count for a later rollback.
    pub fn set_save_point(&mut self) {
        self.save_points.push(SavePoint {
            size: self.buf.len(),
            count: self.count(),
        });
    }

    /// Discard every record appended since the most recent save point.
    pub fn rollback_to_save_point(&mut self) -> Result<(), RecordLogError> {
        let save_point = self.save_points.pop().ok_or(RecordLogError::NoSavePoint)?;
        self.buf.truncate(save_point.size);
        self.set_count(save_point.count);
        Ok(())
    }

    /// Drop the most recent save point without rolling back.
    pub fn pop_save_point(&mut self) -> Result<(), RecordLogError> {
        self.save_points
            .pop()
            .map(|_| ())
            .ok_or(RecordLogError::NoSavePoint)
    }

    /// Change the size cap; 0 disables it. Affects future appends only.
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
    }
}
